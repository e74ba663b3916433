use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use spdif::process::SpdifReceiver;
use spdif::structs::status::{BitDepth, StatusInfo};
use spdif::utils::capture::CaptureReader;

use super::command::{AudioFormat, Cli, DecodeArgs};
use crate::input::InputReader;
use crate::wav::WAVWriter;

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Decoding S/PDIF capture: {}", args.input.display());

    let input = InputReader::new(&args.input)?;
    let total_ticks = if input.is_pipe() {
        None
    } else {
        fs::metadata(&args.input).ok().map(|meta| meta.len() * 8)
    };

    let mut reader = CaptureReader::new(input);
    let mut receiver = SpdifReceiver::default();

    let pb = match multi {
        Some(multi) => Some(create_progress_bar(multi, total_ticks)?),
        None => None,
    };

    let mut sink: Option<Sink> = None;
    let mut format: Option<StatusInfo> = None;
    let mut samples_written = 0u64;

    while let Some(level) = reader.next_level()? {
        let out = receiver.tick(level);

        if out.block_valid {
            if let Some(info) = receiver.format() {
                match format {
                    None => {
                        log::info!(
                            "Stream locked: {} Hz, {}, channel A carries {}",
                            info.sample_rate,
                            info.bit_depth,
                            info.channel_a
                        );
                        sink = Some(Sink::create(args, &info)?);
                        format = Some(info);
                    }
                    Some(prev) => {
                        if prev.sample_rate != info.sample_rate
                            || prev.bit_depth != info.bit_depth
                        {
                            bail!(
                                "stream format changed mid-capture: {} Hz / {} -> {} Hz / {}",
                                prev.sample_rate,
                                prev.bit_depth,
                                info.sample_rate,
                                info.bit_depth
                            );
                        }
                    }
                }
            }
        }

        if let Some(sample) = out.sample {
            if let Some(sink) = sink.as_mut() {
                sink.write(sample)?;
                samples_written += 1;
            }
        }

        if let Some(pb) = &pb {
            let ticks = reader.ticks();
            if ticks % (1 << 16) == 0 {
                pb.set_position(ticks);
            }
        }
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let Some(info) = format else {
        bail!("no valid S/PDIF block found in the capture");
    };

    if let Some(sink) = sink.as_mut() {
        sink.finish()?;
    }

    let frames = samples_written / 2;
    let duration = frames as f64 / info.sample_rate as f64;
    log::info!(
        "Decoded {frames} sample frames ({duration:.3}s), {} valid blocks, {} dropped",
        receiver.blocks_valid(),
        receiver.blocks_dropped()
    );

    if cli.strict && receiver.blocks_dropped() > 0 {
        bail!("{} blocks were dropped", receiver.blocks_dropped());
    }

    Ok(())
}

enum Sink {
    Wav(WAVWriter<File>),
    Pcm(BufWriter<File>, BitDepth),
}

impl Sink {
    fn create(args: &DecodeArgs, info: &StatusInfo) -> Result<Self> {
        let path = output_path(args);
        log::info!("Writing decoded audio to {}", path.display());
        let file =
            File::create(&path).with_context(|| format!("creating {}", path.display()))?;

        Ok(match args.format {
            AudioFormat::Wav => {
                let mut writer = WAVWriter::new(file);
                writer.configure_audio_format(info.sample_rate, 2, info.bit_depth.bits() as u32)?;
                writer.write_header()?;
                Sink::Wav(writer)
            }
            AudioFormat::Pcm => Sink::Pcm(BufWriter::new(file), info.bit_depth),
        })
    }

    fn write(&mut self, sample: i32) -> Result<()> {
        match self {
            Sink::Wav(writer) => writer.write_samples(&[sample])?,
            Sink::Pcm(writer, depth) => match depth {
                BitDepth::B16 => writer.write_all(&(sample as i16).to_le_bytes())?,
                BitDepth::B24 => writer.write_all(&sample.to_le_bytes()[0..3])?,
            },
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        match self {
            Sink::Wav(writer) => writer.finish()?,
            Sink::Pcm(writer, _) => writer.flush()?,
        }
        Ok(())
    }
}

fn output_path(args: &DecodeArgs) -> PathBuf {
    if let Some(path) = &args.output_path {
        return path.clone();
    }

    let extension = match args.format {
        AudioFormat::Wav => "wav",
        AudioFormat::Pcm => "pcm",
    };
    args.input.with_extension(extension)
}

fn create_progress_bar(multi: &MultiProgress, total_ticks: Option<u64>) -> Result<ProgressBar> {
    let pb = if let Some(total) = total_ticks {
        let pb = multi.add(ProgressBar::new(total));
        pb.set_style(ProgressStyle::with_template(
            "{bar:40.cyan/blue} {percent}% | elapsed: {elapsed_precise} | ETA: {eta_precise}",
        )?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    } else {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {pos} line samples")?);
        pb
    };

    Ok(pb)
}
