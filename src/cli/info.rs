use anyhow::{Result, bail};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use serde::Serialize;

use spdif::process::SpdifReceiver;
use spdif::utils::capture::CaptureReader;

use super::command::{Cli, InfoArgs};
use crate::input::InputReader;

pub fn cmd_info(args: &InfoArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing S/PDIF capture: {}", args.input.display());

    let input = InputReader::new(&args.input)?;
    let mut reader = CaptureReader::new(input);
    let mut receiver = SpdifReceiver::default();

    let pb = if let Some(multi) = multi {
        let pb = multi.add(ProgressBar::new_spinner());
        pb.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb.set_message("Searching for a valid block...");
        Some(pb)
    } else {
        None
    };

    let mut first_lock_tick = None;
    let mut report = None;

    // The first block to pass validation carries everything worth showing.
    while let Some(level) = reader.next_level()? {
        let out = receiver.tick(level);

        if first_lock_tick.is_none() && !out.syncing {
            first_lock_tick = Some(reader.ticks());
        }

        if out.block_valid {
            if let Some(info) = receiver.format() {
                report = Some(StatusReport {
                    sample_rate: info.sample_rate,
                    bit_depth: info.bit_depth.bits(),
                    channel_a_carries: info.channel_a.to_string(),
                    category_code: info.category,
                    copy_permitted: info.copy_permitted,
                    pre_emphasis: info.pre_emphasis,
                    clock_accuracy_code: info.clock_accuracy,
                    source_number: info.source_number,
                    half_bit_period_ticks: receiver.half_bit_period().unwrap_or(0),
                    line_lock_offset_ticks: first_lock_tick.unwrap_or(0),
                    validated_at_tick: reader.ticks(),
                });
                break;
            }
        }

        if let Some(pb) = &pb {
            if reader.ticks() % (1 << 20) == 0 {
                pb.set_message(format!(
                    "Searching for a valid block... {} line samples",
                    reader.ticks()
                ));
            }
        }
    }

    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let Some(report) = report else {
        println!("No valid S/PDIF block found in the capture.");
        println!("This doesn't appear to be a decodable consumer stream.");
        if cli.strict {
            bail!("no valid block found");
        }
        return Ok(());
    };

    if args.yaml {
        print!("{}", serde_yaml_ng::to_string(&report)?);
    } else {
        display_report(&report);
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    sample_rate: u32,
    bit_depth: u8,
    channel_a_carries: String,
    category_code: u8,
    copy_permitted: bool,
    pre_emphasis: bool,
    clock_accuracy_code: u8,
    source_number: u8,
    half_bit_period_ticks: u32,
    line_lock_offset_ticks: u64,
    validated_at_tick: u64,
}

fn display_report(report: &StatusReport) {
    println!();
    println!("S/PDIF Stream Information");
    println!("=========================");
    println!();
    println!("  Sampling rate             {} Hz", report.sample_rate);
    println!("  Word length               {}-bit", report.bit_depth);
    println!("  Channel A carries         {}", report.channel_a_carries);
    println!("  Category code             {:#04X}", report.category_code);
    println!("  Copy permitted            {}", report.copy_permitted);
    println!("  Pre-emphasis              {}", report.pre_emphasis);
    println!("  Clock accuracy code       {}", report.clock_accuracy_code);
    println!("  Source number             {}", report.source_number);
    println!();
    println!("Line Timing");
    println!(
        "  Half-bit period           {} ticks",
        report.half_bit_period_ticks
    );
    println!(
        "  First lock at             tick {}",
        report.line_lock_offset_ticks
    );
    println!(
        "  First valid block at      tick {}",
        report.validated_at_tick
    );
    println!();
}
