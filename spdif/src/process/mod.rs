//! The decode/playback state machines.
//!
//! 1. **Clock recovery** ([`timing`]): bit-period and preamble
//!    synchronisation from the raw line signal.
//! 2. **Demodulation** ([`biphase`]): biphase-mark decoding into 28-bit
//!    sub-frame words.
//! 3. **Block assembly** ([`block`]): buffering, validation, and sample
//!    hand-off per 192-frame block.
//! 4. **Serial output** ([`i2s`]): re-serialization to the output bus.
//! 5. **Coordination** ([`stream`]): source arbitration and the composed
//!    two-domain [`AudioInterface`](stream::AudioInterface).

pub mod biphase;
pub mod block;
pub mod i2s;
pub mod stream;
pub mod timing;

use crate::process::biphase::BmcDecoder;
use crate::process::block::{BlockAssembler, BlockInput};
use crate::process::timing::LineTiming;
use crate::structs::status::StatusInfo;

/// Per-tick outputs of the receive chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverTick {
    /// One converted sample, interleaved left then right.
    pub sample: Option<i32>,
    /// Pulses once per block that passed validation.
    pub block_valid: bool,
    /// Raised while a rejected block's samples are being discarded.
    pub dropping: bool,
    /// Whether the decoded path holds a validated lock.
    pub locked: bool,
    /// Raised while the line timing is not tracking data bits.
    pub syncing: bool,
}

/// The complete line-domain receive chain: clock recovery, demodulation,
/// and block assembly, advanced one reference tick at a time.
///
/// # Example
///
/// ```rust,no_run
/// use spdif::process::SpdifReceiver;
/// use spdif::utils::capture::CaptureReader;
///
/// let capture = std::fs::File::open("capture.bin")?;
/// let mut reader = CaptureReader::new(capture);
/// let mut receiver = SpdifReceiver::default();
///
/// while let Some(level) = reader.next_level()? {
///     let out = receiver.tick(level);
///     if let Some(sample) = out.sample {
///         // consume interleaved left/right PCM
///         let _ = sample;
///     }
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug, Clone)]
pub struct SpdifReceiver {
    timing: LineTiming,
    decoder: BmcDecoder,
    assembler: BlockAssembler,
    was_reset: bool,
}

impl Default for SpdifReceiver {
    fn default() -> Self {
        Self {
            timing: LineTiming::default(),
            decoder: BmcDecoder::default(),
            assembler: BlockAssembler::default(),
            was_reset: true,
        }
    }
}

impl SpdifReceiver {
    /// Advances the whole receive chain by one reference-domain tick.
    pub fn tick(&mut self, level: bool) -> ReceiverTick {
        let timing = self.timing.tick(level);

        // Loss of line sync aborts the collecting block, once per loss.
        let drop_block = timing.reset && !self.was_reset;
        self.was_reset = timing.reset;

        let word = self
            .decoder
            .tick(timing.reset, timing.bit_clock, timing.level);

        let out = self.assembler.tick(BlockInput {
            word: word.map(|w| (w, timing.channel)),
            block_begin: timing.block_begin,
            drop_block,
        });

        ReceiverTick {
            sample: out.sample,
            block_valid: out.block_valid,
            dropping: out.dropping,
            locked: self.assembler.locked(),
            syncing: timing.syncing,
        }
    }

    /// Stream parameters from the most recent validated block.
    pub fn format(&self) -> Option<StatusInfo> {
        self.assembler.format()
    }

    pub fn blocks_valid(&self) -> u64 {
        self.assembler.blocks_valid()
    }

    pub fn blocks_dropped(&self) -> u64 {
        self.assembler.blocks_dropped()
    }

    /// Recovered half-bit period in reference ticks, while locked.
    pub fn half_bit_period(&self) -> Option<u32> {
        self.timing.half_bit_period()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::timing::Preamble;
    use crate::structs::subframe::SubframeWord;
    use crate::testsig::SignalBuilder;

    const BIT_TIME: u32 = 8;
    const FRAMES: usize = 192;

    // Consumer PCM, channel A carries left, 48kHz, 16-bit.
    fn status_16bit_48k() -> [u8; 24] {
        let mut bytes = [0u8; 24];
        bytes[2] = 0b0001_0001;
        bytes[3] = 0b0000_0010;
        bytes[4] = 0b0000_0010;
        bytes
    }

    fn status_bit(bytes: &[u8; 24], index: usize) -> bool {
        bytes[index >> 3] >> (index & 7) & 1 != 0
    }

    /// Encodes one block of frames onto the line, optionally corrupting
    /// the parity of one channel A sub-frame.
    fn encode_block(sig: &mut SignalBuilder, status: &[u8; 24], corrupt_frame: Option<usize>) {
        for frame in 0..FRAMES {
            let bit = status_bit(status, frame);

            let mut word_a =
                SubframeWord::from_fields((0xCA00 | frame as u32) << 8, false, false, bit);
            if corrupt_frame == Some(frame) {
                word_a = SubframeWord::from_raw(word_a.raw() ^ 1 << 13);
            }
            let preamble_a = if frame == 0 { Preamble::Z } else { Preamble::X };
            sig.subframe(preamble_a, word_a);

            let word_b =
                SubframeWord::from_fields((0xCB00 | frame as u32) << 8, false, false, bit);
            sig.subframe(Preamble::Y, word_b);
        }
    }

    /// A corrupted block must contribute zero samples while its clean
    /// neighbours stream through untouched.
    #[test]
    fn corrupt_block_leaves_neighbours_intact() {
        let status = status_16bit_48k();

        let mut sig = SignalBuilder::new(BIT_TIME);
        sig.hold(8);
        encode_block(&mut sig, &status, None);
        encode_block(&mut sig, &status, Some(50));
        encode_block(&mut sig, &status, None);
        // A final Z (plus its closing transition) ends the last block; the
        // line then goes quiet.
        sig.preamble_z();
        sig.transition();
        sig.hold(4);

        let mut receiver = SpdifReceiver::default();
        let mut samples = Vec::new();
        let mut valid_pulses = 0;

        for &level in sig.levels() {
            let out = receiver.tick(level);
            samples.extend(out.sample);
            valid_pulses += out.block_valid as u32;
        }

        // Let the transfer of the final block drain out.
        for _ in 0..4 * FRAMES {
            let out = receiver.tick(false);
            samples.extend(out.sample);
            valid_pulses += out.block_valid as u32;
        }

        assert_eq!(valid_pulses, 2);
        assert_eq!(receiver.blocks_valid(), 2);
        assert_eq!(samples.len(), 2 * 2 * FRAMES);

        // Both surviving blocks carry the same payload pattern.
        for (index, chunk) in samples.chunks(2 * FRAMES).enumerate() {
            for (frame, pair) in chunk.chunks(2).enumerate() {
                let left = (0xCA00u16 | frame as u16) as i16 as i32;
                let right = (0xCB00u16 | frame as u16) as i16 as i32;
                assert_eq!(pair, [left, right], "block {index}, frame {frame}");
            }
        }

        let info = receiver.format().expect("format decoded");
        assert_eq!(info.sample_rate, 48000);
        assert_eq!(info.bit_depth.bits(), 16);
    }

    /// The lock must clear the instant the corrupt block is rejected.
    #[test]
    fn lock_follows_block_validity() {
        let status = status_16bit_48k();

        let mut sig = SignalBuilder::new(BIT_TIME);
        sig.hold(8);
        encode_block(&mut sig, &status, None);
        encode_block(&mut sig, &status, Some(3));
        sig.preamble_z();
        sig.transition();
        sig.hold(4);

        let mut receiver = SpdifReceiver::default();
        let mut lock_history = Vec::new();
        for &level in sig.levels() {
            let out = receiver.tick(level);
            lock_history.push(out.locked);
        }

        assert_eq!(receiver.blocks_valid(), 1);
        assert_eq!(receiver.blocks_dropped(), 1);
        // Locked somewhere in the middle, unlocked again at the end.
        assert!(lock_history.iter().any(|&locked| locked));
        assert!(!lock_history.last().unwrap());
        assert!(!receiver.tick(false).locked);
    }
}
