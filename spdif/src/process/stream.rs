//! Sample source arbitration and the composed audio interface.
//!
//! [`StreamCoordinator`] sits between the two possible sample producers —
//! an externally fed bulk path and the decoded S/PDIF path — and the
//! serial output engine. The external path wins when its mode is enabled,
//! the decoded path plays while it holds a validated lock, and silence
//! covers everything else. A selected source with nothing ready at the
//! `need_sample` deadline is an underrun: the engine gets silence and the
//! miss is counted and logged, never swallowed.
//!
//! [`AudioInterface`] wires the whole pipeline together and exposes one
//! advance method per clock domain; decoded pairs, the lock flag, and the
//! decoded format each cross between the domains through their own
//! synchronisation primitive.

use log::warn;

use crate::process::i2s::{I2sEngine, I2sTick};
use crate::process::{ReceiverTick, SpdifReceiver};
use crate::structs::status::{BitDepth, StatusInfo};
use crate::utils::fifo::SampleFifo;
use crate::utils::sync::{BitSync, Handoff};

/// One frame of output audio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StereoPair {
    pub left: i32,
    pub right: i32,
}

/// Depth of the cross-domain and external sample queues.
const QUEUE_DEPTH: usize = 256;

/// Selects the active sample source and feeds the output engine.
#[derive(Debug, Default)]
pub struct StreamCoordinator {
    decoded: SampleFifo<StereoPair, QUEUE_DEPTH>,
    lock_sync: BitSync,
    format_handoff: Handoff<StatusInfo>,
    format: Option<StatusInfo>,
    available: bool,

    external: SampleFifo<StereoPair, QUEUE_DEPTH>,
    external_enabled: bool,
    external_width: Option<BitDepth>,
    feed_acc: u32,
    feed_bytes: u8,
    feed_left: Option<i32>,

    underruns: u64,
    overruns: u64,
    in_underrun: bool,
}

impl StreamCoordinator {
    // --- line-domain side -------------------------------------------------

    /// Queues a decoded stereo pair for the output domain.
    pub fn push_decoded(&mut self, pair: StereoPair) {
        if !self.decoded.push(pair) {
            self.overruns += 1;
        }
    }

    /// Drives the raw decoded-lock flag.
    pub fn set_lock(&mut self, locked: bool) {
        self.lock_sync.write(locked);
    }

    /// Publishes freshly decoded stream parameters.
    pub fn publish_format(&mut self, info: StatusInfo) {
        self.format_handoff.publish(info);
    }

    // --- host configuration ----------------------------------------------

    /// Enables or disables the higher-priority external sample path.
    pub fn set_external_mode(&mut self, enabled: bool, width: Option<BitDepth>) {
        self.external_enabled = enabled;
        self.external_width = width;
        self.feed_acc = 0;
        self.feed_bytes = 0;
        self.feed_left = None;
        if !enabled {
            self.external.clear();
        }
    }

    /// Accepts raw big-endian sample bytes from the external producer,
    /// alternating left/right at the active width.
    pub fn push_external(&mut self, bytes: &[u8]) {
        let Some(width) = self.external_width else {
            return;
        };
        let per_sample = width.bits() / 8;

        for &byte in bytes {
            self.feed_acc = self.feed_acc << 8 | byte as u32;
            self.feed_bytes += 1;
            if self.feed_bytes < per_sample {
                continue;
            }

            let shift = 32 - width.bits() as u32;
            let sample = (self.feed_acc << shift) as i32 >> shift;
            self.feed_acc = 0;
            self.feed_bytes = 0;

            match self.feed_left.take() {
                None => self.feed_left = Some(sample),
                Some(left) => {
                    if !self.external.push(StereoPair {
                        left,
                        right: sample,
                    }) {
                        self.overruns += 1;
                    }
                }
            }
        }
    }

    // --- output-domain side ----------------------------------------------

    /// Advances the coordinator's own output-domain state and returns the
    /// word width the engine should be running at.
    pub fn begin_audio_tick(&mut self) -> u8 {
        self.available = self.lock_sync.sample();
        if let Some(info) = self.format_handoff.snapshot() {
            self.format = Some(info);
        }

        if self.external_enabled {
            self.external_width.map_or(0, BitDepth::bits)
        } else {
            self.format
                .map_or(BitDepth::B16.bits(), |info| info.bit_depth.bits())
        }
    }

    /// Produces the next stereo pair at the `need_sample` deadline.
    pub fn next_pair(&mut self) -> StereoPair {
        let popped = if self.external_enabled {
            Some(self.external.pop())
        } else if self.available {
            Some(self.decoded.pop())
        } else {
            None
        };

        match popped {
            Some(Some(pair)) => {
                self.in_underrun = false;
                pair
            }
            Some(None) => {
                // A selected source missed its hard deadline.
                self.underruns += 1;
                if !self.in_underrun {
                    warn!("sample queue underrun, substituting silence");
                    self.in_underrun = true;
                }
                StereoPair::default()
            }
            None => {
                self.in_underrun = false;
                StereoPair::default()
            }
        }
    }

    /// Whether the decoded path currently holds a validated lock, as seen
    /// from the output domain.
    pub fn available(&self) -> bool {
        self.available
    }

    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    pub fn overruns(&self) -> u64 {
        self.overruns
    }
}

/// The full receive/playback pipeline across both clock domains.
///
/// The caller drives [`tick_line`](Self::tick_line) at the reference-clock
/// rate with raw line samples and [`tick_audio`](Self::tick_audio) at the
/// output-domain rate, each from its own scheduling context.
#[derive(Debug, Default)]
pub struct AudioInterface {
    receiver: SpdifReceiver,
    coordinator: StreamCoordinator,
    i2s: I2sEngine,
    clock_divider: u32,
    left_latch: Option<i32>,
}

impl AudioInterface {
    /// Sets the output bit-clock divider. Zero idles the output engine.
    pub fn set_clock_divider(&mut self, divider: u32) {
        self.clock_divider = divider;
    }

    /// Enables or disables the external bulk sample path.
    pub fn set_external_mode(&mut self, enabled: bool, width: Option<BitDepth>) {
        self.coordinator.set_external_mode(enabled, width);
    }

    /// Feeds raw big-endian sample bytes into the external path.
    pub fn push_external(&mut self, bytes: &[u8]) {
        self.coordinator.push_external(bytes);
    }

    /// Advances the line domain by one reference tick.
    pub fn tick_line(&mut self, level: bool) -> ReceiverTick {
        let out = self.receiver.tick(level);

        if let Some(sample) = out.sample {
            match self.left_latch.take() {
                None => self.left_latch = Some(sample),
                Some(left) => self.coordinator.push_decoded(StereoPair {
                    left,
                    right: sample,
                }),
            }
        }

        if out.block_valid {
            if let Some(info) = self.receiver.format() {
                self.coordinator.publish_format(info);
            }
        }
        self.coordinator.set_lock(out.locked);

        out
    }

    /// Advances the output domain by one tick, feeding the engine at its
    /// `need_sample` deadlines.
    pub fn tick_audio(&mut self) -> I2sTick {
        let width = self.coordinator.begin_audio_tick();
        self.i2s.set_config(self.clock_divider, width);

        let out = self.i2s.tick();
        if out.need_sample {
            let pair = self.coordinator.next_pair();
            let mask = if width == 0 { 0 } else { (1u32 << width) - 1 };
            self.i2s
                .load_sample(pair.left as u32 & mask, pair.right as u32 & mask);
        }
        out
    }

    pub fn receiver(&self) -> &SpdifReceiver {
        &self.receiver
    }

    pub fn coordinator(&self) -> &StreamCoordinator {
        &self.coordinator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structs::status::ChannelRole;

    fn info_16bit() -> StatusInfo {
        StatusInfo {
            bit_depth: BitDepth::B16,
            sample_rate: 48000,
            channel_a: ChannelRole::Left,
            category: 0,
            copy_permitted: false,
            pre_emphasis: false,
            clock_accuracy: 0,
            source_number: 1,
        }
    }

    #[test]
    fn decoded_path_plays_only_while_locked() {
        let mut coordinator = StreamCoordinator::default();
        coordinator.publish_format(info_16bit());
        coordinator.push_decoded(StereoPair { left: 1, right: 2 });

        // Without a lock the queue is left alone and silence plays.
        coordinator.set_lock(false);
        coordinator.begin_audio_tick();
        assert_eq!(coordinator.next_pair(), StereoPair::default());
        assert_eq!(coordinator.underruns(), 0);

        // The lock needs two synchronizer stages to cross, so it shows up
        // from the third output tick.
        coordinator.set_lock(true);
        coordinator.begin_audio_tick();
        coordinator.begin_audio_tick();
        coordinator.begin_audio_tick();
        assert!(coordinator.available());
        assert_eq!(coordinator.next_pair(), StereoPair { left: 1, right: 2 });

        // Now an empty queue is a real deadline miss.
        assert_eq!(coordinator.next_pair(), StereoPair::default());
        assert_eq!(coordinator.underruns(), 1);
    }

    #[test]
    fn external_path_has_priority_and_big_endian_framing() {
        let mut coordinator = StreamCoordinator::default();
        coordinator.set_lock(true);
        coordinator.publish_format(info_16bit());
        coordinator.push_decoded(StereoPair { left: 7, right: 8 });

        coordinator.set_external_mode(true, Some(BitDepth::B16));
        coordinator.push_external(&[0xDE, 0xAD, 0xBE, 0xEF]);

        for _ in 0..3 {
            assert_eq!(coordinator.begin_audio_tick(), 16);
        }
        assert_eq!(
            coordinator.next_pair(),
            StereoPair {
                left: 0xDEADu16 as i16 as i32,
                right: 0xBEEFu16 as i16 as i32,
            }
        );

        // Dropping back to the decoded path resumes where it queued.
        coordinator.set_external_mode(false, None);
        assert_eq!(coordinator.next_pair(), StereoPair { left: 7, right: 8 });
    }

    #[test]
    fn external_24bit_triplets_sign_extend() {
        let mut coordinator = StreamCoordinator::default();
        coordinator.set_external_mode(true, Some(BitDepth::B24));
        coordinator.push_external(&[0x80, 0x00, 0x01]);
        coordinator.push_external(&[0x00, 0x00, 0x02]);

        let pair = coordinator.next_pair();
        assert_eq!(pair.left, 0x8000_01u32 as i32 | !0x00FF_FFFFu32 as i32);
        assert_eq!(pair.right, 2);
    }

    #[test]
    fn interface_serializes_external_samples() {
        let mut interface = AudioInterface::default();
        interface.set_clock_divider(2);
        interface.set_external_mode(true, Some(BitDepth::B16));

        // Keep the queue topped up while collecting a few frames.
        let mut frames = 0;
        let mut bits: Vec<(bool, bool)> = Vec::new();
        let mut last_clk = true;
        for _ in 0..20_000 {
            interface.push_external(&[0xB0, 0x0B, 0x12, 0x34]);
            let out = interface.tick_audio();
            if out.need_sample {
                frames += 1;
            }
            if out.bclk && !last_clk {
                bits.push((out.lrclk, out.data));
            }
            last_clk = out.bclk;
            if frames == 4 {
                break;
            }
        }
        assert_eq!(frames, 4);
        assert_eq!(interface.coordinator().underruns(), 0);

        // Reconstruct one steady-state frame and check the payload.
        let slots = 17usize;
        let frame: Vec<(bool, bool)> = bits
            .iter()
            .copied()
            .skip_while(|&(right, _)| right)
            .skip(2 * slots)
            .take(2 * slots)
            .collect();
        let word = |range: &[(bool, bool)]| {
            range[1..]
                .iter()
                .fold(0u32, |acc, &(_, bit)| acc << 1 | bit as u32)
        };
        assert_eq!(word(&frame[..slots]), 0xB00B);
        assert_eq!(word(&frame[slots..]), 0x1234);
    }
}
