#![doc = include_str!("../README.md")]
//!
//! ## Technical Overview
//!
//! ### Signal Organization
//!
//! **Line level**: biphase-mark coded bits framed by "Z"/"X"/"Y" timing
//! preambles. **Sub-frame**: 28 demodulated bits carrying one sample plus
//! validity/user/status/parity bits. **Block**: 192 frames (384 sub-frames)
//! over which the channel-status message is fully transmitted.
//!
//! ### Clock Domains
//!
//! The receive chain runs in a fast reference domain sized to resolve the
//! narrowest half-bit period; the output engine runs in a separate audio
//! domain at a configurable bit-clock divider. The two only meet through
//! explicit synchronisation primitives.
//!
//! ## Quick Start
//!
//! Steps for playing back a captured stream:
//!
//! 1. Unpack line samples with [`utils::capture::CaptureReader`]
//! 2. Decode them with [`process::SpdifReceiver`], or
//! 3. Drive both domains of a full [`process::stream::AudioInterface`]
//!
//! ```rust,no_run
//! use spdif::process::stream::AudioInterface;
//! use spdif::utils::capture::CaptureReader;
//!
//! let mut reader = CaptureReader::new(std::fs::File::open("capture.bin")?);
//! let mut interface = AudioInterface::default();
//! interface.set_clock_divider(5);
//!
//! // The line domain runs at the capture's tick rate; the audio domain is
//! // advanced here at a quarter of it.
//! while let Some(level) = reader.next_level()? {
//!     interface.tick_line(level);
//!     if reader.ticks() % 4 == 0 {
//!         let bus = interface.tick_audio();
//!         let _ = (bus.bclk, bus.lrclk, bus.data);
//!     }
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

/// The decode/playback state machines.
///
/// 1. **Clock recovery** ([`process::timing`]): phase-locks to line
///    transitions and recognises sub-frame preambles.
///
/// 2. **Demodulation** ([`process::biphase`]): biphase-mark decoding into
///    28-bit sub-frame words.
///
/// 3. **Block assembly** ([`process::block`]): validation and sample
///    hand-off per 192-frame block.
///
/// 4. **Output** ([`process::i2s`], [`process::stream`]): serialization to
///    the output bus and source arbitration.
pub mod process;

/// Data structures representing protocol components.
///
/// - **Sub-frame words** ([`structs::subframe`]): demodulated 28-bit units
/// - **Channel status** ([`structs::status`]): 192-bit messages and their
///   IEC 60958-3 code tables
pub mod structs;

/// Utility functions and supporting infrastructure.
///
/// - **Capture input** ([`utils::capture`]): packed line-sample reading
/// - **FIFOs** ([`utils::fifo`]): bounded single-producer rings
/// - **Domain crossing** ([`utils::sync`]): bit synchronizers and handoffs
/// - **Error handling** ([`utils::errors`]): error types
pub mod utils;

#[cfg(test)]
pub(crate) mod testsig;
