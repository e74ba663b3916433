//! Block assembly, validation, and sample hand-off.
//!
//! Sub-frames are buffered per physical channel until the next block
//! boundary, then the accumulated channel-status message is interpreted and
//! the block either streams out as interleaved left/right samples or is
//! discarded whole. Two state machines cooperate: the validation FSM owns
//! the write side of the per-channel FIFOs, the transfer FSM owns the read
//! side. A rejected block drains exactly the samples it buffered before new
//! data is accepted, so no partial block ever reaches the output, and
//! blocks that already validated are never rolled back.

use log::{debug, warn};

use crate::structs::status::{BitDepth, ChannelRole, ChannelStatus, StatusInfo};
use crate::structs::subframe::{Channel, SubframeWord};
use crate::utils::errors::BlockError;
use crate::utils::fifo::SampleFifo;

/// Frames (stereo sample pairs) per block.
pub const FRAMES_PER_BLOCK: usize = 192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockState {
    WaitBlock,
    CollectData,
    ValidateControl,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransferState {
    WaitData,
    DropData,
    Transfer,
}

/// Per-tick inputs from the timing and decode stages.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockInput {
    /// A freshly demodulated word and the channel slot it arrived on.
    pub word: Option<(SubframeWord, Channel)>,
    /// Block boundary: completes the collecting block and begins the next.
    pub block_begin: bool,
    /// Line synchronisation was lost; discard the collecting block.
    pub drop_block: bool,
}

/// Per-tick outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockTick {
    /// One converted sample, interleaved left then right.
    pub sample: Option<i32>,
    /// Pulses once per block that passed validation.
    pub block_valid: bool,
    /// Raised while a rejected block's samples are being discarded.
    pub dropping: bool,
}

#[derive(Debug, Clone, Copy)]
struct TransferJob {
    pairs: usize,
    a_is_left: bool,
    depth: BitDepth,
}

/// Buffers, validates, and hands off S/PDIF blocks.
#[derive(Debug, Clone)]
pub struct BlockAssembler {
    state: BlockState,
    transfer: TransferState,

    fifo_a: SampleFifo<u32, FRAMES_PER_BLOCK>,
    fifo_b: SampleFifo<u32, FRAMES_PER_BLOCK>,
    samples_a: usize,
    samples_b: usize,
    frames: usize,
    status: ChannelStatus,
    block_error: Option<BlockError>,
    pending_begin: bool,

    // Latched requests into the transfer FSM. Latches rather than pulses:
    // a drop raised while the previous block is still streaming out must
    // not be lost.
    drop_a: usize,
    drop_b: usize,
    job: Option<TransferJob>,

    xfer_remaining: usize,
    xfer_next_left: bool,
    xfer_a_is_left: bool,
    xfer_depth: BitDepth,

    format: Option<StatusInfo>,
    locked: bool,
    blocks_valid: u64,
    blocks_dropped: u64,
}

impl Default for BlockAssembler {
    fn default() -> Self {
        Self {
            state: BlockState::WaitBlock,
            transfer: TransferState::WaitData,
            fifo_a: SampleFifo::default(),
            fifo_b: SampleFifo::default(),
            samples_a: 0,
            samples_b: 0,
            frames: 0,
            status: ChannelStatus::default(),
            block_error: None,
            pending_begin: false,
            drop_a: 0,
            drop_b: 0,
            job: None,
            xfer_remaining: 0,
            xfer_next_left: true,
            xfer_a_is_left: true,
            xfer_depth: BitDepth::B24,
            format: None,
            locked: false,
            blocks_valid: 0,
            blocks_dropped: 0,
        }
    }
}

impl BlockAssembler {
    /// Whether the decoded path currently holds a validated lock. Raised
    /// once a full block validates, cleared the instant one is dropped.
    pub fn locked(&self) -> bool {
        self.locked
    }

    /// Stream parameters from the most recent validated block.
    pub fn format(&self) -> Option<StatusInfo> {
        self.format
    }

    pub fn blocks_valid(&self) -> u64 {
        self.blocks_valid
    }

    pub fn blocks_dropped(&self) -> u64 {
        self.blocks_dropped
    }

    /// Advances both state machines by one reference-domain tick.
    pub fn tick(&mut self, input: BlockInput) -> BlockTick {
        let mut out = BlockTick::default();

        match self.state {
            BlockState::WaitBlock => {
                if input.drop_block {
                    self.pending_begin = false;
                    self.locked = false;
                } else if input.block_begin || self.pending_begin {
                    self.begin_collect();
                }
            }

            BlockState::CollectData => {
                if let Some((word, channel)) = input.word {
                    self.collect(word, channel);
                } else if input.drop_block {
                    self.locked = false;
                    if self.frames > 0 {
                        warn!("dropping block: line synchronisation lost");
                        self.discard_block();
                    } else {
                        self.state = BlockState::WaitBlock;
                    }
                } else if input.block_begin {
                    self.pending_begin = true;
                    if let Some(error) = self.block_error {
                        warn!("dropping block: {error}");
                        self.discard_block();
                    } else {
                        self.state = BlockState::ValidateControl;
                    }
                }
            }

            BlockState::ValidateControl => match self.validate() {
                Ok(info) => {
                    debug!(
                        "block validated: {} at {} Hz, channel A carries {}",
                        info.bit_depth, info.sample_rate, info.channel_a
                    );
                    self.format = Some(info);
                    self.locked = true;
                    self.blocks_valid += 1;
                    out.block_valid = true;
                    self.job = Some(TransferJob {
                        pairs: self.samples_a,
                        a_is_left: info.channel_a == ChannelRole::Left,
                        depth: info.bit_depth,
                    });
                    self.state = BlockState::WaitBlock;
                }
                Err(error) => {
                    warn!("dropping block: {error}");
                    self.discard_block();
                }
            },
        }

        match self.transfer {
            TransferState::WaitData => {
                if self.drop_a > 0 || self.drop_b > 0 {
                    self.transfer = TransferState::DropData;
                } else if let Some(job) = self.job.take() {
                    self.xfer_remaining = job.pairs * 2;
                    self.xfer_next_left = true;
                    self.xfer_a_is_left = job.a_is_left;
                    self.xfer_depth = job.depth;
                    if self.xfer_remaining > 0 {
                        self.transfer = TransferState::Transfer;
                    }
                }
            }

            TransferState::DropData => {
                out.dropping = true;
                if self.drop_a > 0 {
                    self.fifo_a.pop();
                    self.drop_a -= 1;
                }
                if self.drop_b > 0 {
                    self.fifo_b.pop();
                    self.drop_b -= 1;
                }
                if self.drop_a == 0 && self.drop_b == 0 {
                    self.transfer = TransferState::WaitData;
                }
            }

            TransferState::Transfer => {
                let from_a = self.xfer_next_left == self.xfer_a_is_left;
                let raw = if from_a {
                    self.fifo_a.pop()
                } else {
                    self.fifo_b.pop()
                };
                if let Some(raw) = raw {
                    out.sample = Some(convert(raw, self.xfer_depth));
                }
                self.xfer_next_left = !self.xfer_next_left;
                self.xfer_remaining -= 1;
                if self.xfer_remaining == 0 {
                    self.transfer = TransferState::WaitData;
                }
            }
        }

        out
    }

    fn begin_collect(&mut self) {
        self.pending_begin = false;
        self.samples_a = 0;
        self.samples_b = 0;
        self.frames = 0;
        self.status.clear();
        self.block_error = None;
        self.state = BlockState::CollectData;
    }

    fn collect(&mut self, word: SubframeWord, channel: Channel) {
        self.frames += 1;

        if channel == Channel::A {
            self.status.push(word.channel_status());
        }

        if !word.parity_ok() {
            self.flag(BlockError::ParityCheckFailed {
                frame: self.frames,
            });
            return;
        }

        if word.validity() {
            self.flag(BlockError::ValidityFlagged {
                frame: self.frames,
            });
            return;
        }

        let (fifo, count) = match channel {
            Channel::A => (&mut self.fifo_a, &mut self.samples_a),
            Channel::B => (&mut self.fifo_b, &mut self.samples_b),
        };
        if fifo.push(word.audio()) {
            *count += 1;
        } else {
            self.flag(BlockError::BufferOverflow {
                frame: self.frames,
            });
        }
    }

    /// Records the first rejection; the whole block goes at the boundary.
    fn flag(&mut self, error: BlockError) {
        if self.block_error.is_none() {
            debug!("sub-frame rejected: {error}");
            self.block_error = Some(error);
        }
    }

    fn validate(&self) -> Result<StatusInfo, BlockError> {
        if self.samples_a != self.samples_b {
            return Err(BlockError::SampleCountMismatch {
                a: self.samples_a,
                b: self.samples_b,
            });
        }

        Ok(self.status.interpret()?)
    }

    fn discard_block(&mut self) {
        self.locked = false;
        self.blocks_dropped += 1;
        self.drop_a += self.samples_a;
        self.drop_b += self.samples_b;
        self.state = BlockState::WaitBlock;
    }
}

/// 16-bit samples ride left-aligned in the 24-bit audio field; 24-bit pass
/// through unchanged.
fn convert(raw: u32, depth: BitDepth) -> i32 {
    match depth {
        BitDepth::B16 => (raw >> 8) as u16 as i16 as i32,
        BitDepth::B24 => (raw << 8) as i32 >> 8,
    }
}
