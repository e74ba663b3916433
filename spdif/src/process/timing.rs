//! Line clock recovery and preamble synchronisation.
//!
//! The S/PDIF line carries its own clock: every bit cell opens with a
//! transition, and sub-frames are introduced by preambles with interval
//! patterns that deliberately violate the line code. [`LineTiming`] consumes
//! one line sample per reference-domain tick and recovers everything the
//! rest of the pipeline needs: a bit-clock pulse in the middle of each
//! half-bit period, frame/block boundary pulses, and the active channel
//! slot.
//!
//! Acquisition searches for a "Z" (block start) preamble by timing four
//! consecutive transition intervals and checking them against the expected
//! 3:1:1:3 half-bit pattern, with a generous ±7-tick band on the 3:1 ratio
//! while nothing is known yet. The half-bit period measured from the two
//! short intervals then drives all further timing, with a ±3-tick band.
//!
//! Once locked, the engine free-runs bit-clock pulses, re-phasing on every
//! observed transition. A gap longer than one bit period at a sub-frame
//! boundary is the opening interval of the next preamble ("Z"/"X"/"Y",
//! distinguished by their remaining intervals); the same gap mid-word, a
//! preamble interval outside tolerance, or a line that stays quiet for
//! longer than a preamble can explain, all force a return to the searching
//! state — there is no partial recovery.

use log::{debug, trace};

use crate::structs::subframe::{Channel, SubframeWord};

/// Tolerance on the 3:1 interval ratio during acquisition, inclusive.
pub const ACQUIRE_TOLERANCE: u32 = 7;

/// Tolerance band applied to interval checks once a reference period
/// exists; deviations of up to ±2 ticks pass.
pub const LOCKED_TOLERANCE: u32 = 3;

// Timer ceilings, sized for a 60MHz-class reference clock against the
// 32kHz minimum sample rate (60MHz / 32kHz = 1875 ticks per frame).
const SHORT_LIMIT: u32 = 190;
const LONG_LIMIT: u32 = 570;

// Below this half-bit period the one/two/three-unit interval bands overlap
// and classification is meaningless.
const MIN_HALF_BIT: u32 = 6;

const HALF_BITS_PER_SUBFRAME: u32 = SubframeWord::BITS * 2;

/// Sub-frame preambles. "Z" opens a block, "X" an even mid-block sub-frame,
/// "Y" an odd one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preamble {
    Z,
    X,
    Y,
}

impl Preamble {
    /// Transition intervals following the shared three-unit opening gap,
    /// in half-bit units.
    const fn from_tail(tail: [u32; 3]) -> Option<Self> {
        match tail {
            [1, 1, 3] => Some(Preamble::Z),
            [3, 1, 1] => Some(Preamble::X),
            [2, 1, 2] => Some(Preamble::Y),
            _ => None,
        }
    }

    const fn channel(self) -> Channel {
        match self {
            Preamble::Y => Channel::B,
            _ => Channel::A,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SyncState {
    Idle,
    ZBegin,
    ZShort1,
    ZShort2,
    ZFinal,
    Data,
    Preamble,
}

/// Per-tick outputs of the timing engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimingTick {
    /// Conditioned line level, for the biphase decoder to sample.
    pub level: bool,
    /// One-tick pulse in the middle of each half-bit period.
    pub bit_clock: bool,
    /// One-tick pulse when a sub-frame preamble has been recognised.
    pub frame_begin: bool,
    /// One-tick pulse when the preamble was a block-opening "Z".
    pub block_begin: bool,
    /// Physical channel slot the current sub-frame belongs to.
    pub channel: Channel,
    /// Raised while not actively producing data bit-clocks.
    pub syncing: bool,
    /// Raised while in the initial searching state.
    pub reset: bool,
}

/// Clock and synchronisation recovery from the raw line signal.
#[derive(Debug, Clone)]
pub struct LineTiming {
    state: SyncState,

    // Input conditioning registers; a transition is `prev != curr`.
    prev: bool,
    curr: bool,

    /// Ticks since the last observed transition.
    since_edge: u32,
    /// Acquisition: candidate long (three-unit) interval.
    first_interval: u32,
    /// Recovered half-bit period.
    bit_time: u32,
    /// Measured three-unit interval, for the final acquisition check.
    long_time: u32,

    /// Countdown to the next bit-clock pulse.
    next_pulse: u32,
    /// Bit-clock pulses emitted for the current sub-frame.
    pulses: u32,
    /// Ticks spent past the end of a sub-frame waiting on its preamble.
    word_gap: u32,

    channel: Channel,
    tail: [u32; 3],
    intervals_seen: u8,
}

impl Default for LineTiming {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            prev: false,
            curr: false,
            since_edge: 0,
            first_interval: 0,
            bit_time: 0,
            long_time: 0,
            next_pulse: 0,
            pulses: 0,
            word_gap: 0,
            channel: Channel::A,
            tail: [0; 3],
            intervals_seen: 0,
        }
    }
}

impl LineTiming {
    /// Forces the engine back to the initial searching state.
    pub fn reset(&mut self) {
        let (prev, curr) = (self.prev, self.curr);
        *self = Self::default();
        self.prev = prev;
        self.curr = curr;
    }

    /// Recovered half-bit period in reference ticks, while locked.
    pub fn half_bit_period(&self) -> Option<u32> {
        match self.state {
            SyncState::Data | SyncState::Preamble => Some(self.bit_time),
            _ => None,
        }
    }

    /// Advances the engine by one reference-domain tick.
    pub fn tick(&mut self, line_in: bool) -> TimingTick {
        let edge = self.prev != self.curr;

        let mut out = TimingTick {
            level: self.curr,
            channel: self.channel,
            ..Default::default()
        };

        match self.state {
            SyncState::Idle => {
                if edge {
                    self.since_edge = 0;
                    self.state = SyncState::ZBegin;
                }
            }

            // Timing the candidate three-unit interval that opens a "Z".
            SyncState::ZBegin => {
                self.since_edge += 1;
                if edge {
                    self.first_interval = self.since_edge;
                    self.since_edge = 0;
                    self.state = SyncState::ZShort1;
                } else if self.since_edge >= LONG_LIMIT {
                    self.state = SyncState::Idle;
                }
            }

            // First short interval. Its tripled length must land on the
            // first interval for this to be the 3:1 opening of a "Z".
            SyncState::ZShort1 => {
                self.since_edge += 1;
                if self.since_edge == self.first_interval {
                    // Grew as long as the first interval. A transition right
                    // now means two like-sized line-code bits; otherwise the
                    // first capture was too short and this interval becomes
                    // the new long candidate.
                    if edge {
                        self.since_edge = 0;
                    }
                    self.state = SyncState::ZBegin;
                } else if self.since_edge >= SHORT_LIMIT {
                    self.state = SyncState::Idle;
                } else if edge {
                    let ratio = self.since_edge * 3;
                    if ratio > self.first_interval + ACQUIRE_TOLERANCE {
                        // Long of the expected range: a different preamble.
                        self.state = SyncState::Idle;
                    } else if ratio + ACQUIRE_TOLERANCE < self.first_interval {
                        // Short of it: line-code data, keep hunting.
                        self.since_edge = 0;
                        self.state = SyncState::ZBegin;
                    } else {
                        self.bit_time = self.since_edge;
                        self.since_edge = 0;
                        self.state = SyncState::ZShort2;
                    }
                }
            }

            // Second short interval, checked against the first.
            SyncState::ZShort2 => {
                self.since_edge += 1;
                if self.since_edge == self.bit_time + LOCKED_TOLERANCE && !edge {
                    self.state = SyncState::Idle;
                } else if self.since_edge >= SHORT_LIMIT {
                    self.state = SyncState::Idle;
                } else if edge {
                    if self.since_edge + LOCKED_TOLERANCE > self.bit_time {
                        self.long_time = self.first_interval;
                        self.bit_time = (self.bit_time + self.since_edge) >> 1;
                        self.since_edge = 0;
                        self.state = SyncState::ZFinal;
                    } else {
                        self.since_edge = 0;
                        self.state = SyncState::ZBegin;
                    }
                }
            }

            // Closing three-unit interval; success locks the engine.
            SyncState::ZFinal => {
                self.since_edge += 1;
                if edge {
                    if self.long_time.abs_diff(self.since_edge) < LOCKED_TOLERANCE {
                        if self.bit_time < MIN_HALF_BIT {
                            debug!(
                                "refusing lock: half-bit period of {} ticks is below the \
                                 classification floor",
                                self.bit_time
                            );
                            self.state = SyncState::Idle;
                        } else {
                            debug!(
                                "line lock acquired: half-bit period {} ticks",
                                self.bit_time
                            );
                            out.frame_begin = true;
                            out.block_begin = true;
                            self.enter_data(Channel::A);
                        }
                    } else {
                        self.state = SyncState::Idle;
                    }
                } else if self.since_edge >= LONG_LIMIT {
                    self.state = SyncState::Idle;
                }
            }

            // Locked: free-running bit clocks, re-phased on each transition.
            SyncState::Data => {
                self.since_edge += 1;
                if self.pulses == HALF_BITS_PER_SUBFRAME {
                    self.word_gap += 1;
                }

                if edge {
                    self.since_edge = 0;
                    self.next_pulse = self.pulse_offset();
                } else if self.since_edge > self.bit_time * 2 + LOCKED_TOLERANCE {
                    if self.pulses == HALF_BITS_PER_SUBFRAME {
                        // The opening gap of the next preamble; keep timing
                        // the interval from its first transition.
                        self.intervals_seen = 0;
                        self.state = SyncState::Preamble;
                    } else {
                        debug!("no transition within a bit period mid-word, resynchronising");
                        self.state = SyncState::Idle;
                    }
                } else if self.pulses < HALF_BITS_PER_SUBFRAME {
                    self.next_pulse -= 1;
                    if self.next_pulse == 0 {
                        out.bit_clock = true;
                        self.pulses += 1;
                        self.next_pulse = self.bit_time;
                    }
                } else if self.word_gap > self.bit_time * 6 {
                    debug!("expected preamble never arrived, resynchronising");
                    self.state = SyncState::Idle;
                }
            }

            // Classifying the preamble between sub-frames.
            SyncState::Preamble => {
                self.since_edge += 1;
                if edge {
                    let interval = self.since_edge;
                    self.since_edge = 0;

                    match self.classify(interval) {
                        Some(3) if self.intervals_seen == 0 => self.intervals_seen = 1,
                        Some(units) if self.intervals_seen > 0 => {
                            self.tail[self.intervals_seen as usize - 1] = units;
                            self.intervals_seen += 1;
                            if self.intervals_seen == 4 {
                                match Preamble::from_tail(self.tail) {
                                    Some(preamble) => {
                                        trace!("sub-frame preamble {preamble:?}");
                                        out.frame_begin = true;
                                        out.block_begin = preamble == Preamble::Z;
                                        self.enter_data(preamble.channel());
                                    }
                                    None => {
                                        debug!(
                                            "unrecognised preamble signature {:?}, \
                                             resynchronising",
                                            self.tail
                                        );
                                        self.state = SyncState::Idle;
                                    }
                                }
                            }
                        }
                        _ => {
                            debug!(
                                "preamble interval of {interval} ticks out of tolerance, \
                                 resynchronising"
                            );
                            self.state = SyncState::Idle;
                        }
                    }
                } else if self.since_edge > self.bit_time * 3 + LOCKED_TOLERANCE {
                    debug!("line went quiet during preamble, resynchronising");
                    self.state = SyncState::Idle;
                }
            }
        }

        out.channel = self.channel;
        out.reset = self.state == SyncState::Idle;
        out.syncing = self.state != SyncState::Data;

        self.prev = self.curr;
        self.curr = line_in;

        out
    }

    fn enter_data(&mut self, channel: Channel) {
        self.channel = channel;
        self.since_edge = 0;
        self.pulses = 0;
        self.word_gap = 0;
        self.next_pulse = self.pulse_offset();
        self.state = SyncState::Data;
    }

    /// Bit-clock pulses land in the middle of each half-bit.
    fn pulse_offset(&self) -> u32 {
        (self.bit_time / 2).max(1)
    }

    /// Maps a transition interval onto whole half-bit units.
    fn classify(&self, interval: u32) -> Option<u32> {
        (1..=3).find(|units| interval.abs_diff(units * self.bit_time) < LOCKED_TOLERANCE)
    }
}
