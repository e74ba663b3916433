//! Serial audio output engine.
//!
//! Serializes a double-buffered stereo pair onto bit-clock / word-select /
//! data lines. The bit clock toggles each time an internal counter reaches
//! the configured divider; each channel window is `width + 1` bit slots —
//! a word-select delay slot, then the sample MSB down to LSB. `need_sample`
//! pulses for one tick as the window flips back to the left channel; the
//! pair loaded in response is latched at the following falling edge and
//! stays stable for the whole frame. A zero divider or width parks the
//! engine with no clock activity, and a width change only ever takes
//! effect at a frame boundary.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Idle,
    Run,
}

/// Per-tick output bus state.
#[derive(Debug, Clone, Copy, Default)]
pub struct I2sTick {
    /// Bit clock line.
    pub bclk: bool,
    /// Word select line; high while the right channel is active.
    pub lrclk: bool,
    /// Serial data line.
    pub data: bool,
    /// One-tick pulse requesting the next stereo pair.
    pub need_sample: bool,
}

/// Output-domain serializer for an external DAC.
#[derive(Debug, Clone)]
pub struct I2sEngine {
    divider: u32,
    width: u8,

    state: EngineState,
    clk_counter: u32,
    audio_clk: bool,
    bit_slot: u8,
    channel_right: bool,
    sample_latch: bool,

    active: [u32; 2],
    pending: [u32; 2],
    active_width: u8,
    latch_pending: bool,
}

impl Default for I2sEngine {
    fn default() -> Self {
        Self {
            divider: 0,
            width: 0,
            state: EngineState::Idle,
            clk_counter: 0,
            audio_clk: true,
            bit_slot: 0,
            channel_right: true,
            sample_latch: false,
            active: [0; 2],
            pending: [0; 2],
            active_width: 0,
            latch_pending: false,
        }
    }
}

impl I2sEngine {
    /// Reconfigures the clock divider and word width. A zero in either
    /// idles the engine; width changes apply at the next frame boundary.
    pub fn set_config(&mut self, divider: u32, width: u8) {
        self.divider = divider;
        self.width = width;
    }

    /// Stages the next stereo pair, serialized from the next frame on.
    pub fn load_sample(&mut self, left: u32, right: u32) {
        self.pending = [left, right];
    }

    /// Advances one output-domain tick.
    pub fn tick(&mut self) -> I2sTick {
        let mut need_sample = false;

        match self.state {
            EngineState::Idle => {
                self.sample_latch = false;
                if self.width != 0 && self.divider != 0 {
                    // Counter and slot start saturated so the first tick
                    // produces a clock edge and a channel flip.
                    self.clk_counter = self.divider;
                    self.bit_slot = self.width;
                    self.active_width = self.width;
                    self.state = EngineState::Run;
                }
            }

            EngineState::Run => {
                if self.width == 0 || self.divider == 0 {
                    self.state = EngineState::Idle;
                } else {
                    if self.clk_counter == self.divider {
                        self.clk_counter = 0;
                        let was_high = self.audio_clk;
                        self.audio_clk = !self.audio_clk;

                        if was_high {
                            self.advance_slot();
                        }
                    } else {
                        self.clk_counter += 1;
                    }

                    need_sample = !self.channel_right && self.sample_latch;
                    self.sample_latch = self.channel_right;
                }
            }
        }

        I2sTick {
            bclk: self.audio_clk,
            lrclk: self.channel_right,
            data: self.data_bit(),
            need_sample,
        }
    }

    /// Falling-edge bookkeeping: move to the next bit slot or flip the
    /// channel window.
    fn advance_slot(&mut self) {
        if self.bit_slot == self.active_width {
            self.channel_right = !self.channel_right;
            self.bit_slot = 0;
            if !self.channel_right {
                self.latch_pending = true;
            }
        } else {
            self.bit_slot += 1;
            if self.bit_slot == 1 && self.latch_pending {
                // End of the word-select delay slot: safe to take the new
                // pair and width without truncating anything in flight.
                self.active = self.pending;
                self.active_width = self.width;
                self.latch_pending = false;
            }
        }
    }

    fn data_bit(&self) -> bool {
        if self.state != EngineState::Run || self.bit_slot == 0 || self.active_width == 0 {
            return false;
        }

        let word = self.active[self.channel_right as usize];
        word >> (self.active_width - self.bit_slot) & 1 != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIVIDER: u32 = 5;
    const WIDTH: u8 = 16;

    /// Half a bit clock period in ticks.
    const HALF_CYCLE: u32 = DIVIDER + 1;

    /// Runs the engine, recording data bits at rising clock edges and the
    /// tick indices of `need_sample` pulses.
    fn run(engine: &mut I2sEngine, ticks: usize) -> (Vec<(bool, bool)>, Vec<usize>) {
        let mut bits = Vec::new();
        let mut pulses = Vec::new();
        let mut last_clk = true;

        for i in 0..ticks {
            let out = engine.tick();
            if out.need_sample {
                pulses.push(i);
                engine.load_sample(0xBADA, 0x110C);
            }
            if out.bclk && !last_clk {
                bits.push((out.lrclk, out.data));
            }
            last_clk = out.bclk;
        }

        (bits, pulses)
    }

    #[test]
    fn need_sample_once_per_stereo_frame() {
        let mut engine = I2sEngine::default();
        engine.set_config(DIVIDER, WIDTH);

        let frame_ticks = 2 * (WIDTH as u32 + 1) * 2 * HALF_CYCLE;
        let (_, pulses) = run(&mut engine, 4 * frame_ticks as usize);

        assert!(pulses.len() >= 3);
        for pair in pulses.windows(2) {
            assert_eq!(pair[1] - pair[0], frame_ticks as usize);
        }
    }

    #[test]
    fn serializes_msb_first_behind_a_delay_slot() {
        let mut engine = I2sEngine::default();
        engine.set_config(DIVIDER, WIDTH);

        let frame_ticks = (2 * (WIDTH as u32 + 1) * 2 * HALF_CYCLE) as usize;
        let (bits, pulses) = run(&mut engine, 3 * frame_ticks);
        assert!(!pulses.is_empty());

        // Skip the first (zero-filled) frame: the pair is loaded at the
        // first pulse and plays from the frame that starts there.
        let slots_per_channel = WIDTH as usize + 1;
        let frame: Vec<(bool, bool)> = bits
            .iter()
            .copied()
            .skip_while(|&(right, _)| right)
            .skip(2 * slots_per_channel)
            .take(2 * slots_per_channel)
            .collect();
        assert_eq!(frame.len(), 2 * slots_per_channel);

        let (left_slots, right_slots) = frame.split_at(slots_per_channel);
        assert!(left_slots.iter().all(|&(right, _)| !right));
        assert!(right_slots.iter().all(|&(right, _)| right));

        let word = |slots: &[(bool, bool)]| {
            slots[1..]
                .iter()
                .fold(0u32, |acc, &(_, bit)| acc << 1 | bit as u32)
        };
        assert_eq!(word(left_slots), 0xBADA);
        assert_eq!(word(right_slots), 0x110C);
    }

    #[test]
    fn zero_configuration_idles_without_clock_activity() {
        let mut engine = I2sEngine::default();

        engine.set_config(0, WIDTH);
        let first = engine.tick();
        for _ in 0..100 {
            let out = engine.tick();
            assert_eq!(out.bclk, first.bclk);
            assert!(!out.need_sample);
        }

        engine.set_config(DIVIDER, 0);
        for _ in 0..100 {
            let out = engine.tick();
            assert_eq!(out.bclk, first.bclk);
            assert!(!out.need_sample);
        }
    }

    #[test]
    fn width_change_waits_for_a_frame_boundary() {
        let mut engine = I2sEngine::default();
        engine.set_config(DIVIDER, WIDTH);

        // Let the first frame get underway, then reconfigure mid-word.
        loop {
            let out = engine.tick();
            if out.need_sample {
                engine.load_sample(0xFFFF, 0xFFFF);
                break;
            }
        }
        for _ in 0..4 * HALF_CYCLE {
            engine.tick();
        }
        engine.set_config(DIVIDER, 24);

        // The in-flight frame still uses 16-bit windows.
        let mut flips = Vec::new();
        let mut last_right = false;
        let mut i = 0usize;
        loop {
            let out = engine.tick();
            if out.lrclk != last_right {
                flips.push(i);
                last_right = out.lrclk;
            }
            i += 1;
            if flips.len() == 3 {
                break;
            }
        }

        // First flip closes the 16-bit left window; the following right
        // window is still 16-bit wide, the one after that is 24-bit.
        let first_window = flips[1] - flips[0];
        let second_window = flips[2] - flips[1];
        assert_eq!(first_window, (WIDTH as usize + 1) * 2 * HALF_CYCLE as usize);
        assert_eq!(second_window, (24 + 1) * 2 * HALF_CYCLE as usize);
    }
}
