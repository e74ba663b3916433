//! Biphase-mark (BMC) demodulation.
//!
//! Biphase mark coding opens every bit cell with a transition and encodes a
//! one as a second transition at the half-bit mark. The decoder samples the
//! line level at each recovered bit-clock pulse, compares the two halves of
//! a cell, and collects 28 bits into a sub-frame word, pulsing availability
//! for exactly one tick per completed word. A reset aborts mid-word
//! decoding with no output.

use crate::structs::subframe::SubframeWord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BmcState {
    /// Waiting for the first half of the first bit.
    Begin,
    /// Waiting for the second half of a bit.
    BitEnd,
    /// Waiting for the first half of a subsequent bit.
    BitBegin,
    /// Word complete; publish and restart.
    End,
}

/// Demodulates bit-clock-sampled line levels into 28-bit words.
#[derive(Debug, Clone)]
pub struct BmcDecoder {
    state: BmcState,
    first_half: bool,
    counter: u32,
    bits: u32,
}

impl Default for BmcDecoder {
    fn default() -> Self {
        Self {
            state: BmcState::Begin,
            first_half: false,
            counter: 0,
            bits: 0,
        }
    }
}

impl BmcDecoder {
    /// Advances one reference-domain tick. Returns a completed word on the
    /// tick its availability pulses.
    pub fn tick(&mut self, reset: bool, bit_clock: bool, level: bool) -> Option<SubframeWord> {
        match self.state {
            BmcState::Begin => {
                self.counter = 0;
                if bit_clock {
                    self.first_half = level;
                    self.state = BmcState::BitEnd;
                }
                None
            }

            BmcState::BitEnd => {
                if bit_clock {
                    self.counter += 1;
                    // A level flip across the two halves is a one; shift it
                    // in at the top so the first-received bit settles at
                    // bit 0.
                    self.bits = self.bits >> 1
                        | ((self.first_half != level) as u32) << (SubframeWord::BITS - 1);
                    self.state = if self.counter != SubframeWord::BITS {
                        BmcState::BitBegin
                    } else {
                        BmcState::End
                    };
                } else if reset {
                    self.state = BmcState::Begin;
                }
                None
            }

            BmcState::BitBegin => {
                if bit_clock {
                    self.first_half = level;
                    self.state = BmcState::BitEnd;
                } else if reset {
                    self.state = BmcState::Begin;
                }
                None
            }

            BmcState::End => {
                self.state = BmcState::Begin;
                Some(SubframeWord::from_raw(self.bits))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the decoder directly: one bit-clock pulse per half-bit, two
    /// idle ticks between pulses.
    fn feed(decoder: &mut BmcDecoder, levels: &[bool]) -> Vec<SubframeWord> {
        let mut words = Vec::new();
        for &level in levels {
            words.extend(decoder.tick(false, true, level));
            words.extend(decoder.tick(false, false, level));
            words.extend(decoder.tick(false, false, level));
        }
        words
    }

    /// BMC-encodes a word into half-bit levels, starting from `level`.
    fn encode(word: SubframeWord, mut level: bool) -> Vec<bool> {
        let mut levels = Vec::new();
        for bit in 0..SubframeWord::BITS {
            level = !level;
            levels.push(level);
            if word.raw() >> bit & 1 != 0 {
                level = !level;
            }
            levels.push(level);
        }
        levels
    }

    #[test]
    fn decode_inverts_encode() {
        let mut decoder = BmcDecoder::default();

        for &raw in &[0x0000_0000u32, 0x0FFF_FFFF, 0x0AAA_AAAA, 0x0BAD_CA5A] {
            let word = SubframeWord::from_raw(raw);
            // Polarity must not matter.
            for start_level in [false, true] {
                let words = feed(&mut decoder, &encode(word, start_level));
                assert_eq!(words, vec![word]);
            }
        }
    }

    #[test]
    fn one_availability_pulse_per_word() {
        let mut decoder = BmcDecoder::default();
        let word = SubframeWord::from_raw(0x0123_4567);

        let mut levels = encode(word, false);
        levels.extend(encode(word, *levels.last().unwrap()));

        let words = feed(&mut decoder, &levels);
        assert_eq!(words.len(), 2);
        assert!(words.iter().all(|&w| w == word));
    }

    #[test]
    fn reset_aborts_mid_word_without_output() {
        let mut decoder = BmcDecoder::default();
        let word = SubframeWord::from_raw(0x0FED_CBA9);
        let levels = encode(word, false);

        // Partially decode, then reset between pulses.
        for &level in &levels[..20] {
            assert!(decoder.tick(false, true, level).is_none());
            assert!(decoder.tick(false, false, level).is_none());
        }
        assert!(decoder.tick(true, false, false).is_none());

        // A fresh word must still come through intact.
        let words = feed(&mut decoder, &encode(word, false));
        assert_eq!(words, vec![word]);
    }
}
