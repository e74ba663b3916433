//! Line-capture input.
//!
//! A capture is the raw line signal sampled once per reference-domain tick
//! and packed eight samples per byte, most significant bit first. The reader
//! unpacks it back into the per-tick boolean stream [`LineTiming`]
//! (crate::process::timing::LineTiming) consumes.

use std::io;

use bitstream_io::{BigEndian, BitRead, BitReader};

/// Streaming reader for packed line-sample captures.
#[derive(Debug)]
pub struct CaptureReader<R: io::Read> {
    bs: BitReader<R, BigEndian>,
    ticks: u64,
}

impl<R: io::Read> CaptureReader<R> {
    pub fn new(read: R) -> Self {
        Self {
            bs: BitReader::new(read),
            ticks: 0,
        }
    }

    /// Returns the next line level, or `None` at the end of the capture.
    #[inline(always)]
    pub fn next_level(&mut self) -> io::Result<Option<bool>> {
        match self.bs.read_bit() {
            Ok(level) => {
                self.ticks += 1;
                Ok(Some(level))
            }
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Number of line samples consumed so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn unpacks_msb_first() -> io::Result<()> {
        let mut reader = CaptureReader::new(Cursor::new(vec![0b1010_0000, 0xFF]));

        let mut levels = Vec::new();
        while let Some(level) = reader.next_level()? {
            levels.push(level);
        }

        assert_eq!(reader.ticks(), 16);
        assert_eq!(
            &levels[..8],
            &[true, false, true, false, false, false, false, false]
        );
        assert!(levels[8..].iter().all(|&level| level));
        Ok(())
    }
}
