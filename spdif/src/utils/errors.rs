#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusError {
    #[error("Channel status declares a professional-format stream")]
    ProfessionalStream,

    #[error("Channel status declares a non-PCM payload")]
    NonPcmPayload,

    #[error("Unsupported channel mode in channel status: {0:#04b}")]
    UnsupportedMode(u8),

    #[error("Invalid word length code: {0:#06b}")]
    InvalidWordLength(u8),

    #[error("Invalid sample rate code: {0:#06b}")]
    InvalidSampleRate(u8),

    #[error("Invalid channel assignment code: {0:#06b}")]
    InvalidChannelAssignment(u8),
}

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockError {
    #[error("Parity check failed on sub-frame {frame}")]
    ParityCheckFailed { frame: usize },

    #[error("Validity flag set on sub-frame {frame}")]
    ValidityFlagged { frame: usize },

    #[error("Sample buffer overflowed on sub-frame {frame}")]
    BufferOverflow { frame: usize },

    #[error("Mismatch in channel sample counts: A = {a}, B = {b}")]
    SampleCountMismatch { a: usize, b: usize },

    #[error("Channel status rejected: {0}")]
    Status(#[from] StatusError),
}
