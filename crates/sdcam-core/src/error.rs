/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport timeout")]
    Timeout,

    /// Trailing word of a received frame disagrees with the XOR of the preceding words.
    #[error("Checksum error: expected {expected:#06x}, got {actual:#06x}")]
    ChecksumMismatch { expected: u16, actual: u16 },

    #[error("Short response: expected at least {expected} words, got {actual}")]
    ShortResponse { expected: usize, actual: usize },

    #[error("Command queue closed")]
    QueueClosed,

    #[error("Command dropped before replying")]
    ReplyDropped,
}
