/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame geometry: {width}x{height} needs {expected} samples, got {actual}")]
    Geometry {
        width: usize,
        height: usize,
        expected: usize,
        actual: usize,
    },

    #[error("Capture source error: {0}")]
    Source(String),

    #[error("Acquisition thread panicked")]
    Panicked,
}
