use std::fmt;

/// Errors raised by blob store operations.
#[derive(Debug)]
pub enum BlobError {
    /// No blob exists under the given key.
    NotFound(String),
    /// An I/O error occurred while reading or writing blob data.
    Io(std::io::Error),
    /// The given key is not a valid SHA-256 hex string.
    InvalidKey(String),
    /// The blob is larger than the store accepts.
    TooLarge { actual: u64, limit: u64 },
}

impl fmt::Display for BlobError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(key) => write!(f, "blob not found: {key}"),
            Self::Io(err) => write!(f, "blob IO error: {err}"),
            Self::InvalidKey(msg) => write!(f, "invalid blob key: {msg}"),
            Self::TooLarge { actual, limit } => {
                write!(f, "blob too large ({actual} > {limit} bytes)")
            }
        }
    }
}

impl std::error::Error for BlobError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for BlobError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}
