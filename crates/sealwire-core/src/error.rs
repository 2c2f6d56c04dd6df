use std::io;
use std::sync::Arc;

use thiserror::Error;

use crate::encoding::IntEncoding;

pub type SealResult<T> = Result<T, SealError>;

/// Every failure the cipher layer and the stream protocol can report.
///
/// The type is `Clone` so stream instances can cache the first failure and
/// hand it back on every later call.
#[derive(Debug, Clone, Error)]
pub enum SealError {
    #[error("nonce space exhausted: no more chunks can be sealed under this key")]
    NonceExhausted,

    #[error("authentication failed: wrong key, corrupted or tampered ciphertext")]
    AuthenticationFailed,

    #[error("encryption failed")]
    EncryptionFailed,

    #[error("ciphertext has no nonce or the nonce is malformed")]
    NonceInvalid,

    #[error("ciphertext has an invalid format or is corrupted")]
    CiphertextInvalid,

    #[error("stream chunks reordered: expected chunk {expected}, found {found}")]
    ChunksReordered { expected: u64, found: u64 },

    #[error("terminator chunk carries payload")]
    InvalidTerminator,

    #[error("declared chunk size {declared} exceeds limit {limit}")]
    ChunkTooBig { declared: u64, limit: u64 },

    #[error("value {value} does not fit {encoding:?}")]
    IntTooWide { value: u64, encoding: IntEncoding },

    #[error("stream truncated: input ended without a terminator chunk")]
    StreamTruncated,

    #[error("stream already closed")]
    StreamClosed,

    #[error("invalid key length: expected {expected}, got {actual}")]
    KeyInvalid { expected: usize, actual: usize },

    #[error("random source failed: {0}")]
    Random(String),

    #[error("config error: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(Arc<io::Error>),
}

impl SealError {
    /// Recover the typed error from an `io::Error` produced by the stream
    /// `Read`/`Write` adapters.
    pub fn from_io(err: &io::Error) -> Option<&SealError> {
        err.get_ref()?.downcast_ref::<SealError>()
    }

    /// True for failures that indicate tampering or a corrupt encoding.
    pub fn is_tampering(&self) -> bool {
        matches!(
            self,
            SealError::AuthenticationFailed
                | SealError::NonceInvalid
                | SealError::CiphertextInvalid
                | SealError::ChunksReordered { .. }
                | SealError::InvalidTerminator
                | SealError::ChunkTooBig { .. }
        )
    }

    fn io_kind(&self) -> io::ErrorKind {
        match self {
            SealError::StreamTruncated => io::ErrorKind::UnexpectedEof,
            SealError::StreamClosed => io::ErrorKind::BrokenPipe,
            SealError::InvalidConfig(_) | SealError::KeyInvalid { .. } => {
                io::ErrorKind::InvalidInput
            }
            // Interrupted would make std's retry loops spin on a cached error.
            SealError::Io(e) if e.kind() == io::ErrorKind::Interrupted => io::ErrorKind::Other,
            SealError::Io(e) => e.kind(),
            SealError::NonceExhausted
            | SealError::EncryptionFailed
            | SealError::IntTooWide { .. }
            | SealError::Random(_) => io::ErrorKind::Other,
            _ => io::ErrorKind::InvalidData,
        }
    }
}

impl From<io::Error> for SealError {
    fn from(err: io::Error) -> Self {
        SealError::Io(Arc::new(err))
    }
}

impl From<SealError> for io::Error {
    fn from(err: SealError) -> Self {
        io::Error::new(err.io_kind(), err)
    }
}
