//! Error kinds surfaced by the index core.

/// Errors surfaced by the index core.
///
/// Exactly three kinds. `Corrupt` and `Invariant` are terminal; `Io` is
/// transient and bubbles up unchanged. Retries are the harness's
/// responsibility, there is no retry loop in the core. Unspendable outputs
/// and duplicate coinbases are not errors; they are silent skip paths.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The index state cannot be trusted. The operator must wipe and
    /// re-sync.
    #[error("corrupt index: {0}")]
    Corrupt(String),

    /// Transient I/O failure. The in-memory state is left untouched.
    #[error("i/o failure: {0}")]
    Io(String),

    /// A caller broke a documented precondition.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// Result type for index operations.
pub type Result<T> = std::result::Result<T, Error>;
