use thiserror::Error;

use crate::data::MAX_FILTER_PATTERNS;

/// Errors returned by the session runtime itself.
///
/// Failures inside adapter callbacks during a sampling pass are absorbed
/// (see [`AdapterError`]); this enum covers the operations the owner calls
/// directly, which leave no partial state behind on failure.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// A required argument was missing or malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// The requested stat id is not present in the cached name table.
    #[error("stat id {0} is not in the cached table")]
    NotFound(u64),

    /// The supplied pattern list exceeds the per-source filter limit.
    #[error("{0} filter patterns exceeds the limit of {}", MAX_FILTER_PATTERNS)]
    TooManyPatterns(usize),

    /// The session behind this handle has been freed.
    #[error("session has been freed")]
    SessionGone,

    /// The record behind this handle has been unregistered.
    #[error("record has been unregistered")]
    Unregistered,

    /// An adapter callback reported failure on an explicitly requested
    /// operation (e.g. a reset).
    #[error("adapter failure: {0}")]
    Adapter(String),
}

/// Failure reported by a source or sink callback.
///
/// The runtime does not interpret these beyond logging; a message is all
/// an adapter needs to carry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct AdapterError(pub String);

impl AdapterError {
    pub fn new(msg: impl Into<String>) -> Self {
        AdapterError(msg.into())
    }
}

impl From<&str> for AdapterError {
    fn from(msg: &str) -> Self {
        AdapterError(msg.to_owned())
    }
}

impl From<String> for AdapterError {
    fn from(msg: String) -> Self {
        AdapterError(msg)
    }
}

impl From<std::io::Error> for AdapterError {
    fn from(err: std::io::Error) -> Self {
        AdapterError(err.to_string())
    }
}

/// Result type for adapter callbacks.
pub type AdapterResult<T> = Result<T, AdapterError>;
