use thiserror::Error;

/// Errors returned by [`Dict`](crate::Dict) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DictError {
    /// An entry with an equal key is already present.
    #[error("key already exists")]
    KeyExists,

    /// No entry with an equal key is present.
    #[error("key not found")]
    NotFound,

    /// The operation is not valid in the dictionary's current state, e.g.
    /// expanding while a rehash is already in progress.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// A bucket array could not be allocated. The dictionary does not roll
    /// back multi-step work, so callers should treat the instance as lost.
    #[error("failed to allocate a bucket array of {buckets} slots")]
    AllocFailure {
        /// Number of buckets that was requested.
        buckets: usize,
    },

    /// An unsafe iterator was released after the dictionary had been
    /// structurally modified underneath it.
    #[error("dictionary was modified while an unsafe iterator was live")]
    IteratorMisuse,
}

impl DictError {
    /// Returns `true` for errors that indicate the instance (or the caller's
    /// use of it) can no longer be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AllocFailure { .. } | Self::IteratorMisuse)
    }
}
