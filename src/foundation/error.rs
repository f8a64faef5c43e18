/// Convenience result type used across skyloop.
pub type SkyloopResult<T> = Result<T, SkyloopError>;

/// Top-level error taxonomy used by library APIs.
///
/// Acquisition-layer failures are normally absorbed into empty or degraded results before they
/// reach a caller; only the low-level fetcher and the export layer return them directly.
#[derive(thiserror::Error, Debug)]
pub enum SkyloopError {
    /// Invalid user-provided configuration, catalog or request data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network failure or non-success HTTP status while fetching a listing or image.
    #[error("acquisition error: {0}")]
    Acquisition(String),

    /// Image bytes could not be decoded, or decoding did not finish in time.
    #[error("decode error: {0}")]
    Decode(String),

    /// Too few sources or frames to build a meaningful synchronized timeline.
    #[error(
        "not enough synchronized frames: built {entries} timeline entries, need at least {required}"
    )]
    SynchronizationShortfall {
        /// Entries that survived alignment.
        entries: usize,
        /// Entries required by the caller.
        required: usize,
    },

    /// Encoder backend failure during export.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The operation was cancelled by the user.
    #[error("operation cancelled")]
    Cancelled,

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SkyloopError {
    /// Build a [`SkyloopError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`SkyloopError::Acquisition`] value.
    pub fn acquisition(msg: impl Into<String>) -> Self {
        Self::Acquisition(msg.into())
    }

    /// Build a [`SkyloopError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`SkyloopError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`SkyloopError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for [`SkyloopError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<serde_json::Error> for SkyloopError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serde(e.to_string())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
