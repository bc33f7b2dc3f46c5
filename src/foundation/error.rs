/// Convenience result type used across hilite.
pub type HiliteResult<T> = Result<T, HiliteError>;

/// Top-level error taxonomy used by engine APIs.
///
/// Every variant is fatal for the render that raised it. Recoverable
/// conditions (an overlay clip going unreadable mid-stream, a missing audio
/// backend) are handled in place with a warning and never surface here.
#[derive(thiserror::Error, Debug)]
pub enum HiliteError {
    /// A phrase or word-index selection could not be resolved against the
    /// transcript.
    #[error("resolution error: {0}")]
    Resolution(String),

    /// A referenced asset file (overlay clip, music track, font) does not
    /// exist where the project says it should.
    #[error("asset not found: {0}")]
    AssetMissing(String),

    /// The base video (or its metadata) could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The output encoder could not be started or finalized.
    #[error("encode error: {0}")]
    Encode(String),

    /// Invalid user-provided configuration or project data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HiliteError {
    /// Build a [`HiliteError::Resolution`] value.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::Resolution(msg.into())
    }

    /// Build a [`HiliteError::AssetMissing`] value.
    pub fn asset_missing(msg: impl Into<String>) -> Self {
        Self::AssetMissing(msg.into())
    }

    /// Build a [`HiliteError::Decode`] value.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Build a [`HiliteError::Encode`] value.
    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    /// Build a [`HiliteError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}
