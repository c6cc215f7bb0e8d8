use enough::StopReason;

/// Errors from validation-gated encoding, container parsing and decoding.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RasterError {
    /// Invalid dimension, bit depth, ratio, tile or layer value.
    ///
    /// Correctable by the caller before encoding.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed or truncated container data.
    #[error("format violation at byte {offset}: {reason}")]
    FormatViolation { offset: u64, reason: String },

    /// The requested capability is not available in the current backend.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// An estimated or declared size exceeds a configured ceiling.
    #[error("resource limit exceeded: {0}")]
    ResourceExhaustion(String),

    #[error("buffer too small: need {needed} bytes, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    #[error("operation cancelled")]
    Cancelled(StopReason),
}

impl RasterError {
    pub(crate) fn violation(offset: usize, reason: impl Into<String>) -> Self {
        RasterError::FormatViolation {
            offset: offset as u64,
            reason: reason.into(),
        }
    }
}

impl From<StopReason> for RasterError {
    fn from(r: StopReason) -> Self {
        RasterError::Cancelled(r)
    }
}
