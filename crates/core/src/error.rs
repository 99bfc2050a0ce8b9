/// Result alias that carries the custom [`AetherError`] type.
pub type Result<T> = std::result::Result<T, AetherError>;

/// Common error type for the core crate.
///
/// Only construction-time failures surface here. The publish and poll paths
/// of the event channel degrade to `false` / `None` instead of returning an
/// error, since a transient failure must not stop a render loop.
#[derive(Debug, thiserror::Error)]
pub enum AetherError {
    /// Free-form message for failures without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Event or configuration JSON could not be encoded or decoded.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// The analyser was handed a frame of the wrong length.
    #[error("invalid frame: expected {expected} samples, got {actual}")]
    InvalidFrame { expected: usize, actual: usize },
    /// The frequency transform rejected its buffers.
    #[error("fft: {0}")]
    Fft(String),
    /// The mapped region is shorter than the fixed channel size.
    #[error("shared region is {actual} bytes, need {required}")]
    RegionTooSmall { required: usize, actual: usize },
}

impl AetherError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for AetherError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for AetherError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
