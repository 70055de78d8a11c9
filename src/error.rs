use thiserror::Error;

/// Failure taxonomy of the event pipeline.
///
/// Each variant is caught at the boundary where it occurs and turned into a
/// log entry plus a continue/bool decision. Only `Device` (and `Config`, which
/// happens before the loop exists) may abort the process.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Frame source unavailable at startup.
    #[error("device error: {0}")]
    Device(String),

    /// Detection call failed or returned malformed data for one frame.
    #[error("detection error: {0}")]
    Detection(String),

    /// Annotated image write or re-encode failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Network failure, timeout or non-200 response from the collector.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Device(_) => "device",
            PipelineError::Detection(_) => "detection",
            PipelineError::Storage(_) => "storage",
            PipelineError::Dispatch(_) => "dispatch",
            PipelineError::Config(_) => "config",
        }
    }

    /// Whether this error stops the process instead of the current frame.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Device(_) | PipelineError::Config(_))
    }

    pub(crate) fn device(err: impl std::fmt::Display) -> Self {
        PipelineError::Device(err.to_string())
    }

    pub(crate) fn detection(err: impl std::fmt::Display) -> Self {
        PipelineError::Detection(err.to_string())
    }

    pub(crate) fn storage(err: impl std::fmt::Display) -> Self {
        PipelineError::Storage(err.to_string())
    }

    pub(crate) fn dispatch(err: impl std::fmt::Display) -> Self {
        PipelineError::Dispatch(err.to_string())
    }
}
