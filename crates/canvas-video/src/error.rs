use thiserror::Error;

/// Failures reported by a media engine implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine has been released")]
    Released,
    #[error("failed to prepare media: {0}")]
    Prepare(String),
    #[error("video output rejected: {0}")]
    OutputRejected(String),
    #[error("playback failed: {0}")]
    Playback(String),
}

/// Failures surfaced by the render context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("texture allocation failed: {0}")]
    Allocation(String),
}

/// Everything the video element can fail with. All of these are recovered
/// locally; callers see them in logs and in the returned `Result`s, never as a
/// panic or a host-facing event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VideoError {
    #[error("cannot resolve media source {input:?}: {reason}")]
    SourceResolution { input: String, reason: String },
    #[error("engine rejected request: {0}")]
    EngineRejection(EngineError),
    #[error("engine runtime failure: {0}")]
    EngineRuntime(EngineError),
    #[error(transparent)]
    Render(#[from] RenderError),
}
