use thiserror::Error;

/// Failure taxonomy for the generation-and-assembly pipeline.
///
/// `Generation` covers transport failures and non-JSON output from the text
/// model; the `Malformed*` variants mean the model returned JSON that failed
/// shape validation. None of these are retried at this layer.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("malformed outline: {0}")]
    MalformedOutline(String),

    #[error("malformed transcript: {0}")]
    MalformedTranscript(String),

    #[error("segment index {index} out of range (outline has {len} segments)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("synthesis failed: {0}")]
    Synthesis(String),

    #[error("storage error: {0}")]
    Storage(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
