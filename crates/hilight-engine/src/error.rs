use hilight_core::error::HilightError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine.api_key is required for the openai engine")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("stream error: {0}")]
    Stream(String),
}

impl From<EngineError> for HilightError {
    fn from(e: EngineError) -> Self {
        HilightError::Engine(e.to_string())
    }
}
