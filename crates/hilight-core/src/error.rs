use thiserror::Error;

#[derive(Debug, Error)]
pub enum HilightError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    #[error("Session store error: {0}")]
    Session(String),

    #[error("Reply engine error: {0}")]
    Engine(String),
}

impl HilightError {
    /// Short error code string sent to the relay in `error` envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            HilightError::Config(_) => "CONFIG_ERROR",
            HilightError::Dispatch(_) => "DISPATCH_FAILED",
            HilightError::Session(_) => "SESSION_ERROR",
            HilightError::Engine(_) => "ENGINE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, HilightError>;
