//! Default reply-generation engines.

pub mod echo;
pub mod error;
pub mod openai;
pub mod stream;

use std::sync::Arc;

use hilight_core::collab::ReplyEngine;
use hilight_core::config::{EngineConfig, EngineKind};

pub use echo::EchoEngine;
pub use error::EngineError;
pub use openai::OpenAiCompatEngine;

/// Build the engine selected by `[engine] kind`.
pub fn build_engine(cfg: &EngineConfig) -> Result<Arc<dyn ReplyEngine>, EngineError> {
    match cfg.kind {
        EngineKind::Echo => Ok(Arc::new(EchoEngine)),
        EngineKind::OpenAi => {
            let api_key = cfg
                .api_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .ok_or(EngineError::MissingApiKey)?;
            Ok(Arc::new(OpenAiCompatEngine::new(
                api_key.to_string(),
                cfg.base_url.clone(),
                cfg.model.clone(),
                cfg.system.clone(),
                cfg.max_tokens,
            )))
        }
    }
}
