use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{debug, warn};

use hilight_core::collab::{FragmentKind, ReplyEngine, ReplySink};
use hilight_core::types::InboundContext;

use crate::error::EngineError;
use crate::stream::{parse_sse_line, LineBuffer, SseParsed};

/// Streams chat completions from any OpenAI-compatible endpoint.
pub struct OpenAiCompatEngine {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    system: String,
    max_tokens: u32,
}

impl OpenAiCompatEngine {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        system: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            system,
            max_tokens,
        }
    }

    async fn stream_reply(
        &self,
        ctx: &InboundContext,
        sink: &dyn ReplySink,
    ) -> Result<(), EngineError> {
        let body = build_request_body(&self.model, &self.system, &ctx.body_for_agent, self.max_tokens);
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %self.model, session = %ctx.session_key, "sending streaming request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| s * 1000)
                .unwrap_or(5000);
            return Err(EngineError::RateLimited {
                retry_after_ms: retry,
            });
        }

        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "completion API error");
            return Err(EngineError::Api {
                status,
                message: text,
            });
        }

        let mut lines = LineBuffer::default();
        let mut byte_stream = resp.bytes_stream();
        let mut finished = false;

        while let Some(chunk) = byte_stream.next().await {
            let chunk = chunk.map_err(|e| EngineError::Stream(e.to_string()))?;
            for line in lines.push(&chunk) {
                if emit_line(&line, sink) == LineOutcome::Done {
                    finished = true;
                    break;
                }
            }
            if finished {
                break;
            }
        }
        if !finished {
            if let Some(tail) = lines.finish() {
                emit_line(&tail, sink);
            }
        }

        sink.on_fragment("", FragmentKind::Final);
        Ok(())
    }
}

#[async_trait]
impl ReplyEngine for OpenAiCompatEngine {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(&self, ctx: &InboundContext, sink: &dyn ReplySink) -> hilight_core::Result<()> {
        sink.on_start();
        self.stream_reply(ctx, sink).await.map_err(Into::into)
    }
}

#[derive(Debug, PartialEq, Eq)]
enum LineOutcome {
    Continue,
    Done,
}

/// Forward the text deltas carried by one SSE line to `sink`.
fn emit_line(line: &str, sink: &dyn ReplySink) -> LineOutcome {
    let Some(SseParsed::Data(data)) = parse_sse_line(line) else {
        return LineOutcome::Continue;
    };
    // End-of-stream is a literal `[DONE]` data value.
    if data.trim() == "[DONE]" {
        return LineOutcome::Done;
    }

    match serde_json::from_str::<StreamChunk>(&data) {
        Ok(chunk) => {
            for choice in &chunk.choices {
                if let Some(content) = choice.delta.content.as_deref() {
                    if !content.is_empty() {
                        sink.on_fragment(content, FragmentKind::Block);
                    }
                }
            }
        }
        Err(e) => debug!(error = %e, "skipping unparseable stream chunk"),
    }
    LineOutcome::Continue
}

fn build_request_body(model: &str, system: &str, user: &str, max_tokens: u32) -> serde_json::Value {
    serde_json::json!({
        "model": model,
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": user },
        ],
        "max_tokens": max_tokens,
        "stream": true,
    })
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Collect(Mutex<Vec<(String, FragmentKind)>>);

    impl ReplySink for Collect {
        fn on_start(&self) {}
        fn on_fragment(&self, text: &str, kind: FragmentKind) {
            self.0.lock().unwrap().push((text.to_string(), kind));
        }
    }

    #[test]
    fn deltas_become_block_fragments() {
        let sink = Collect::default();
        let line = r#"data: {"choices":[{"delta":{"content":"hel"}}]}"#;
        assert_eq!(emit_line(line, &sink), LineOutcome::Continue);
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#;
        assert_eq!(emit_line(line, &sink), LineOutcome::Continue);
        assert_eq!(
            *sink.0.lock().unwrap(),
            vec![("hel".to_string(), FragmentKind::Block)]
        );
    }

    #[test]
    fn done_marker_ends_stream() {
        let sink = Collect::default();
        assert_eq!(emit_line("data: [DONE]", &sink), LineOutcome::Done);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn garbage_lines_are_ignored() {
        let sink = Collect::default();
        assert_eq!(emit_line("data: {not json", &sink), LineOutcome::Continue);
        assert_eq!(emit_line("event: ping", &sink), LineOutcome::Continue);
        assert!(sink.0.lock().unwrap().is_empty());
    }

    #[test]
    fn request_body_streams_system_and_user() {
        let body = build_request_body("gpt-4o-mini", "be brief", "hi", 256);
        assert_eq!(body["stream"], true);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "hi");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let engine = OpenAiCompatEngine::new(
            "k".into(),
            "http://localhost:8080/".into(),
            "m".into(),
            "s".into(),
            10,
        );
        assert_eq!(engine.base_url, "http://localhost:8080");
    }
}
