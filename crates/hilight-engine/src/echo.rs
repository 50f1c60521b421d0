use async_trait::async_trait;

use hilight_core::collab::{FragmentKind, ReplyEngine, ReplySink};
use hilight_core::error::Result;
use hilight_core::types::InboundContext;

/// Replies with the inbound body. Useful against the local test relay.
pub struct EchoEngine;

#[async_trait]
impl ReplyEngine for EchoEngine {
    fn name(&self) -> &str {
        "echo"
    }

    async fn generate(&self, ctx: &InboundContext, sink: &dyn ReplySink) -> Result<()> {
        sink.on_start();
        sink.on_fragment(&ctx.body_for_agent, FragmentKind::Final);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use hilight_core::types::ChatType;

    use super::*;

    #[derive(Default)]
    struct Recording {
        started: Mutex<u32>,
        fragments: Mutex<Vec<(String, FragmentKind)>>,
    }

    impl ReplySink for Recording {
        fn on_start(&self) {
            *self.started.lock().unwrap() += 1;
        }

        fn on_fragment(&self, text: &str, kind: FragmentKind) {
            self.fragments.lock().unwrap().push((text.to_string(), kind));
        }
    }

    #[tokio::test]
    async fn echoes_body_as_final_fragment() {
        let ctx = InboundContext {
            body: "hi there".into(),
            body_for_agent: "hi there".into(),
            from: "u1".into(),
            to: "hi-light".into(),
            provider: "hi-light".into(),
            account_id: "default".into(),
            chat_type: ChatType::Direct,
            session_key: "agent:main:hi-light:direct:u1".into(),
            is_groupchat: false,
            sender_name: "u1".into(),
            timestamp: 0,
        };
        let sink = Recording::default();
        EchoEngine.generate(&ctx, &sink).await.unwrap();

        assert_eq!(*sink.started.lock().unwrap(), 1);
        assert_eq!(
            *sink.fragments.lock().unwrap(),
            vec![("hi there".to_string(), FragmentKind::Final)]
        );
    }
}
