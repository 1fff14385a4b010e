use async_trait::async_trait;

use crate::storage::{Message, ToolCall};

/// What the model returned for one Decide step: a textual answer plus
/// zero or more tool-call requests. An empty `tool_calls` means the run
/// is done.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn is_final(&self) -> bool {
        self.tool_calls.is_empty()
    }
}

/// The opaque completion capability the control loop drives.
///
/// Prompt construction, model selection, and sampling parameters all live
/// behind this seam; the loop only supplies the full ordered message
/// history and consumes the reply.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn invoke(&self, messages: &[Message]) -> anyhow::Result<ModelReply>;
}
