// Model collaborator seam

use crate::brain::{Brain, BrainError, Message, RequestBuilder};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Produces the next assistant reply for a conversation
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<String, BrainError>;
}

#[async_trait]
impl<M: ModelClient + ?Sized> ModelClient for Arc<M> {
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<String, BrainError> {
        self.as_ref().complete(system, messages).await
    }
}

#[async_trait]
impl ModelClient for Brain {
    async fn complete(&self, system: &str, messages: &[Message]) -> Result<String, BrainError> {
        let config = self.config();
        let request = RequestBuilder::new(config.default_model.clone())
            .system(system)
            .messages(messages.iter().cloned())
            .max_tokens(config.max_output_tokens)
            .temperature(config.temperature)
            .top_p(config.top_p)
            .top_k(config.top_k)
            .build()
            .map_err(|e| BrainError::InvalidRequest(e.to_string()))?;

        let response = self.infer(request).await?;
        let text = response.text();
        debug!(reply_bytes = text.len(), "model reply received");
        Ok(text)
    }
}
