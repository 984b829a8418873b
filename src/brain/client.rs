// Brain client - HTTP communication with inference backend

use super::{BrainConfig, BrainError, BrainInitError, MessageRequest, MessageResponse};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Upper bound for a single backoff delay
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Brain client for LLM inference
#[derive(Clone)]
pub struct Brain {
    config: BrainConfig,
    client: Client,
}

impl Brain {
    pub fn new(config: BrainConfig) -> Result<Self, BrainInitError> {
        info!(
            endpoint = %config.endpoint,
            model = %config.default_model,
            timeout_secs = config.request_timeout_secs,
            max_retries = config.max_retries,
            "initializing brain"
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    pub fn config(&self) -> &BrainConfig {
        &self.config
    }

    /// Perform inference, retrying transient failures with exponential backoff
    pub async fn infer(&self, request: MessageRequest) -> Result<MessageResponse, BrainError> {
        debug!(
            model = %request.model,
            messages_count = request.messages.len(),
            has_system = request.system.is_some(),
            max_tokens = request.max_tokens,
            "starting inference"
        );

        let start = Instant::now();
        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let err = match self.send_request(&request).await {
                Ok(response) => {
                    let (input_tokens, output_tokens) = response
                        .usage
                        .as_ref()
                        .map(|u| (u.input_tokens, u.output_tokens))
                        .unwrap_or((0, 0));

                    info!(
                        model = %response.model,
                        input_tokens = input_tokens,
                        output_tokens = output_tokens,
                        latency_ms = start.elapsed().as_millis() as u64,
                        retries = retries,
                        stop_reason = ?response.stop_reason,
                        "inference completed"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                error!(error = %err, "inference failed: not retryable");
                return Err(err);
            }

            retries += 1;
            if retries > max_retries {
                error!(
                    retries = retries,
                    total_latency_ms = start.elapsed().as_millis() as u64,
                    error = %err,
                    "inference failed: exhausted retries"
                );
                return Err(BrainError::Exhausted {
                    retries,
                    last_error: err.to_string(),
                });
            }

            let delay = self.retry_delay(retries);
            warn!(
                retry = retries,
                max_retries = max_retries,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "inference failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let multiplier = 2u64.saturating_pow(attempt.saturating_sub(1));
        let delay_ms = self.config.base_retry_delay_ms.saturating_mul(multiplier);
        Duration::from_millis(delay_ms.min(MAX_RETRY_DELAY_MS))
    }

    async fn send_request(&self, request: &MessageRequest) -> Result<MessageResponse, BrainError> {
        let url = format!("{}/v1/messages", self.config.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", &self.config.api_key))
            .header("anthropic-version", "2023-06-01")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        debug!(status = status.as_u16(), "received HTTP response");

        let body = response.text().await?;
        if status.is_success() {
            return Ok(serde_json::from_str(&body)?);
        }

        Err(match status {
            StatusCode::UNAUTHORIZED => BrainError::AuthenticationFailed(body),
            StatusCode::BAD_REQUEST => BrainError::InvalidRequest(body),
            StatusCode::PAYMENT_REQUIRED => BrainError::InsufficientBalance(body),
            StatusCode::TOO_MANY_REQUESTS => BrainError::ModelError(format!("HTTP 429: {}", body)),
            s if s.is_server_error() => BrainError::ModelError(body),
            s => BrainError::InvalidRequest(format!("HTTP {}: {}", s, body)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BrainConfig {
        BrainConfig {
            endpoint: "http://127.0.0.1:9".into(),
            api_key: "test".into(),
            default_model: "test-model".into(),
            max_retries: 3,
            base_retry_delay_ms: 1000,
            request_timeout_secs: 5,
            max_output_tokens: 1024,
            temperature: None,
            top_p: None,
            top_k: None,
        }
    }

    #[test]
    fn test_retry_delay_backoff() {
        let brain = Brain::new(config()).unwrap();
        assert_eq!(brain.retry_delay(1), Duration::from_millis(1000));
        assert_eq!(brain.retry_delay(2), Duration::from_millis(2000));
        assert_eq!(brain.retry_delay(3), Duration::from_millis(4000));
        assert_eq!(brain.retry_delay(10), Duration::from_millis(MAX_RETRY_DELAY_MS));
    }
}
