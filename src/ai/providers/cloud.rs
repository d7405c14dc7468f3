//! Cloud inference driver for OpenAI-compatible chat-completion APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::ai::{InferenceDriver, InferenceRequest, InferenceResponse, ProviderError};
use crate::config::CloudProviderConfig;

/// System prompt steering the model toward structured automation output.
const SYSTEM_PROMPT: &str = "You are a home-automation assistant. Respond with a single JSON \
     object containing: suggestion_type, automation (a structured automation definition), \
     confidence (0-1), and safety_score (0-1).";

/// Driver for a remote OpenAI-compatible provider.
#[derive(Debug, Clone)]
pub struct CloudDriver {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Default, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl CloudDriver {
    /// Create a driver from provider configuration.
    pub fn new(config: &CloudProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn api_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }
}

/// Map a reqwest transport error into the provider taxonomy.
///
/// Timeouts and connection failures are network errors for classification
/// purposes; everything else is unclassified.
pub(crate) fn map_transport_error(e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() || e.is_connect() {
        ProviderError::Network(e.to_string())
    } else {
        ProviderError::Other(e.to_string())
    }
}

/// Map a non-success HTTP status into the provider taxonomy.
pub(crate) fn map_status_error(status: u16, body: &str) -> ProviderError {
    let message = body.chars().take(500).collect::<String>();
    match status {
        429 => ProviderError::RateLimited(message),
        500..=599 => ProviderError::Server { status, message },
        400..=499 => ProviderError::Request { status, message },
        _ => ProviderError::Other(format!("unexpected status {status}: {message}")),
    }
}

#[async_trait]
impl InferenceDriver for CloudDriver {
    async fn generate(&self, req: InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": req.prompt},
            ],
            "max_tokens": req.max_tokens,
            "temperature": req.temperature,
            "response_format": {"type": "json_object"},
        });

        let mut request = self.client.post(self.api_url()).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &body));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("malformed completion: {e}")))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| ProviderError::Other("completion had no choices".to_string()))?;

        let output = serde_json::from_str(content)
            .map_err(|e| ProviderError::Other(format!("model output was not JSON: {e}")))?;

        Ok(InferenceResponse {
            output,
            prompt_tokens: completion.usage.prompt_tokens,
            completion_tokens: completion.usage.completion_tokens,
        })
    }

    fn name(&self) -> &'static str {
        "cloud"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            map_status_error(429, "slow down"),
            ProviderError::RateLimited(_)
        ));
        assert!(matches!(
            map_status_error(503, "overloaded"),
            ProviderError::Server { status: 503, .. }
        ));
        assert!(matches!(
            map_status_error(401, "bad key"),
            ProviderError::Request { status: 401, .. }
        ));
        assert!(matches!(
            map_status_error(400, "bad request"),
            ProviderError::Request { status: 400, .. }
        ));
        assert!(matches!(
            map_status_error(302, "redirect"),
            ProviderError::Other(_)
        ));
    }

    #[test]
    fn test_status_message_truncated() {
        let long = "x".repeat(2000);
        if let ProviderError::Server { message, .. } = map_status_error(500, &long) {
            assert_eq!(message.len(), 500);
        } else {
            panic!("expected server error");
        }
    }
}
