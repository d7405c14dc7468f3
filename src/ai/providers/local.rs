//! Local inference driver for an Ollama-style on-device model server.
//!
//! The local model is cheaper and private but weaker, so the driver also
//! estimates a per-context confidence that the hybrid router compares
//! against the configured local-confidence threshold.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::ai::providers::cloud::{map_status_error, map_transport_error};
use crate::ai::{
    AutomationContext, InferenceDriver, InferenceRequest, InferenceResponse, ProviderError,
};
use crate::config::LocalProviderConfig;

/// Pattern types the local model is trained to handle well.
const STRONG_PATTERNS: [&str; 3] = ["time_of_day", "co_occurrence", "presence"];

/// Entity count above which the local model's output quality degrades.
const ENTITY_SOFT_LIMIT: usize = 6;

/// Driver for a local model server speaking the Ollama generate API.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    client: Client,
    base_url: String,
    model: String,
    strong_patterns: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

impl LocalDriver {
    /// Create a driver from local provider configuration.
    pub fn new(config: &LocalProviderConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Other(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            strong_patterns: STRONG_PATTERNS.iter().map(ToString::to_string).collect(),
        })
    }
}

#[async_trait]
impl InferenceDriver for LocalDriver {
    async fn generate(&self, req: InferenceRequest) -> Result<InferenceResponse, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": req.prompt,
            "stream": false,
            "format": "json",
            "options": {
                "num_predict": req.max_tokens,
                "temperature": req.temperature,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status_error(status.as_u16(), &body));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Other(format!("malformed response: {e}")))?;

        let output = serde_json::from_str(&generated.response)
            .map_err(|e| ProviderError::Other(format!("model output was not JSON: {e}")))?;

        Ok(InferenceResponse {
            output,
            prompt_tokens: generated.prompt_eval_count,
            completion_tokens: generated.eval_count,
        })
    }

    /// Heuristic confidence estimate.
    ///
    /// Full confidence for pattern types the local model handles well,
    /// scaled down as the entity count grows past the soft limit; unknown
    /// pattern types start from a low base.
    fn confidence(&self, context: &AutomationContext) -> f64 {
        let base = if self.strong_patterns.contains(&context.pattern_type) {
            0.9
        } else {
            0.4
        };

        let entities = context.entity_ids.len();
        if entities <= ENTITY_SOFT_LIMIT {
            base
        } else {
            #[allow(clippy::cast_precision_loss, reason = "entity counts are small")]
            let penalty = 0.05 * (entities - ENTITY_SOFT_LIMIT) as f64;
            (base - penalty).max(0.1)
        }
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn driver() -> LocalDriver {
        LocalDriver::new(&LocalProviderConfig {
            enabled: true,
            base_url: "http://127.0.0.1:11434".into(),
            model: "llama3.2:3b".into(),
            timeout_secs: 30,
        })
        .unwrap()
    }

    fn context(pattern: &str, entity_count: usize) -> AutomationContext {
        AutomationContext {
            user_id: "user-1".into(),
            pattern_type: pattern.into(),
            entity_ids: (0..entity_count).map(|i| format!("light.l{i}")).collect(),
            recent_events: vec![],
        }
    }

    #[test]
    fn test_strong_pattern_high_confidence() {
        let d = driver();
        assert!((d.confidence(&context("time_of_day", 3)) - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_pattern_low_confidence() {
        let d = driver();
        assert!((d.confidence(&context("seasonal_drift", 3)) - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_entity_count_penalty_with_floor() {
        let d = driver();
        let few = d.confidence(&context("time_of_day", 6));
        let many = d.confidence(&context("time_of_day", 10));
        assert!(many < few);
        assert!(d.confidence(&context("seasonal_drift", 40)) >= 0.1);
    }
}
