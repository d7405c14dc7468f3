//! Configuration management.
//!
//! Loads configuration from defaults, an optional config file, and
//! environment variables, then validates the combination before startup:
//!
//! ```rust,ignore
//! use hearth_core::config::{AppConfig, ConfigValidator};
//!
//! let config = AppConfig::load()?;
//! ```

pub mod error;
pub mod validator;

pub use error::{ConfigResult, ConfigurationError};
pub use validator::ConfigValidator;

use serde::{Deserialize, Serialize};

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Event ingestion configuration.
    #[serde(default)]
    pub ingestion: IngestionConfig,
    /// Sampling and importance policy.
    #[serde(default)]
    pub sampling: SamplingConfig,
    /// Cloud inference provider.
    #[serde(default)]
    pub cloud: CloudProviderConfig,
    /// Local inference provider.
    #[serde(default)]
    pub local: LocalProviderConfig,
    /// Hybrid routing behavior.
    #[serde(default)]
    pub routing: RoutingConfig,
    /// Provider rate limiting.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Cloud provider circuit breaker.
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    /// Automation lifecycle policy.
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Redis configuration.
    #[serde(default)]
    pub redis: RedisConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment and config files.
    ///
    /// Sources, in order: defaults, `config/hearth.{yaml,toml}` when
    /// present, then `HEARTH__*` environment variables. The result is
    /// validated; use [`Self::load_unchecked`] to skip validation.
    pub fn load() -> anyhow::Result<Self> {
        let config = Self::load_unchecked()?;

        ConfigValidator::validate(&config)
            .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{}", e))?;

        Ok(config)
    }

    /// Load configuration without validation.
    pub fn load_unchecked() -> anyhow::Result<Self> {
        // Load .env file if present
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8090)?
            .set_default("cloud.model", "gpt-4o-mini")?
            .set_default("local.model", "llama3.2:3b")?
            .add_source(config::File::with_name("config/hearth").required(false))
            .add_source(
                config::Environment::with_prefix("HEARTH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut app_config: AppConfig = config.try_deserialize().unwrap_or_default();

        // Secrets and connection strings come from plain environment
        // variables, matching how deployments already set them.
        if let Ok(key) = std::env::var("HEARTH_CLOUD_API_KEY") {
            app_config.cloud.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("REDIS_URL") {
            app_config.redis.url = Some(url);
        }

        Ok(app_config)
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// API port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Event ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Broker publish timeout in milliseconds.
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    /// Direct-storage fallback timeout in milliseconds.
    #[serde(default = "default_fallback_timeout_ms")]
    pub fallback_timeout_ms: u64,
}

fn default_publish_timeout_ms() -> u64 {
    2000
}

fn default_fallback_timeout_ms() -> u64 {
    2000
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            publish_timeout_ms: default_publish_timeout_ms(),
            fallback_timeout_ms: default_fallback_timeout_ms(),
        }
    }
}

/// Sampling and importance policy for the event classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Frequency counting window in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Events per window above which an (entity, type) pair is sampled.
    #[serde(default = "default_frequency_threshold")]
    pub high_frequency_threshold: u32,
    /// Fraction of high-frequency events retained, in `(0, 1]`.
    #[serde(default = "default_sample_fraction")]
    pub sample_fraction: f64,
    /// Event types always stored regardless of frequency.
    #[serde(default = "default_important_event_types")]
    pub important_event_types: Vec<String>,
    /// Entity ids always stored regardless of frequency.
    #[serde(default)]
    pub important_entities: Vec<String>,
    /// Entity domains always stored regardless of frequency.
    #[serde(default = "default_important_domains")]
    pub important_domains: Vec<String>,
}

fn default_window_secs() -> u64 {
    60
}

fn default_frequency_threshold() -> u32 {
    30
}

fn default_sample_fraction() -> f64 {
    0.1
}

fn default_important_event_types() -> Vec<String> {
    vec![
        "automation_triggered".to_string(),
        "device_registered".to_string(),
        "scene_activated".to_string(),
    ]
}

fn default_important_domains() -> Vec<String> {
    vec![
        "alarm_control_panel".to_string(),
        "lock".to_string(),
        "binary_sensor".to_string(),
    ]
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            high_frequency_threshold: default_frequency_threshold(),
            sample_fraction: default_sample_fraction(),
            important_event_types: default_important_event_types(),
            important_entities: Vec::new(),
            important_domains: default_important_domains(),
        }
    }
}

/// Cloud inference provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudProviderConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_cloud_base_url")]
    pub base_url: String,
    /// API key, if the provider requires one.
    pub api_key: Option<String>,
    /// Model identifier.
    #[serde(default = "default_cloud_model")]
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_cloud_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_cloud_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_provider_timeout() -> u64 {
    60
}

impl Default for CloudProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_cloud_base_url(),
            api_key: None,
            model: default_cloud_model(),
            timeout_secs: default_provider_timeout(),
        }
    }
}

/// Local inference provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalProviderConfig {
    /// Whether local inference is available at all.
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of an Ollama-style server.
    #[serde(default = "default_local_base_url")]
    pub base_url: String,
    /// Model identifier.
    #[serde(default = "default_local_model")]
    pub model: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_local_timeout")]
    pub timeout_secs: u64,
}

fn default_local_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_local_model() -> String {
    "llama3.2:3b".to_string()
}

fn default_local_timeout() -> u64 {
    30
}

impl Default for LocalProviderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_local_base_url(),
            model: default_local_model(),
            timeout_secs: default_local_timeout(),
        }
    }
}

/// Hybrid routing behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Prefer local inference even when user preferences do not ask for it.
    #[serde(default)]
    pub local_first: bool,
    /// Suggestion cache TTL in seconds.
    #[serde(default = "default_cache_ttl")]
    pub cache_ttl_secs: u64,
    /// Hard timeout on each provider attempt in seconds.
    #[serde(default = "default_provider_timeout")]
    pub provider_timeout_secs: u64,
    /// Generation size bound passed to providers.
    #[serde(default = "default_routing_max_tokens")]
    pub max_tokens: u32,
    /// Temperature passed to providers.
    #[serde(default = "default_routing_temperature")]
    pub temperature: f32,
}

fn default_cache_ttl() -> u64 {
    1800
}

fn default_routing_max_tokens() -> u32 {
    1024
}

fn default_routing_temperature() -> f32 {
    0.2
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            local_first: false,
            cache_ttl_secs: default_cache_ttl(),
            provider_timeout_secs: default_provider_timeout(),
            max_tokens: default_routing_max_tokens(),
            temperature: default_routing_temperature(),
        }
    }
}

/// Provider rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained requests per minute toward the cloud provider.
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    /// Burst size above the sustained rate.
    #[serde(default = "default_burst")]
    pub burst: u32,
    /// Maximum in-flight cloud requests.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn default_requests_per_minute() -> u32 {
    60
}

fn default_burst() -> u32 {
    10
}

fn default_max_concurrent() -> usize {
    4
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            burst: default_burst(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Cloud provider circuit breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the circuit closes.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
    /// Open-state cooldown before probing, in seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    10
}

fn default_success_threshold() -> u32 {
    3
}

fn default_cooldown() -> u64 {
    60
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            cooldown_secs: default_cooldown(),
        }
    }
}

/// Automation lifecycle policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleConfig {
    /// Whether newly registered automations await approval.
    #[serde(default = "default_true")]
    pub require_approval: bool,
    /// Days of inactivity before an active automation is marked inactive.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_window_days: i64,
    /// Interval between inactivity sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_inactivity_days() -> i64 {
    30
}

fn default_sweep_interval() -> u64 {
    3600
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            require_approval: true,
            inactivity_window_days: default_inactivity_days(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Redis configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis connection URL. When unset, everything runs in memory.
    pub url: Option<String>,
    /// Prefix for event stream keys.
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,
    /// Prefix for suggestion cache keys.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: String,
}

fn default_stream_prefix() -> String {
    "hearth:events".to_string()
}

fn default_cache_prefix() -> String {
    "hearth:suggestions".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            stream_prefix: default_stream_prefix(),
            cache_prefix: default_cache_prefix(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to use JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_default_breaker_thresholds() {
        let breaker = CircuitBreakerConfig::default();
        assert_eq!(breaker.failure_threshold, 10);
        assert_eq!(breaker.success_threshold, 3);
    }

    #[test]
    fn test_default_sampling_policy() {
        let sampling = SamplingConfig::default();
        assert!(sampling.sample_fraction > 0.0 && sampling.sample_fraction <= 1.0);
        assert!(sampling
            .important_event_types
            .contains(&"automation_triggered".to_string()));
        assert!(sampling.important_domains.contains(&"lock".to_string()));
    }
}
