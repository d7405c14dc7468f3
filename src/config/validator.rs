//! Configuration validation.
//!
//! Checks configuration combinations at startup so bad values fail fast
//! with an actionable message instead of surfacing as odd runtime behavior.

use super::AppConfig;
use super::error::{ConfigResult, ConfigurationError};

/// Validates configuration combinations before startup.
#[derive(Debug)]
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the entire application configuration.
    ///
    /// Returns `Ok(())` if valid, or a `ConfigurationError` with all issues.
    pub fn validate(config: &AppConfig) -> ConfigResult<()> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_sampling(config) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_rate_limit(config) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_circuit_breaker(config) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_providers(config) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_routing(config) {
            errors.push(e);
        }
        if let Err(e) = Self::validate_lifecycle(config) {
            errors.push(e);
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ConfigurationError::multiple(errors))
        }
    }

    fn validate_sampling(config: &AppConfig) -> ConfigResult<()> {
        let sampling = &config.sampling;

        if sampling.sample_fraction <= 0.0 || sampling.sample_fraction > 1.0 {
            return Err(ConfigurationError::invalid(
                format!(
                    "sampling.sample_fraction is {} but must be in (0, 1]",
                    sampling.sample_fraction
                ),
                "Set HEARTH__SAMPLING__SAMPLE_FRACTION to a fraction like 0.1",
            ));
        }
        if sampling.high_frequency_threshold == 0 {
            return Err(ConfigurationError::invalid(
                "sampling.high_frequency_threshold is 0, which would sample every event",
                "Set HEARTH__SAMPLING__HIGH_FREQUENCY_THRESHOLD to a positive count",
            ));
        }
        if sampling.window_secs == 0 {
            return Err(ConfigurationError::invalid(
                "sampling.window_secs is 0",
                "Set HEARTH__SAMPLING__WINDOW_SECS to a positive number of seconds",
            ));
        }
        Ok(())
    }

    fn validate_rate_limit(config: &AppConfig) -> ConfigResult<()> {
        let limits = &config.rate_limit;

        if limits.requests_per_minute == 0 {
            return Err(ConfigurationError::invalid(
                "rate_limit.requests_per_minute is 0, which blocks all cloud requests",
                "Set HEARTH__RATE_LIMIT__REQUESTS_PER_MINUTE to a positive rate",
            ));
        }
        if limits.burst == 0 {
            return Err(ConfigurationError::invalid(
                "rate_limit.burst is 0",
                "Set HEARTH__RATE_LIMIT__BURST to at least 1",
            ));
        }
        if limits.max_concurrent == 0 {
            return Err(ConfigurationError::invalid(
                "rate_limit.max_concurrent is 0, which blocks all cloud requests",
                "Set HEARTH__RATE_LIMIT__MAX_CONCURRENT to at least 1",
            ));
        }
        Ok(())
    }

    fn validate_circuit_breaker(config: &AppConfig) -> ConfigResult<()> {
        let breaker = &config.circuit_breaker;

        if breaker.failure_threshold == 0 {
            return Err(ConfigurationError::invalid(
                "circuit_breaker.failure_threshold is 0, which opens the circuit immediately",
                "Set HEARTH__CIRCUIT_BREAKER__FAILURE_THRESHOLD to at least 1",
            ));
        }
        if breaker.success_threshold == 0 {
            return Err(ConfigurationError::invalid(
                "circuit_breaker.success_threshold is 0, which would close the circuit \
                without any successful probe",
                "Set HEARTH__CIRCUIT_BREAKER__SUCCESS_THRESHOLD to at least 1",
            ));
        }
        Ok(())
    }

    fn validate_providers(config: &AppConfig) -> ConfigResult<()> {
        if config.cloud.base_url.is_empty() {
            return Err(ConfigurationError::missing_required(
                "cloud.base_url",
                "Cloud inference requests",
                "HEARTH__CLOUD__BASE_URL",
            ));
        }
        if config.local.enabled && config.local.base_url.is_empty() {
            return Err(ConfigurationError::missing_required(
                "local.base_url",
                "Local inference (local.enabled is true)",
                "HEARTH__LOCAL__BASE_URL",
            ));
        }
        Ok(())
    }

    fn validate_routing(config: &AppConfig) -> ConfigResult<()> {
        if config.routing.local_first && !config.local.enabled {
            return Err(ConfigurationError::incompatible(
                "routing.local_first",
                "local.enabled = false",
                "local-first routing needs a local provider; enable local \
                inference or unset routing.local_first",
            ));
        }
        Ok(())
    }

    fn validate_lifecycle(config: &AppConfig) -> ConfigResult<()> {
        if config.lifecycle.inactivity_window_days <= 0 {
            return Err(ConfigurationError::invalid(
                format!(
                    "lifecycle.inactivity_window_days is {}",
                    config.lifecycle.inactivity_window_days
                ),
                "Set HEARTH__LIFECYCLE__INACTIVITY_WINDOW_DAYS to a positive number of days",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_sample_fraction_out_of_range_rejected() {
        let mut config = AppConfig::default();
        config.sampling.sample_fraction = 0.0;
        assert!(ConfigValidator::validate(&config).is_err());

        config.sampling.sample_fraction = 1.5;
        assert!(ConfigValidator::validate(&config).is_err());

        config.sampling.sample_fraction = 1.0;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_rate_limit_rejected() {
        let mut config = AppConfig::default();
        config.rate_limit.requests_per_minute = 0;
        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("requests_per_minute"));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = AppConfig::default();
        config.sampling.sample_fraction = 0.0;
        config.rate_limit.max_concurrent = 0;
        config.circuit_breaker.failure_threshold = 0;

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(err.count(), 3);
    }

    #[test]
    fn test_local_first_without_local_provider_rejected() {
        let mut config = AppConfig::default();
        config.routing.local_first = true;

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Incompatible settings"));
        assert!(err.to_string().contains("routing.local_first"));

        config.local.enabled = true;
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_enabled_local_provider_requires_base_url() {
        let mut config = AppConfig::default();
        config.local.enabled = true;
        config.local.base_url = String::new();

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("Missing required"));
        assert!(err.to_string().contains("HEARTH__LOCAL__BASE_URL"));
    }

    #[test]
    fn test_negative_inactivity_window_rejected() {
        let mut config = AppConfig::default();
        config.lifecycle.inactivity_window_days = -1;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
