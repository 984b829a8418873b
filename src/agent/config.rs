// Agent configuration loading

use super::error::ConfigError;
use super::types::AgentConfig;
use std::path::Path;
use tracing::{info, warn};

/// Parse an environment variable, logging a warning if the value is present but invalid.
fn parse_env_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(v) => match v.parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(var = name, value = %v, "Invalid env var value, using default");
                default
            }
        },
        Err(_) => default,
    }
}

impl AgentConfig {
    /// Defaults overlaid with `CODELOOP_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::default().with_env_overrides()
    }

    /// Load from a TOML file, then apply environment overrides
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        info!(path = %path.display(), "loading agent config");
        dotenvy::dotenv().ok();
        Self::from_toml_str(&text)?.with_env_overrides()
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AgentConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.limits.timeout_seconds =
            parse_env_var("CODELOOP_TIMEOUT_SECS", self.limits.timeout_seconds);
        self.limits.max_output_bytes =
            parse_env_var("CODELOOP_MAX_OUTPUT_BYTES", self.limits.max_output_bytes);
        self.limits.max_steps = parse_env_var("CODELOOP_MAX_STEPS", self.limits.max_steps);
        self.executor.timeout_mode =
            parse_env_var("CODELOOP_TIMEOUT_MODE", self.executor.timeout_mode);
        self.step_limit = parse_env_var("CODELOOP_STEP_LIMIT", self.step_limit);
        self.count_extraction_failures = parse_env_var(
            "CODELOOP_COUNT_EXTRACTION_FAILURES",
            self.count_extraction_failures,
        );
        self.max_extraction_retries =
            parse_env_var("CODELOOP_MAX_EXTRACTION_RETRIES", self.max_extraction_retries);

        if let Ok(extra) = std::env::var("CODELOOP_EXTRA_IMPORTS") {
            for module in extra.split(',').map(str::trim).filter(|m| !m.is_empty()) {
                if !self.executor.extra_imports.iter().any(|m| m == module) {
                    self.executor.extra_imports.push(module.to_string());
                }
            }
        }

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.limits.validate()?;
        if self.max_extraction_retries == 0 {
            return Err(ConfigError::Invalid(
                "max_extraction_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::types::StepLimitPolicy;
    use crate::limits::TimeoutMode;

    #[test]
    fn test_toml_partial_overrides_defaults() {
        let config = AgentConfig::from_toml_str(
            r#"
            step_limit = "raise"
            count_extraction_failures = false

            [limits]
            max_steps = 5

            [executor]
            extra_imports = ["stats"]
            timeout_mode = "watchdog"
            "#,
        )
        .unwrap();

        assert_eq!(config.limits.max_steps, 5);
        assert_eq!(config.limits.timeout_seconds, 30.0);
        assert_eq!(config.step_limit, StepLimitPolicy::Raise);
        assert!(!config.count_extraction_failures);
        assert_eq!(config.max_extraction_retries, 3);
        assert_eq!(config.executor.extra_imports, vec!["stats".to_string()]);
        assert_eq!(config.executor.timeout_mode, TimeoutMode::Watchdog);
    }

    #[test]
    fn test_toml_rejects_invalid_limits() {
        let err = AgentConfig::from_toml_str("[limits]\ntimeout_seconds = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Limits(_)));

        let err = AgentConfig::from_toml_str("[limits]\ntimeout_seconds = 1e30\n").unwrap_err();
        assert!(matches!(err, ConfigError::Limits(_)));

        let err = AgentConfig::from_toml_str("max_extraction_retries = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_toml_syntax_error() {
        let err = AgentConfig::from_toml_str("limits = [").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_parse_env_var_falls_back() {
        assert_eq!(parse_env_var("CODELOOP_TEST_UNSET_VAR", 7_u32), 7);
    }
}
