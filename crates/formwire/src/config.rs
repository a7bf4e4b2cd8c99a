#![forbid(unsafe_code)]

//! Engine configuration with environment overrides.
//!
//! Recognized variables:
//! - `FORMWIRE_MAX_DISPATCH_DEPTH` (usize, >= 1): nesting depth of change
//!   dispatch above which a warning is logged. Propagation is never cut off;
//!   mutually-updating fields remain the caller's responsibility.
//! - `FORMWIRE_CATCH_VALIDATOR_PANICS` (bool): contain panicking validators
//!   inside the pipeline and record them as failures. When off, the failure
//!   is still recorded on the field before the panic resumes.

use std::env;
use std::fmt;
use std::sync::OnceLock;

const ENV_MAX_DISPATCH_DEPTH: &str = "FORMWIRE_MAX_DISPATCH_DEPTH";
const ENV_CATCH_VALIDATOR_PANICS: &str = "FORMWIRE_CATCH_VALIDATOR_PANICS";

/// Tunables shared by fields and pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub max_dispatch_depth: usize,
    pub catch_validator_panics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_dispatch_depth: 32,
            catch_validator_panics: true,
        }
    }
}

/// Configuration parse diagnostics.
#[derive(Debug, Clone)]
pub struct EngineConfigParse {
    pub config: EngineConfig,
    pub errors: Vec<EngineConfigError>,
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl EngineConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={} ({})", self.field, self.value, self.message)
    }
}

impl std::error::Error for EngineConfigError {}

static GLOBAL: OnceLock<EngineConfig> = OnceLock::new();

impl EngineConfig {
    /// Parse config from environment variables.
    #[must_use]
    pub fn from_env() -> EngineConfig {
        Self::from_env_with_diagnostics().config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> EngineConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Process-wide config, read from the environment on first use.
    ///
    /// Invalid variables are reported once through `tracing` and fall back
    /// to their defaults.
    pub fn global() -> &'static EngineConfig {
        GLOBAL.get_or_init(|| {
            let parsed = Self::from_env_with_diagnostics();
            for error in &parsed.errors {
                tracing::warn!(
                    field = error.field,
                    value = %error.value,
                    reason = %error.message,
                    "ignoring invalid formwire config"
                );
            }
            parsed.config
        })
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<EngineConfigError>> {
        let mut errors = Vec::new();
        if self.max_dispatch_depth == 0 {
            errors.push(EngineConfigError::new(
                "max_dispatch_depth",
                "0",
                "must be >= 1",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    #[must_use]
    pub fn with_max_dispatch_depth(mut self, depth: usize) -> Self {
        self.max_dispatch_depth = depth;
        self
    }

    #[must_use]
    pub fn with_catch_validator_panics(mut self, catch: bool) -> Self {
        self.catch_validator_panics = catch;
        self
    }
}

fn from_env_with<F>(mut get: F) -> EngineConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = EngineConfig::default();
    let mut errors = Vec::new();

    if let Some(value) = get(ENV_MAX_DISPATCH_DEPTH) {
        match parse_usize(&value) {
            Some(parsed) if parsed > 0 => config.max_dispatch_depth = parsed,
            _ => errors.push(EngineConfigError::new(
                "max_dispatch_depth",
                value,
                "expected positive integer",
            )),
        }
    }

    if let Some(value) = get(ENV_CATCH_VALIDATOR_PANICS) {
        match parse_bool(&value) {
            Some(parsed) => config.catch_validator_panics = parsed,
            None => errors.push(EngineConfigError::new(
                "catch_validator_panics",
                value,
                "expected bool (1/0/true/false)",
            )),
        }
    }

    EngineConfigParse { config, errors }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[inline]
fn parse_usize(value: &str) -> Option<usize> {
    value.trim().parse::<usize>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.max_dispatch_depth, 32);
        assert!(config.catch_validator_panics);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn env_overrides_applied() {
        let mut env = HashMap::new();
        env.insert(ENV_MAX_DISPATCH_DEPTH, "8");
        env.insert(ENV_CATCH_VALIDATOR_PANICS, "off");

        let parsed = from_env_with(|key| env.get(key).map(|value| value.to_string()));
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.config.max_dispatch_depth, 8);
        assert!(!parsed.config.catch_validator_panics);
    }

    #[test]
    fn invalid_values_reported_and_defaulted() {
        let mut env = HashMap::new();
        env.insert(ENV_MAX_DISPATCH_DEPTH, "0");
        env.insert(ENV_CATCH_VALIDATOR_PANICS, "maybe");

        let parsed = from_env_with(|key| env.get(key).map(|value| value.to_string()));
        assert!(parsed.errors.iter().any(|e| e.field == "max_dispatch_depth"));
        assert!(parsed.errors.iter().any(|e| e.field == "catch_validator_panics"));
        assert_eq!(parsed.config, EngineConfig::default());
    }

    #[test]
    fn validate_rejects_zero_depth() {
        let config = EngineConfig::default().with_max_dispatch_depth(0);
        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].to_string(), "max_dispatch_depth=0 (must be >= 1)");
    }
}
