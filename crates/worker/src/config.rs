//! Worker configuration loaded from environment variables.

use std::time::Duration;

use syncbridge_core::naming::validate_identifier;

use crate::retry::RetryPolicy;
use crate::telemetry::LogFormat;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key}='{value}' is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    /// Base URL of the legacy row export API.
    pub legacy_api_url: String,
    pub legacy_api_token: Option<String>,
    pub legacy_request_timeout: Duration,
    /// Entity types synchronized on every pass.
    pub entity_types: Vec<String>,
    pub incremental: bool,
    /// Time between passes. `None` runs a single pass and exits.
    pub interval: Option<Duration>,
    pub retry: RetryPolicy,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                         | Default     |
    /// |---------------------------------|-------------|
    /// | `DATABASE_URL`                  | required    |
    /// | `DATABASE_MAX_CONNECTIONS`      | `20`        |
    /// | `LEGACY_API_URL`                | required    |
    /// | `LEGACY_API_TOKEN`              | unset       |
    /// | `LEGACY_REQUEST_TIMEOUT_SECS`   | `30`        |
    /// | `SYNC_ENTITY_TYPES`             | required    |
    /// | `SYNC_INCREMENTAL`              | `true`      |
    /// | `SYNC_INTERVAL_SECS`            | `0` (once)  |
    /// | `SYNC_MAX_ATTEMPTS`             | `3`         |
    /// | `SYNC_RETRY_INITIAL_DELAY_SECS` | `5`         |
    /// | `SYNC_RETRY_MAX_DELAY_SECS`     | `300`       |
    /// | `LOG_FORMAT`                    | `text`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let database_max_connections: u32 =
            parse_or(var("DATABASE_MAX_CONNECTIONS"), "DATABASE_MAX_CONNECTIONS", 20)?;
        if database_max_connections == 0 {
            return Err(invalid("DATABASE_MAX_CONNECTIONS", "0", "must be at least 1"));
        }

        let legacy_api_url = var("LEGACY_API_URL").ok_or(ConfigError::Missing("LEGACY_API_URL"))?;
        let legacy_api_token = var("LEGACY_API_TOKEN");
        let timeout_secs: u64 =
            parse_or(var("LEGACY_REQUEST_TIMEOUT_SECS"), "LEGACY_REQUEST_TIMEOUT_SECS", 30)?;

        let raw_entity_types =
            var("SYNC_ENTITY_TYPES").ok_or(ConfigError::Missing("SYNC_ENTITY_TYPES"))?;
        let entity_types = parse_entity_types(&raw_entity_types)?;

        let incremental = match var("SYNC_INCREMENTAL") {
            Some(v) => parse_bool("SYNC_INCREMENTAL", &v)?,
            None => true,
        };
        let interval_secs: u64 = parse_or(var("SYNC_INTERVAL_SECS"), "SYNC_INTERVAL_SECS", 0)?;

        let max_attempts: u32 = parse_or(var("SYNC_MAX_ATTEMPTS"), "SYNC_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            return Err(invalid("SYNC_MAX_ATTEMPTS", "0", "must be at least 1"));
        }
        let initial_delay_secs: u64 = parse_or(
            var("SYNC_RETRY_INITIAL_DELAY_SECS"),
            "SYNC_RETRY_INITIAL_DELAY_SECS",
            5,
        )?;
        let max_delay_secs: u64 =
            parse_or(var("SYNC_RETRY_MAX_DELAY_SECS"), "SYNC_RETRY_MAX_DELAY_SECS", 300)?;

        let log_format = match var("LOG_FORMAT").as_deref() {
            None | Some("text") => LogFormat::Text,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(invalid("LOG_FORMAT", other, "expected 'text' or 'json'")),
        };

        Ok(Self {
            database_url,
            database_max_connections,
            legacy_api_url,
            legacy_api_token,
            legacy_request_timeout: Duration::from_secs(timeout_secs),
            entity_types,
            incremental,
            interval: (interval_secs > 0).then(|| Duration::from_secs(interval_secs)),
            retry: RetryPolicy {
                max_attempts,
                initial_delay: Duration::from_secs(initial_delay_secs),
                max_delay: Duration::from_secs(max_delay_secs),
                ..RetryPolicy::default()
            },
            log_format,
        })
    }
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_or<T>(value: Option<String>, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|e: T::Err| invalid(key, &v, &e.to_string())),
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}

/// Comma-separated, de-duplicated, order-preserving list of entity types.
fn parse_entity_types(raw: &str) -> Result<Vec<String>, ConfigError> {
    let mut entity_types: Vec<String> = Vec::new();
    for entity_type in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        validate_identifier("entity type", entity_type)
            .map_err(|e| invalid("SYNC_ENTITY_TYPES", raw, &e.to_string()))?;
        if !entity_types.iter().any(|e| e == entity_type) {
            entity_types.push(entity_type.to_string());
        }
    }
    if entity_types.is_empty() {
        return Err(invalid("SYNC_ENTITY_TYPES", raw, "no entity types listed"));
    }
    Ok(entity_types)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<WorkerConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        WorkerConfig::from_lookup(|key| map.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("DATABASE_URL", "postgres://localhost/syncbridge"),
        ("LEGACY_API_URL", "http://legacy.local"),
        ("SYNC_ENTITY_TYPES", "customer, product"),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(&REQUIRED).unwrap();
        assert_eq!(config.database_max_connections, 20);
        assert_eq!(config.entity_types, vec!["customer", "product"]);
        assert!(config.incremental);
        assert!(config.interval.is_none());
        assert_eq!(config.legacy_request_timeout, Duration::from_secs(30));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_secs(5));
        assert_eq!(config.retry.max_delay, Duration::from_secs(300));
        assert_eq!(config.log_format, LogFormat::Text);
        assert!(config.legacy_api_token.is_none());
    }

    #[test]
    fn missing_database_url_fails() {
        assert_eq!(
            load(&REQUIRED[1..]).unwrap_err(),
            ConfigError::Missing("DATABASE_URL")
        );
    }

    #[test]
    fn blank_value_counts_as_missing() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LEGACY_API_URL", "  "));
        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::Missing("LEGACY_API_URL")
        );
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("SYNC_INCREMENTAL", "false"),
            ("SYNC_INTERVAL_SECS", "600"),
            ("SYNC_MAX_ATTEMPTS", "5"),
            ("LOG_FORMAT", "json"),
            ("LEGACY_API_TOKEN", "secret"),
        ]);
        let config = load(&vars).unwrap();
        assert!(!config.incremental);
        assert_eq!(config.interval, Some(Duration::from_secs(600)));
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.legacy_api_token.as_deref(), Some("secret"));
    }

    #[test]
    fn non_numeric_value_is_invalid() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DATABASE_MAX_CONNECTIONS", "many"));
        assert_matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: "DATABASE_MAX_CONNECTIONS", .. })
        );
    }

    #[test]
    fn zero_attempts_is_invalid() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SYNC_MAX_ATTEMPTS", "0"));
        assert_matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: "SYNC_MAX_ATTEMPTS", .. })
        );
    }

    #[test]
    fn invalid_entity_type_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("SYNC_ENTITY_TYPES", "customer,Variant Product"));
        assert_matches!(
            load(&vars),
            Err(ConfigError::Invalid { key: "SYNC_ENTITY_TYPES", .. })
        );
    }

    #[test]
    fn entity_types_are_deduplicated_in_order() {
        assert_eq!(
            parse_entity_types("product,customer,product,,").unwrap(),
            vec!["product", "customer"]
        );
    }

    #[test]
    fn unknown_log_format_is_invalid() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("LOG_FORMAT", "xml"));
        assert_matches!(load(&vars), Err(ConfigError::Invalid { key: "LOG_FORMAT", .. }));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("K", "YES").unwrap());
        assert!(!parse_bool("K", "off").unwrap());
        assert!(parse_bool("K", "maybe").is_err());
    }
}
