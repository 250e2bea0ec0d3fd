//! Provider configuration.
//!
//! The host passes the provider block as JSON. Unset values fall back to
//! environment variables and then to defaults:
//!
//! | Attribute | Environment | Default |
//! | --- | --- | --- |
//! | `token` | `GITLAB_TOKEN` | (required) |
//! | `base_url` | `GITLAB_BASE_URL` | `https://gitlab.com/api/v4/` |
//! | `insecure` | | `false` |
//! | `early_auth_check` | | `true` |
//! | `client_timeout_seconds` | | `30` |
//! | `operation_timeout_seconds` | | `1200` |
//! | `deletion_timeout_seconds` | | `300` |
//! | `deletion_poll_interval_milliseconds` | | `2000` |
//! | `per_page` | | `100` |

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, Result};
use crate::schema::{Attribute, Schema};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://gitlab.com/api/v4/";

/// Environment variable holding the API token.
pub const TOKEN_ENV: &str = "GITLAB_TOKEN";

/// Environment variable holding the API root.
pub const BASE_URL_ENV: &str = "GITLAB_BASE_URL";

/// Largest page size GitLab accepts.
pub const MAX_PER_PAGE: u32 = 100;

/// Resolved provider configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderConfig {
    /// Personal, project or group access token.
    pub token: String,
    /// API root, always ending in `/`.
    pub base_url: String,
    /// Skip TLS certificate verification.
    pub insecure: bool,
    /// Verify the token with `GET /user` while configuring.
    pub early_auth_check: bool,
    /// Timeout of a single HTTP call.
    pub client_timeout_seconds: u64,
    /// Deadline of one provider operation, retries and deletion waits included.
    pub operation_timeout_seconds: u64,
    /// How long a delete may wait for GitLab to finish tearing down.
    pub deletion_timeout_seconds: u64,
    /// Interval between probes while waiting for a delete.
    pub deletion_poll_interval_milliseconds: u64,
    /// Page size for list endpoints.
    pub per_page: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            insecure: false,
            early_auth_check: true,
            client_timeout_seconds: 30,
            operation_timeout_seconds: 1200,
            deletion_timeout_seconds: 300,
            deletion_poll_interval_milliseconds: 2000,
            per_page: MAX_PER_PAGE,
        }
    }
}

// Manual impl keeps the token out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("insecure", &self.insecure)
            .field("early_auth_check", &self.early_auth_check)
            .field("client_timeout_seconds", &self.client_timeout_seconds)
            .field("operation_timeout_seconds", &self.operation_timeout_seconds)
            .field("deletion_timeout_seconds", &self.deletion_timeout_seconds)
            .field(
                "deletion_poll_interval_milliseconds",
                &self.deletion_poll_interval_milliseconds,
            )
            .field("per_page", &self.per_page)
            .finish()
    }
}

impl ProviderConfig {
    /// Resolve configuration from the provider block and the process
    /// environment.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Self::resolve(value, |name| std::env::var(name).ok())
    }

    /// Resolve configuration with an explicit environment lookup.
    pub fn resolve<F>(value: serde_json::Value, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = match value {
            serde_json::Value::Null => serde_json::Value::Object(Default::default()),
            // Explicit nulls mean "unset" in provider blocks.
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.into_iter().filter(|(_, v)| !v.is_null()).collect(),
            ),
            other => other,
        };
        let base_url_set = value.get("base_url").is_some();
        let mut config: ProviderConfig = serde_json::from_value(value).map_err(|e| {
            ProviderError::Configuration(format!("invalid provider configuration: {}", e))
        })?;

        if config.token.is_empty() {
            config.token = env(TOKEN_ENV).unwrap_or_default();
        }
        if !base_url_set {
            if let Some(url) = env(BASE_URL_ENV).filter(|u| !u.is_empty()) {
                config.base_url = url;
            }
        }
        if !config.base_url.ends_with('/') {
            config.base_url.push('/');
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(ProviderError::Configuration(format!(
                "a GitLab token is required: set 'token' or {}",
                TOKEN_ENV
            )));
        }
        if self.per_page == 0 || self.per_page > MAX_PER_PAGE {
            return Err(ProviderError::Configuration(format!(
                "per_page must be between 1 and {}, got {}",
                MAX_PER_PAGE, self.per_page
            )));
        }
        if self.client_timeout_seconds == 0 {
            return Err(ProviderError::Configuration(
                "client_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.operation_timeout_seconds == 0 {
            return Err(ProviderError::Configuration(
                "operation_timeout_seconds must be positive".to_string(),
            ));
        }
        if self.deletion_poll_interval_milliseconds == 0 {
            return Err(ProviderError::Configuration(
                "deletion_poll_interval_milliseconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings handed to every resource operation.
    pub fn operation_settings(&self) -> OperationSettings {
        OperationSettings {
            per_page: self.per_page,
            operation_timeout: Duration::from_secs(self.operation_timeout_seconds),
            deletion_timeout: Duration::from_secs(self.deletion_timeout_seconds),
            deletion_poll_interval: Duration::from_millis(
                self.deletion_poll_interval_milliseconds,
            ),
        }
    }

    /// Schema of the provider block.
    pub fn schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "token",
                Attribute::optional_string()
                    .sensitive()
                    .with_description("GitLab token. Falls back to GITLAB_TOKEN."),
            )
            .with_attribute(
                "base_url",
                Attribute::optional_string().with_description(
                    "API root, e.g. https://gitlab.example.com/api/v4/. Falls back to GITLAB_BASE_URL.",
                ),
            )
            .with_attribute("insecure", Attribute::optional_bool())
            .with_attribute("early_auth_check", Attribute::optional_bool())
            .with_attribute("client_timeout_seconds", Attribute::optional_int64())
            .with_attribute("operation_timeout_seconds", Attribute::optional_int64())
            .with_attribute("deletion_timeout_seconds", Attribute::optional_int64())
            .with_attribute(
                "deletion_poll_interval_milliseconds",
                Attribute::optional_int64(),
            )
            .with_attribute("per_page", Attribute::optional_int64())
    }
}

/// Per-operation tunables derived from [`ProviderConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationSettings {
    /// Page size for list endpoints.
    pub per_page: u32,
    /// Deadline applied to each operation's context.
    pub operation_timeout: Duration,
    /// How long deletes poll for completion.
    pub deletion_timeout: Duration,
    /// Interval between deletion probes.
    pub deletion_poll_interval: Duration,
}

impl Default for OperationSettings {
    fn default() -> Self {
        ProviderConfig::default().operation_settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_with_explicit_token() {
        let config = ProviderConfig::resolve(json!({"token": "glpat-x"}), no_env).unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.early_auth_check);
        assert_eq!(config.per_page, 100);
    }

    #[test]
    fn test_env_fallbacks() {
        let env = |name: &str| match name {
            TOKEN_ENV => Some("from-env".to_string()),
            BASE_URL_ENV => Some("https://gitlab.example.com/api/v4".to_string()),
            _ => None,
        };
        let config = ProviderConfig::resolve(json!({"token": null}), env).unwrap();
        assert_eq!(config.token, "from-env");
        assert_eq!(config.base_url, "https://gitlab.example.com/api/v4/");

        // Explicit values win over the environment.
        let config = ProviderConfig::resolve(
            json!({"token": "explicit", "base_url": "https://self.hosted/api/v4/"}),
            env,
        )
        .unwrap();
        assert_eq!(config.token, "explicit");
        assert_eq!(config.base_url, "https://self.hosted/api/v4/");
    }

    #[test]
    fn test_explicit_default_base_url_beats_env() {
        let env = |name: &str| match name {
            BASE_URL_ENV => Some("https://gitlab.example.com/api/v4/".to_string()),
            _ => None,
        };
        let config =
            ProviderConfig::resolve(json!({"token": "t", "base_url": DEFAULT_BASE_URL}), env)
                .unwrap();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);

        let config =
            ProviderConfig::resolve(json!({"token": "t", "base_url": null}), env).unwrap();
        assert_eq!(config.base_url, "https://gitlab.example.com/api/v4/");
    }

    #[test]
    fn test_missing_token_is_rejected() {
        let err = ProviderConfig::resolve(json!({}), no_env).unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.to_string().contains(TOKEN_ENV));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(ProviderConfig::resolve(json!({"token": "t", "per_page": 0}), no_env).is_err());
        assert!(ProviderConfig::resolve(json!({"token": "t", "per_page": 500}), no_env).is_err());
        assert!(
            ProviderConfig::resolve(json!({"token": "t", "operation_timeout_seconds": 0}), no_env)
                .is_err()
        );
        assert!(ProviderConfig::resolve(json!({"token": "t", "unknown": 1}), no_env).is_err());
        assert!(ProviderConfig::resolve(json!({"token": 5}), no_env).is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = ProviderConfig::resolve(json!({"token": "glpat-secret"}), no_env).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("glpat-secret"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_operation_settings() {
        let config = ProviderConfig::resolve(
            json!({"token": "t", "deletion_timeout_seconds": 10, "deletion_poll_interval_milliseconds": 50}),
            no_env,
        )
        .unwrap();
        let settings = config.operation_settings();
        assert_eq!(settings.operation_timeout, Duration::from_secs(1200));
        assert_eq!(settings.deletion_timeout, Duration::from_secs(10));
        assert_eq!(settings.deletion_poll_interval, Duration::from_millis(50));
    }
}
