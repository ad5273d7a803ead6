// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the push gateway.
//!
//! Every value has a serde default so a partial config file or an empty
//! environment still yields a runnable service.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SurrealDB location: `memory` or a RocksDB directory (default: memory)
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Comma separated CORS origins, `*` for any (default: *)
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: String,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Fan-out configuration
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// FCM credentials; `None` selects the dry-run transport
    #[serde(default)]
    pub fcm: Option<FcmConfig>,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// A single fixed-window admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Requests admitted per window
    pub max_requests: u32,
    /// Window length in milliseconds
    pub window_ms: u64,
}

impl RatePolicy {
    pub fn new(max_requests: u32, window_ms: u64) -> Self {
        Self {
            max_requests,
            window_ms,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Policy for every endpoint except scan ingestion (default: 10 per 60s)
    #[serde(default = "default_policy")]
    pub default: RatePolicy,

    /// Policy for scan ingestion (default: 20 per 60s)
    #[serde(default = "scan_policy")]
    pub scan: RatePolicy,

    /// How often stale windows are swept, in seconds (default: 60)
    #[serde(default = "default_cleanup_secs")]
    pub cleanup_interval_secs: u64,
}

/// Notification fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Sends in flight during a broadcast; 1 keeps it sequential (default: 1)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Firebase service account credentials for FCM HTTP v1.
#[derive(Clone, Serialize, Deserialize)]
pub struct FcmConfig {
    pub project_id: String,
    pub client_email: String,
    pub private_key: String,

    /// OAuth2 token endpoint
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// Per-request timeout in seconds (default: 10)
    #[serde(default = "default_fcm_timeout")]
    pub timeout_secs: u64,
}

impl std::fmt::Debug for FcmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FcmConfig")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_database_path() -> String {
    "memory".to_string()
}

fn default_allowed_origins() -> String {
    "*".to_string()
}

fn default_policy() -> RatePolicy {
    RatePolicy::new(10, 60_000)
}

fn scan_policy() -> RatePolicy {
    RatePolicy::new(20, 60_000)
}

fn default_cleanup_secs() -> u64 {
    60
}

fn default_concurrency() -> usize {
    1
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_fcm_timeout() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: default_database_path(),
            allowed_origins: default_allowed_origins(),
            rate_limit: RateLimitConfig::default(),
            dispatch: DispatchConfig::default(),
            fcm: None,
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default: default_policy(),
            scan: scan_policy(),
            cleanup_interval_secs: default_cleanup_secs(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl RateLimitConfig {
    /// Get the sweep interval for stale windows
    /// Never zero; `tokio::time::interval` rejects a zero period.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }
}

impl FcmConfig {
    /// Per-request timeout for FCM and token endpoint calls
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable numeric variables fall back to their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        let parsed_max = |key: &str| parsed(key).and_then(|v| u32::try_from(v).ok());
        let defaults = Config::default();

        let rate_limit = RateLimitConfig {
            default: RatePolicy::new(
                parsed_max("RATE_LIMIT_DEFAULT_MAX").unwrap_or(defaults.rate_limit.default.max_requests),
                parsed("RATE_LIMIT_DEFAULT_WINDOW_MS")
                    .unwrap_or(defaults.rate_limit.default.window_ms),
            ),
            scan: RatePolicy::new(
                parsed_max("RATE_LIMIT_SCAN_MAX").unwrap_or(defaults.rate_limit.scan.max_requests),
                parsed("RATE_LIMIT_SCAN_WINDOW_MS").unwrap_or(defaults.rate_limit.scan.window_ms),
            ),
            cleanup_interval_secs: parsed("RATE_LIMIT_CLEANUP_SECS")
                .map(|v| v.max(1))
                .unwrap_or(defaults.rate_limit.cleanup_interval_secs),
        };

        let fcm = match (
            lookup("FIREBASE_PROJECT_ID"),
            lookup("FIREBASE_CLIENT_EMAIL"),
            lookup("FIREBASE_PRIVATE_KEY"),
        ) {
            (Some(project_id), Some(client_email), Some(private_key))
                if !project_id.is_empty() && !client_email.is_empty() && !private_key.is_empty() =>
            {
                Some(FcmConfig {
                    project_id,
                    client_email,
                    private_key: private_key.replace("\\n", "\n"),
                    token_uri: lookup("FIREBASE_TOKEN_URI").unwrap_or_else(default_token_uri),
                    timeout_secs: parsed("FCM_TIMEOUT_SECS").unwrap_or_else(default_fcm_timeout),
                })
            }
            _ => None,
        };

        Config {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_path: lookup("DATABASE_PATH").unwrap_or(defaults.database_path),
            allowed_origins: lookup("ALLOWED_ORIGINS").unwrap_or(defaults.allowed_origins),
            rate_limit,
            dispatch: DispatchConfig {
                concurrency: parsed("DISPATCH_CONCURRENCY")
                    .map(|v| v.max(1) as usize)
                    .unwrap_or(defaults.dispatch.concurrency),
            },
            fcm,
            metrics: MetricsConfig {
                enabled: lookup("METRICS_ENABLED")
                    .map(|v| !matches!(v.trim(), "0" | "false" | "off"))
                    .unwrap_or(defaults.metrics.enabled),
                ..defaults.metrics
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_observed_policy() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.rate_limit.default, RatePolicy::new(10, 60_000));
        assert_eq!(config.rate_limit.scan, RatePolicy::new(20, 60_000));
        assert_eq!(config.dispatch.concurrency, 1);
        assert!(config.fcm.is_none());
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_fcm_private_key_is_unescaped() {
        let config = Config::from_lookup(lookup_from(&[
            ("FIREBASE_PROJECT_ID", "demo"),
            ("FIREBASE_CLIENT_EMAIL", "svc@demo.iam.gserviceaccount.com"),
            ("FIREBASE_PRIVATE_KEY", "-----BEGIN-----\\nabc\\n-----END-----"),
        ]));
        let fcm = config.fcm.expect("credentials present");
        assert_eq!(fcm.private_key, "-----BEGIN-----\nabc\n-----END-----");
        assert!(!format!("{fcm:?}").contains("abc"));
    }

    #[test]
    fn test_bad_numbers_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("RATE_LIMIT_SCAN_MAX", "lots"),
            ("DISPATCH_CONCURRENCY", "0"),
            ("METRICS_ENABLED", "false"),
        ]));
        assert_eq!(config.rate_limit.scan.max_requests, 20);
        assert_eq!(config.dispatch.concurrency, 1);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn test_out_of_range_numbers_fall_back() {
        let config = Config::from_lookup(lookup_from(&[
            ("RATE_LIMIT_SCAN_MAX", "4294967296"),
            ("RATE_LIMIT_DEFAULT_MAX", "99999999999"),
            ("RATE_LIMIT_CLEANUP_SECS", "0"),
        ]));
        assert_eq!(config.rate_limit.scan.max_requests, 20);
        assert_eq!(config.rate_limit.default.max_requests, 10);
        assert_eq!(config.rate_limit.cleanup_interval(), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_zero_cleanup_interval_still_ticks() {
        let mut config = Config::default();
        config.rate_limit.cleanup_interval_secs = 0;
        let mut interval = tokio::time::interval(config.rate_limit.cleanup_interval());
        interval.tick().await;
    }
}
