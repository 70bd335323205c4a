//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request hardening (body size, CORS).
    pub security: SecurityConfig,

    /// Token signing, cookie and password hashing settings.
    pub auth: AuthConfig,

    /// Per-route admission policies.
    pub rate_limit: RateLimitConfig,

    /// Relational store used for sessions and credentials.
    pub database: DatabaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// Deadline for a single session/credential store call in seconds.
    pub store_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 30,
            store_secs: 5,
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum body size in bytes.
    pub max_body_size: usize,
    /// Origins allowed to send credentialed cross-site requests.
    pub allowed_origins: Vec<String>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
            ],
        }
    }
}

/// Authentication configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for access tokens. Overridden by `JWT_SECRET`.
    pub jwt_secret: String,

    /// `iss` claim stamped into and required from access tokens.
    pub issuer: String,

    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,

    /// Refresh secret lifetime in seconds.
    pub refresh_ttl_secs: u64,

    /// Clock skew tolerated when checking `exp`.
    pub leeway_secs: u64,

    /// Mark auth cookies `Secure`. Only disable for plain-HTTP local work.
    pub secure_cookies: bool,

    pub access_cookie: String,
    pub refresh_cookie: String,

    /// Argon2id cost parameters.
    pub password_hash: PasswordHashConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            issuer: "nl-backend".to_string(),
            access_ttl_secs: 15 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            leeway_secs: 30,
            secure_cookies: true,
            access_cookie: "nl_access".to_string(),
            refresh_cookie: "nl_refresh".to_string(),
            password_hash: PasswordHashConfig::default(),
        }
    }
}

/// Argon2id parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PasswordHashConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism.
    pub parallelism: u32,
}

impl Default for PasswordHashConfig {
    fn default() -> Self {
        // OWASP minimums for Argon2id.
        Self {
            memory_kib: 19_456,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// How the admission key is derived for a policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitStrategy {
    /// Authenticated user id, falling back to the network address.
    User,
    /// Forwarded / connection address only.
    Ip,
}

impl LimitStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitStrategy::User => "user",
            LimitStrategy::Ip => "ip",
        }
    }
}

/// A single route policy as written in the config file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoutePolicyConfig {
    /// HTTP method, e.g. "GET".
    pub method: String,

    /// Normalized route pattern, e.g. "/api/v1/meetings/{meetingID}".
    pub path: String,

    /// Requests allowed per window.
    pub limit: u32,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Bucket capacity. Defaults to `limit`.
    #[serde(default)]
    pub burst: Option<u32>,

    pub strategy: LimitStrategy,
}

impl RoutePolicyConfig {
    fn new(method: &str, path: &str, limit: u32, window_secs: u64, strategy: LimitStrategy) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            limit,
            window_secs,
            burst: None,
            strategy,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Interval between idle-entry sweeps in seconds.
    pub sweep_interval_secs: u64,

    /// Entries untouched for longer than this are evicted.
    pub idle_ttl_secs: u64,

    /// Collection segment -> placeholder used when folding concrete paths.
    pub collections: BTreeMap<String, String>,

    /// Route policies.
    pub policies: Vec<RoutePolicyConfig>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: 5 * 60,
            idle_ttl_secs: 60 * 60,
            collections: default_collections(),
            policies: default_policies(),
        }
    }
}

fn default_collections() -> BTreeMap<String, String> {
    [
        ("meetings", "{meetingID}"),
        ("history", "{transcriptID}"),
        ("presets", "{presetID}"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_policies() -> Vec<RoutePolicyConfig> {
    use LimitStrategy::{Ip, User};
    const MINUTE: u64 = 60;

    vec![
        // Auth endpoints: strict, per address
        RoutePolicyConfig::new("POST", "/api/v1/auth/register", 5, 60 * MINUTE, Ip),
        RoutePolicyConfig::new("POST", "/api/v1/auth/login", 10, 15 * MINUTE, Ip),
        RoutePolicyConfig::new("POST", "/api/v1/auth/refresh", 30, MINUTE, Ip),
        RoutePolicyConfig::new("POST", "/api/v1/auth/logout", 20, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/auth/session", 30, MINUTE, User),
        // Protected endpoints: per user
        RoutePolicyConfig::new("GET", "/api/v1/dashboard/overview", 60, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/meetings", 30, MINUTE, User),
        RoutePolicyConfig::new("POST", "/api/v1/meetings", 10, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/meetings/{meetingID}", 60, MINUTE, User),
        RoutePolicyConfig::new("PATCH", "/api/v1/meetings/{meetingID}", 20, MINUTE, User),
        RoutePolicyConfig::new("DELETE", "/api/v1/meetings/{meetingID}", 10, MINUTE, User),
        RoutePolicyConfig::new("POST", "/api/v1/meetings/{meetingID}/start", 5, MINUTE, User),
        RoutePolicyConfig::new("POST", "/api/v1/meetings/{meetingID}/join", 10, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/history", 30, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/history/{transcriptID}", 60, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/settings", 30, MINUTE, User),
        RoutePolicyConfig::new("PUT", "/api/v1/settings", 20, MINUTE, User),
        RoutePolicyConfig::new("GET", "/api/v1/settings/presets", 30, MINUTE, User),
        RoutePolicyConfig::new("POST", "/api/v1/settings/presets", 10, MINUTE, User),
        RoutePolicyConfig::new("PUT", "/api/v1/settings/presets/{presetID}", 20, MINUTE, User),
        RoutePolicyConfig::new("DELETE", "/api/v1/settings/presets/{presetID}", 10, MINUTE, User),
    ]
}

/// Relational store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres connection string. When unset, in-memory stores are used.
    pub url: Option<String>,

    /// Pool size.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [auth]
            jwt_secret = "0123456789abcdef0123"
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.access_ttl_secs, 900);
        assert_eq!(config.auth.refresh_ttl_secs, 604_800);
        assert_eq!(config.auth.leeway_secs, 30);
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
        assert_eq!(config.rate_limit.idle_ttl_secs, 3600);
        assert!(!config.rate_limit.policies.is_empty());
        assert_eq!(config.rate_limit.collections["meetings"], "{meetingID}");
    }

    #[test]
    fn test_policy_table_from_toml() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [rate_limit]
            sweep_interval_secs = 10

            [[rate_limit.policies]]
            method = "GET"
            path = "/api/v1/auth/session"
            limit = 10
            window_secs = 900
            strategy = "user"

            [[rate_limit.policies]]
            method = "POST"
            path = "/api/v1/auth/login"
            limit = 3
            window_secs = 60
            burst = 1
            strategy = "ip"
            "#,
        )
        .unwrap();

        let policies = &config.rate_limit.policies;
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].strategy, LimitStrategy::User);
        assert_eq!(policies[0].burst, None);
        assert_eq!(policies[1].burst, Some(1));
        assert_eq!(policies[1].strategy, LimitStrategy::Ip);
    }
}
