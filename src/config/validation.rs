//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits, windows and intervals > 0)
//! - Check the signing secret is present and long enough
//! - Detect duplicate route policies
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;

use axum::http::Method;

use crate::config::schema::GatewayConfig;

/// Minimum accepted length of the HMAC signing secret.
pub const MIN_SECRET_LEN: usize = 16;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub(crate) fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.auth.jwt_secret.is_empty() {
        errors.push(ValidationError::new("auth.jwt_secret", "must be provided"));
    } else if config.auth.jwt_secret.len() < MIN_SECRET_LEN {
        errors.push(ValidationError::new(
            "auth.jwt_secret",
            format!("must be at least {MIN_SECRET_LEN} characters long"),
        ));
    }

    if config.auth.access_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.access_ttl_secs", "must be > 0"));
    }
    if config.auth.refresh_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.refresh_ttl_secs", "must be > 0"));
    }
    if config.auth.access_cookie.is_empty() || config.auth.refresh_cookie.is_empty() {
        errors.push(ValidationError::new("auth", "cookie names must not be empty"));
    }
    if config.auth.access_cookie == config.auth.refresh_cookie {
        errors.push(ValidationError::new("auth", "access and refresh cookies must differ"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }
    if config.timeouts.store_secs == 0 {
        errors.push(ValidationError::new("timeouts.store_secs", "must be > 0"));
    }

    let rl = &config.rate_limit;
    if rl.sweep_interval_secs == 0 {
        errors.push(ValidationError::new("rate_limit.sweep_interval_secs", "must be > 0"));
    }
    if rl.idle_ttl_secs == 0 {
        errors.push(ValidationError::new("rate_limit.idle_ttl_secs", "must be > 0"));
    }

    let mut seen = HashSet::new();
    for (i, policy) in rl.policies.iter().enumerate() {
        let field = format!("rate_limit.policies[{i}]");

        match policy.method.trim().to_ascii_uppercase().parse::<Method>() {
            Ok(method) => {
                if !seen.insert((method, policy.path.clone())) {
                    errors.push(ValidationError::new(
                        &field,
                        format!("duplicate policy for {} {}", policy.method, policy.path),
                    ));
                }
            }
            Err(_) => errors.push(ValidationError::new(
                &field,
                format!("invalid method {:?}", policy.method),
            )),
        }
        if !policy.path.starts_with('/') {
            errors.push(ValidationError::new(&field, "path must start with '/'"));
        }
        if policy.limit == 0 {
            errors.push(ValidationError::new(&field, "limit must be > 0"));
        }
        if policy.window_secs == 0 {
            errors.push(ValidationError::new(&field, "window_secs must be > 0"));
        }
        if policy.burst == Some(0) {
            errors.push(ValidationError::new(&field, "burst must be > 0"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
