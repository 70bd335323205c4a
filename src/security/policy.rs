//! Route policies and path normalization.
//!
//! Policies are keyed by method and a route pattern in which resource ids
//! are replaced by placeholders, e.g. `/api/v1/meetings/{meetingID}/join`.
//! Concrete request paths are folded to the same shape before lookup.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use axum::http::Method;

use crate::config::{LimitStrategy, RateLimitConfig};
use crate::config::validation::ValidationError;

/// Policy identity: method plus normalized pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub method: Method,
    pub pattern: String,
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteLimitPolicy {
    pub limit: u32,
    pub window: Duration,
    pub burst: u32,
    pub strategy: LimitStrategy,
}

impl RouteLimitPolicy {
    pub fn capacity(&self) -> f64 {
        f64::from(self.burst)
    }

    pub fn refill_per_sec(&self) -> f64 {
        f64::from(self.limit) / self.window.as_secs_f64()
    }
}

/// Immutable lookup table built once at startup.
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<RouteKey, RouteLimitPolicy>,
    collections: BTreeMap<String, String>,
}

impl PolicyTable {
    pub fn from_config(config: &RateLimitConfig) -> Result<Self, ValidationError> {
        let mut policies = HashMap::with_capacity(config.policies.len());

        for (i, p) in config.policies.iter().enumerate() {
            let method = p.method.trim().to_ascii_uppercase().parse::<Method>().map_err(|_| {
                ValidationError::new(
                    format!("rate_limit.policies[{i}].method"),
                    format!("unknown HTTP method '{}'", p.method),
                )
            })?;
            let burst = p.burst.unwrap_or(p.limit);
            let zero = [
                ("limit", u64::from(p.limit)),
                ("window_secs", p.window_secs),
                ("burst", u64::from(burst)),
            ]
            .into_iter()
            .find(|(_, value)| *value == 0);
            if let Some((field, _)) = zero {
                return Err(ValidationError::new(
                    format!("rate_limit.policies[{i}].{field}"),
                    "must be greater than 0",
                ));
            }

            let key = RouteKey {
                method,
                pattern: p.path.clone(),
            };
            let policy = RouteLimitPolicy {
                limit: p.limit,
                window: Duration::from_secs(p.window_secs),
                burst,
                strategy: p.strategy,
            };
            policies.insert(key, policy);
        }

        Ok(Self {
            policies,
            collections: config.collections.clone(),
        })
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Fold ids under known collections into their placeholder.
    pub fn normalize(&self, path: &str) -> String {
        normalize_path(path, &self.collections)
    }

    /// Exact match of method and normalized path.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<(RouteKey, RouteLimitPolicy)> {
        let key = RouteKey {
            method: method.clone(),
            pattern: self.normalize(path),
        };
        let policy = *self.policies.get(&key)?;
        Some((key, policy))
    }
}

/// Replace the segment that follows a collection name with the collection's
/// placeholder. Sub-actions after the id (`/start`, `/join`) are kept.
pub fn normalize_path(path: &str, collections: &BTreeMap<String, String>) -> String {
    let trimmed = match path.strip_suffix('/') {
        Some(rest) if !rest.is_empty() => rest,
        _ => path,
    };

    let mut out: Vec<&str> = Vec::new();
    for segment in trimmed.split('/') {
        let placeholder = out
            .last()
            .filter(|_| !segment.is_empty())
            .and_then(|prev| collections.get(*prev));
        match placeholder {
            Some(p) => out.push(p.as_str()),
            None => out.push(segment),
        }
    }
    out.join("/")
}
