//! Per-route, per-identity admission control.
//!
//! # Responsibilities
//! - Map a request to its route policy and limiter key
//! - Consume one token from the key's bucket, creating it on first use
//! - Evict limiters that have been idle longer than the retention period
//! - Set `X-RateLimit-*` headers and answer 429 on denial
//!
//! # Design Decisions
//! - Registry is a sharded `DashMap`; consumption happens under the shard
//!   write guard, so two requests racing for the last token cannot both win
//!   and the sweep never removes an entry mid-consumption
//! - Limiter state is per process; replicas do not share budgets
//! - Unmatched routes are not tracked and get no headers

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::validation::ValidationError;
use crate::config::{LimitStrategy, RateLimitConfig};
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;
use crate::security::bucket::TokenBucket;
use crate::security::client_ip::client_address;
use crate::security::policy::{PolicyTable, RouteKey, RouteLimitPolicy};
use crate::session::AuthContext;

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// A request matched to a configured policy.
#[derive(Debug, Clone)]
pub struct MatchedRoute {
    pub key: RouteKey,
    pub policy: RouteLimitPolicy,
}

/// Quota details reported to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    /// Time from now until the reset hint.
    pub reset_after: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// No policy for this route.
    Untracked,
    Allowed(RateLimitStatus),
    Denied {
        status: RateLimitStatus,
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Denied { .. })
    }
}

struct LimiterEntry {
    bucket: TokenBucket,
    last_seen: Instant,
}

type LimiterKey = (RouteKey, String);

/// Owns the limiter registry and its sweep task.
pub struct AdmissionController {
    enabled: bool,
    table: PolicyTable,
    entries: DashMap<LimiterKey, LimiterEntry>,
    idle_ttl: Duration,
    sweep_interval: Duration,
    shutdown: Shutdown,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl AdmissionController {
    pub fn new(config: &RateLimitConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            enabled: config.enabled,
            table: PolicyTable::from_config(config)?,
            entries: DashMap::new(),
            idle_ttl: Duration::from_secs(config.idle_ttl_secs),
            sweep_interval: Duration::from_secs(config.sweep_interval_secs),
            shutdown: Shutdown::new(),
            sweeper: Mutex::new(None),
        })
    }

    /// Spawn the background sweep. Calling it again is a no-op.
    pub fn start(self: &Arc<Self>) {
        let mut slot = self.sweeper.lock();
        if slot.is_some() || !self.enabled {
            return;
        }

        let weak = Arc::downgrade(self);
        let period = self.sweep_interval;
        let shutdown = self.shutdown.subscribe();
        *slot = Some(tokio::spawn(run_sweeper(weak, period, shutdown)));
    }

    /// Policy for a request, if any.
    pub fn resolve(&self, method: &Method, path: &str) -> Option<MatchedRoute> {
        if !self.enabled {
            return None;
        }
        self.table
            .lookup(method, path)
            .map(|(key, policy)| MatchedRoute { key, policy })
    }

    pub fn admit(&self, method: &Method, path: &str, identity: &str) -> Admission {
        match self.resolve(method, path) {
            Some(route) => self.admit_route(&route, identity),
            None => Admission::Untracked,
        }
    }

    pub fn admit_route(&self, route: &MatchedRoute, identity: &str) -> Admission {
        self.admit_at(route, identity, Instant::now())
    }

    fn admit_at(&self, route: &MatchedRoute, identity: &str, now: Instant) -> Admission {
        let policy = route.policy;
        let key = (route.key.clone(), identity.to_string());

        // The shard stays write-locked until `entry` is dropped.
        let mut entry = match self.entries.entry(key) {
            Entry::Occupied(occupied) => occupied.into_ref(),
            Entry::Vacant(vacant) => {
                metrics::record_limiter_created();
                vacant.insert(LimiterEntry {
                    bucket: TokenBucket::new(policy.capacity(), policy.refill_per_sec(), now),
                    last_seen: now,
                })
            }
        };
        entry.last_seen = now;
        let allowed = entry.bucket.try_acquire(now);
        let probe = entry.bucket.peek(now);
        drop(entry);

        let route_label = route.key.to_string();
        if allowed {
            metrics::record_admission(&route_label, "allowed");
            Admission::Allowed(RateLimitStatus {
                limit: policy.limit,
                remaining: probe.available.floor() as u32,
                reset_after: probe.full_in,
            })
        } else {
            metrics::record_admission(&route_label, "denied");
            metrics::record_rate_limited(&route_label);
            Admission::Denied {
                status: RateLimitStatus {
                    limit: policy.limit,
                    remaining: 0,
                    reset_after: policy.window,
                },
                retry_after: policy.window,
            }
        }
    }

    /// Remove limiters idle for longer than the retention period.
    pub fn sweep(&self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&self, now: Instant) -> usize {
        let idle_ttl = self.idle_ttl;
        let mut evicted = 0;
        self.entries.retain(|_, entry| {
            let keep = now.saturating_duration_since(entry.last_seen) <= idle_ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });

        metrics::record_limiter_evictions(evicted as u64, self.entries.len());
        evicted
    }

    /// Live limiter count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(&self) {
        self.shutdown.trigger();
        let handle = self.sweeper.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Limiter sweep task failed");
            }
        }
    }
}

async fn run_sweeper(
    controller: Weak<AdmissionController>,
    period: Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    tracing::info!(interval = ?period, "Limiter sweep starting");

    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(controller) = controller.upgrade() else {
                    break;
                };
                let evicted = controller.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = controller.len(), "Evicted idle limiters");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Limiter sweep received shutdown signal, exiting loop");
                break;
            }
        }
    }
}

/// Middleware enforcing route policies.
///
/// Must run inside the authentication middleware on protected routes so
/// that user-keyed policies see the [`AuthContext`].
pub async fn rate_limit_middleware(
    State(controller): State<Arc<AdmissionController>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(route) = controller.resolve(request.method(), request.uri().path()) else {
        return next.run(request).await;
    };

    let identity = limiter_identity(&route, &request);

    match controller.admit_route(&route, &identity) {
        Admission::Untracked => next.run(request).await,
        Admission::Allowed(status) => {
            let mut response = next.run(request).await;
            apply_headers(response.headers_mut(), &status);
            response
        }
        Admission::Denied {
            status,
            retry_after,
        } => {
            tracing::warn!(
                route = %route.key,
                client = %identity,
                strategy = route.policy.strategy.as_str(),
                "Rate limit exceeded"
            );
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(serde_json::json!({ "message": "rate limit exceeded" })),
            )
                .into_response();
            let headers = response.headers_mut();
            apply_headers(headers, &status);
            headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after.as_secs()));
            response
        }
    }
}

/// User-keyed policies fall back to the network address for anonymous callers.
fn limiter_identity(route: &MatchedRoute, request: &Request<Body>) -> String {
    if route.policy.strategy == LimitStrategy::User {
        if let Some(ctx) = request.extensions().get::<AuthContext>() {
            return format!("user:{}", ctx.user_id);
        }
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    format!("ip:{}", client_address(request.headers(), peer))
}

fn apply_headers(headers: &mut HeaderMap, status: &RateLimitStatus) {
    let reset_at = Utc::now().timestamp() + status.reset_after.as_secs_f64().ceil() as i64;
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(status.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(status.remaining));
    headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoutePolicyConfig;

    fn config(limit: u32, window_secs: u64, burst: Option<u32>) -> RateLimitConfig {
        RateLimitConfig {
            policies: vec![RoutePolicyConfig {
                method: "GET".into(),
                path: "/api/v1/meetings/{meetingID}".into(),
                limit,
                window_secs,
                burst,
                strategy: LimitStrategy::User,
            }],
            ..RateLimitConfig::default()
        }
    }

    fn route(controller: &AdmissionController) -> MatchedRoute {
        controller
            .resolve(&Method::GET, "/api/v1/meetings/m-1")
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_limit_then_deny() {
        let controller = AdmissionController::new(&config(3, 60, None)).unwrap();
        let route = route(&controller);
        let now = Instant::now();

        for expected in [2, 1, 0] {
            match controller.admit_at(&route, "user:a", now) {
                Admission::Allowed(status) => {
                    assert_eq!(status.limit, 3);
                    assert_eq!(status.remaining, expected);
                }
                other => panic!("expected allow, got {other:?}"),
            }
        }

        match controller.admit_at(&route, "user:a", now) {
            Admission::Denied { status, retry_after } => {
                assert_eq!(status.remaining, 0);
                assert_eq!(retry_after, Duration::from_secs(60));
            }
            other => panic!("expected deny, got {other:?}"),
        }

        // Other identities have their own bucket.
        assert!(controller.admit_at(&route, "user:b", now).is_allowed());
        // 3 per 60s refills one token every 20s.
        assert!(controller
            .admit_at(&route, "user:a", now + Duration::from_secs(21))
            .is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_caps_instant_approvals() {
        let controller = AdmissionController::new(&config(60, 60, Some(5))).unwrap();
        let route = route(&controller);
        let now = Instant::now();

        let approved = (0..20)
            .filter(|_| controller.admit_at(&route, "user:a", now).is_allowed())
            .count();
        assert_eq!(approved, 5);
    }

    #[tokio::test]
    async fn test_unmatched_and_disabled_are_untracked() {
        let controller = AdmissionController::new(&config(3, 60, None)).unwrap();
        assert_eq!(
            controller.admit(&Method::POST, "/api/v1/meetings/m-1", "user:a"),
            Admission::Untracked
        );
        assert!(controller.is_empty());

        let disabled = AdmissionController::new(&RateLimitConfig {
            enabled: false,
            ..config(1, 60, None)
        })
        .unwrap();
        for _ in 0..5 {
            assert_eq!(
                disabled.admit(&Method::GET, "/api/v1/meetings/m-1", "user:a"),
                Admission::Untracked
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admits_never_overspend() {
        let controller = Arc::new(AdmissionController::new(&config(10, 3600, None)).unwrap());
        let route = route(&controller);

        let mut tasks = Vec::new();
        for _ in 0..64 {
            let controller = controller.clone();
            let route = route.clone();
            tasks.push(tokio::spawn(async move {
                controller.admit_route(&route, "user:shared").is_allowed()
            }));
        }

        let mut approved = 0;
        for task in tasks {
            if task.await.unwrap() {
                approved += 1;
            }
        }
        assert_eq!(approved, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_entries_only() {
        let controller = AdmissionController::new(&config(1, 60, None)).unwrap();
        let route = route(&controller);
        let start = Instant::now();

        assert!(controller.admit_at(&route, "user:idle", start).is_allowed());
        assert!(controller
            .admit_at(&route, "user:busy", start + Duration::from_secs(3000))
            .is_allowed());

        assert_eq!(controller.sweep_at(start + Duration::from_secs(3601)), 1);
        assert_eq!(controller.len(), 1);

        // A returning caller starts again with a full bucket.
        assert!(controller
            .admit_at(&route, "user:idle", start + Duration::from_secs(3602))
            .is_allowed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweep_and_shutdown() {
        let controller = Arc::new(AdmissionController::new(&config(5, 60, None)).unwrap());
        controller.start();
        controller.admit(&Method::GET, "/api/v1/meetings/m-1", "user:a");
        assert_eq!(controller.len(), 1);

        tokio::time::advance(Duration::from_secs(65 * 60)).await;
        for _ in 0..10 {
            if controller.is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(controller.is_empty());

        controller.shutdown().await;
        assert!(controller.sweeper.lock().is_none());
    }
}
