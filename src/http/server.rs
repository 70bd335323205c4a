//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the auth endpoints
//! - Wire authentication and admission onto the routes that need them
//! - Wire up cross-cutting layers (timeout, body limit, CORS, request id, tracing)
//! - Serve until the shutdown signal, then stop the limiter sweep

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::FromRef,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::{GatewayConfig, SecurityConfig};
use crate::http::cookies::CookieSettings;
use crate::http::handlers;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer, track_metrics};
use crate::lifecycle::Shutdown;
use crate::security::{access_control_middleware, rate_limit_middleware, AdmissionController};
use crate::session::SessionManager;

/// Application state injected into handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
    pub admission: Arc<AdmissionController>,
    pub cookies: Arc<CookieSettings>,
}

impl AppState {
    pub fn new(
        config: &GatewayConfig,
        sessions: Arc<SessionManager>,
        admission: Arc<AdmissionController>,
    ) -> Self {
        Self {
            sessions,
            admission,
            cookies: Arc::new(CookieSettings::from_config(&config.auth)),
        }
    }
}

impl FromRef<AppState> for Arc<AdmissionController> {
    fn from_ref(state: &AppState) -> Self {
        state.admission.clone()
    }
}

/// HTTP server for the session gateway.
pub struct GatewayServer {
    router: Router,
    state: AppState,
    config: GatewayConfig,
}

impl GatewayServer {
    pub fn new(
        config: GatewayConfig,
        sessions: Arc<SessionManager>,
        admission: Arc<AdmissionController>,
    ) -> Self {
        let state = AppState::new(&config, sessions, admission);
        let router = Self::build_router(&config, state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// On protected routes authentication is the outer route layer, so the
    /// admission check sees the resolved user.
    #[allow(deprecated)]
    pub fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        let public = Router::new()
            .route("/api/v1/auth/register", post(handlers::register))
            .route("/api/v1/auth/login", post(handlers::login))
            .route("/api/v1/auth/refresh", post(handlers::refresh))
            .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

        let protected = Router::new()
            .route("/api/v1/auth/logout", post(handlers::logout))
            .route("/api/v1/auth/session", get(handlers::session))
            .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware))
            .route_layer(from_fn_with_state(state.clone(), access_control_middleware));

        Router::new()
            .merge(public)
            .merge(protected)
            .route("/healthz", get(handlers::health))
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
            .layer(from_fn(track_metrics))
            .layer(cors_layer(&config.security))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// A clone of the router, for driving requests without a listener.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run until `shutdown` fires, then drain and stop the limiter sweep.
    pub async fn run(self, listener: TcpListener, shutdown: &Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            policies = self.config.rate_limit.policies.len(),
            "HTTP server starting"
        );

        self.state.admission.start();

        let mut signal = shutdown.subscribe();
        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = signal.recv().await;
            })
            .await;

        self.state.admission.shutdown().await;
        served?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }
}

/// Credentialed CORS for the configured browser origins.
fn cors_layer(config: &SecurityConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}
