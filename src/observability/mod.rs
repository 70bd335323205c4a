//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Admission, session and HTTP layers produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```

pub mod logging;
pub mod metrics;

pub use logging::init_tracing;
pub use metrics::init_metrics;
