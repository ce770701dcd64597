//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! middleware / engine / server:
//!     → logging.rs (tracing subscriber, env-driven filter)
//!     → metrics.rs (counters and gauges, Prometheus scrape endpoint)
//! ```
//!
//! # Design Decisions
//! - Structured fields on every event, transaction id where one exists
//! - Metric updates are no-ops until an exporter is installed

pub mod logging;
pub mod metrics;
