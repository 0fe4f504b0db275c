//! Prometheus metrics and structured logging for the price voter.
//!
//! - Prometheus counters and gauges for the commit-reveal pipeline
//! - Structured JSON logging with tracing

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::Metrics;
