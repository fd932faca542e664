//! Prometheus metrics and structured logging for the holdings client.
//!
//! - Structured logging with tracing (JSON in production, pretty otherwise)
//! - Prometheus counters for fetches, reconciliation diagnostics, gate
//!   denials and submitted actions

pub mod error;
pub mod logging;
pub mod metrics;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{init_logging, LoggingConfig};
pub use metrics::{gather_text, Metrics};
