//! Telemetry and logging infrastructure
//!
//! Structured logging through tracing; `log` records from dependencies and
//! the render module are bridged into the same subscriber.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogGuard};
