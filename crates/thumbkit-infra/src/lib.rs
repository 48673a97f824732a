//! thumbkit infrastructure library
//!
//! Shared infrastructure for processes embedding the normalizer:
//! - Telemetry initialization (tracing subscriber)

pub mod telemetry;

pub use telemetry::{init_telemetry, shutdown_telemetry, try_init_test_telemetry};
