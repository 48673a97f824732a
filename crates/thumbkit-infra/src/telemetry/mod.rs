//! Telemetry initialization
//!
//! Installs the global tracing subscriber used by the normalizer's spans and
//! events.

mod init_basic;

pub use init_basic::{init_telemetry, shutdown_telemetry, try_init_test_telemetry};
