pub mod config;
pub mod logging;
pub mod telemetry;
pub mod trace_context;

pub use config::{Environment, LogLevel};
pub use logging::setup_logging;
pub use telemetry::TelemetryGuard;
pub use trace_context::TraceParent;
