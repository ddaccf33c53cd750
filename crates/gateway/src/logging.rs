use crate::config::Config;

/// Local-only logging, used when no OTLP endpoint is configured.
pub fn setup_logging(config: &Config) {
    common::setup_logging(config.log_level, config.environment);
}
