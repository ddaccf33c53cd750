use common::{Environment, LogLevel};
use inference::{DetectorConfig, ImageLimits, OcrConfig};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            request_timeout_secs: 120,
        }
    }
}

impl ServerConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Optional persistence of raw uploads.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub enabled: bool,
    pub dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from("uploads"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub log_level: LogLevel,
    pub environment: Environment,
    #[serde(default)]
    pub otel_endpoint: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: ImageLimits,
    #[serde(default)]
    pub detector: DetectorConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub uploads: UploadConfig,
}

/// Plain variables honored for compatibility with existing deployments.
const PLAIN_OVERRIDES: [(&str, &str); 4] = [
    ("PORT", "server.port"),
    ("MODEL_PATH", "detector.model_path"),
    ("ENABLE_GPU", "detector.enable_gpu"),
    ("OCR_MODEL_PATH", "ocr.model_path"),
];

pub fn get_configuration() -> Result<Config, config::ConfigError> {
    let mut builder = config::Config::builder()
        .set_default("log_level", "info")?
        .set_default("environment", Environment::from_env().as_str())?
        .add_source(
            config::Environment::with_prefix("GATEWAY")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("limits.allowed_extensions")
                .with_list_parse_key("detector.class_names")
                .with_list_parse_key("detector.plate_classes")
                .try_parsing(true),
        );

    for (var, key) in PLAIN_OVERRIDES {
        let value = env::var(var).ok().filter(|v| !v.trim().is_empty());
        builder = builder.set_override_option(key, value)?;
    }

    let config: Config = builder.build()?.try_deserialize::<Config>()?;

    Ok(config)
}
