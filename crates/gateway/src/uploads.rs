use crate::config::UploadConfig;
use sanitize_filename::sanitize;
use std::path::PathBuf;
use uuid::Uuid;

/// Writes raw uploads to disk when enabled.
#[derive(Debug, Clone)]
pub struct UploadStore {
    dir: Option<PathBuf>,
}

impl UploadStore {
    /// Create the upload directory if persistence is enabled.
    pub async fn init(config: &UploadConfig) -> anyhow::Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        tokio::fs::create_dir_all(&config.dir).await?;
        tracing::info!(dir = %config.dir.display(), "Persisting uploads");
        Ok(Self {
            dir: Some(config.dir.clone()),
        })
    }

    pub fn disabled() -> Self {
        Self { dir: None }
    }

    /// Store `bytes` as `<uuid>_<sanitized name>`. Failures are logged, never returned.
    pub async fn save(&self, filename: &str, bytes: &[u8]) -> Option<PathBuf> {
        let dir = self.dir.as_ref()?;
        let path = dir.join(stored_name(Uuid::new_v4(), filename));

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                tracing::debug!(path = %path.display(), bytes = bytes.len(), "Upload saved");
                Some(path)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to save upload");
                None
            }
        }
    }
}

fn stored_name(id: Uuid, filename: &str) -> String {
    let sanitized = sanitize(filename);
    if sanitized.is_empty() {
        id.to_string()
    } else {
        format!("{}_{}", id, sanitized)
    }
}
