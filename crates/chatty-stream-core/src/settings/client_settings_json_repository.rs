use std::path::{Path, PathBuf};

use tracing::debug;

use super::client_settings::ClientSettings;
use super::client_settings_repository::{ClientSettingsRepository, SettingsError, SettingsResult};
use crate::services::BoxFuture;

pub struct ClientSettingsJsonRepository {
    file_path: PathBuf,
}

impl ClientSettingsJsonRepository {
    /// Create repository with XDG-compliant path
    pub fn new() -> SettingsResult<Self> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SettingsError::Path("Cannot determine config directory".into()))?;

        let file_path = config_dir.join("chatty").join("stream_client.json");

        Ok(Self { file_path })
    }

    /// Create repository with custom path (for testing and `--config`)
    pub fn with_path(file_path: PathBuf) -> Self {
        Self { file_path }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl ClientSettingsRepository for ClientSettingsJsonRepository {
    fn load(&self) -> BoxFuture<'static, SettingsResult<ClientSettings>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if !tokio::fs::try_exists(&path).await? {
                debug!(path = %path.display(), "No client settings file, using defaults");
                return Ok(ClientSettings::default());
            }

            let contents = tokio::fs::read_to_string(&path).await?;
            let settings: ClientSettings = serde_json::from_str(&contents)?;
            Ok(settings)
        })
    }

    fn save(&self, settings: ClientSettings) -> BoxFuture<'static, SettingsResult<()>> {
        let path = self.file_path.clone();

        Box::pin(async move {
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let json = serde_json::to_string_pretty(&settings)?;

            // Write atomically using temp file + rename
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }
}
