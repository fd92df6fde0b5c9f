use thiserror::Error;

use super::client_settings::ClientSettings;
use crate::services::BoxFuture;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Path error: {0}")]
    Path(String),
}

pub type SettingsResult<T> = Result<T, SettingsError>;

pub trait ClientSettingsRepository: Send + Sync + 'static {
    /// Load settings, falling back to defaults on first run
    fn load(&self) -> BoxFuture<'static, SettingsResult<ClientSettings>>;

    fn save(&self, settings: ClientSettings) -> BoxFuture<'static, SettingsResult<()>>;
}
