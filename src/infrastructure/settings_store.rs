//! Persisted filter settings
//!
//! Stored as `{"filterSettings": {...}}`, the same shape the browser popup
//! writes, so a settings file can be shared between the two.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::{info, warn};

use crate::domain::FilterSettings;

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to get user config directory")]
    NoConfigDir,

    #[error("Settings I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSettings {
    filter_settings: Option<FilterSettings>,
}

/// JSON file holding the user's filter settings
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the user config directory
    pub fn in_config_dir() -> Result<Self, SettingsError> {
        let dir = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        Ok(Self::new(dir.join("job-feed-filter").join("settings.json")))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable content falls back to defaults
    pub async fn load(&self) -> FilterSettings {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No saved settings at {:?}, using defaults", self.path);
                return FilterSettings::default();
            }
            Err(e) => {
                warn!("⚠️ Failed to read settings {:?}: {}", self.path, e);
                return FilterSettings::default();
            }
        };

        match serde_json::from_str::<StoredSettings>(&content) {
            Ok(stored) => {
                let settings = stored.filter_settings.unwrap_or_default();
                info!("Filter settings loaded: {:?}", settings);
                settings
            }
            Err(e) => {
                warn!("⚠️ Corrupt settings file {:?}: {}", self.path, e);
                FilterSettings::default()
            }
        }
    }

    pub async fn save(&self, settings: FilterSettings) -> Result<(), SettingsError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).await.map_err(|source| SettingsError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let stored = StoredSettings {
            filter_settings: Some(settings),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        fs::write(&self.path, content)
            .await
            .map_err(|source| SettingsError::Io {
                path: self.path.clone(),
                source,
            })?;

        info!("💾 Settings saved to {:?}", self.path);
        Ok(())
    }
}
