use std::path::{Path, PathBuf};

use anyhow::Context;
use directories::ProjectDirs;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

use crate::config::Settings;

const SETTINGS_FILE: &str = "settings.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsManager {
    path: PathBuf,
    settings: Settings,
}

impl SettingsManager {
    /// Load settings from the platform config directory
    #[instrument(level = "info")]
    pub async fn load_default() -> Result<Self, SettingsError> {
        let path = Self::default_path()?;
        Self::load_from(path).await
    }

    /// Load settings from `path`, writing defaults there if the file does not exist
    #[instrument(level = "info")]
    pub async fn load_from(path: PathBuf) -> Result<Self, SettingsError> {
        if tokio::fs::metadata(&path).await.is_err() {
            info!(
                "Settings file doesn't exist, writing defaults: {}",
                path.display()
            );
            let manager = Self {
                path,
                settings: Settings::default(),
            };
            manager.save().await?;
            return Ok(manager);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .context("Failed to read settings file")
            .map_err(|e| {
                error!("Failed to read settings file {}: {}", path.display(), e);
                SettingsError::FileReadFailed {
                    path: path.clone(),
                    source: e,
                }
            })?;

        debug!(
            "Successfully read {} bytes from {}",
            content.len(),
            path.display()
        );

        let settings: Settings = toml::from_str(&content)
            .context("Failed to parse settings file")
            .map_err(|e| {
                error!("Failed to parse settings file {}: {}", path.display(), e);
                SettingsError::ParsingFailed {
                    path: path.clone(),
                    source: e,
                }
            })?;

        if settings.refresh.worker_pool_size == 0 {
            warn!("worker_pool_size is 0, refreshes would never run");
            return Err(SettingsError::Invalid {
                field: "refresh.worker_pool_size",
                reason: "must be at least 1".to_string(),
            });
        }

        if settings.refresh.backoff_max_secs < settings.refresh.backoff_base_secs {
            return Err(SettingsError::Invalid {
                field: "refresh.backoff_max_secs",
                reason: "must not be below backoff_base_secs".to_string(),
            });
        }

        info!("Loaded settings from {}", path.display());
        Ok(Self { path, settings })
    }

    #[instrument(skip(self), level = "debug")]
    pub async fn save(&self) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent()
            && tokio::fs::metadata(parent).await.is_err()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create settings directory")
                .map_err(|e| {
                    error!(
                        "Failed to create settings directory {}: {}",
                        parent.display(),
                        e
                    );
                    SettingsError::DirectoryCreationFailed {
                        path: parent.to_path_buf(),
                        source: e,
                    }
                })?;
        }

        let toml = toml::to_string_pretty(&self.settings)
            .context("Failed to serialize settings to TOML")
            .map_err(|e| {
                error!("Failed to serialize settings: {}", e);
                SettingsError::SerializationFailed { source: e }
            })?;

        tokio::fs::write(&self.path, toml)
            .await
            .context("Failed to write settings file")
            .map_err(|e| {
                error!("Failed to write settings file {}: {}", self.path.display(), e);
                SettingsError::FileWriteFailed {
                    path: self.path.clone(),
                    source: e,
                }
            })?;

        debug!("Saved settings at {}", self.path.display());
        Ok(())
    }

    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let proj_dirs = ProjectDirs::from("", "", "credkeeper").ok_or_else(|| {
            error!("Failed to determine project directories - this usually indicates an unsupported OS or missing home directory");
            SettingsError::ProjectDirectoriesUnavailable
        })?;

        Ok(proj_dirs.config_dir().join(SETTINGS_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_missing_file_writes_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("nested").join(SETTINGS_FILE);

        let manager = SettingsManager::load_from(path.clone()).await.unwrap();

        assert_eq!(manager.settings(), &Settings::default());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_partial_file_fills_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        std::fs::write(
            &path,
            "[refresh]\nsafety_margin_secs = 120\nmax_retries = 2\n\n[log]\nfilter = \"debug\"\n",
        )
        .unwrap();

        let manager = SettingsManager::load_from(path).await.unwrap();
        let settings = manager.settings();

        assert_eq!(settings.refresh.safety_margin_secs, 120);
        assert_eq!(settings.refresh.max_retries, 2);
        assert_eq!(settings.refresh.worker_pool_size, 4);
        assert_eq!(settings.log.filter, "debug");
        assert_eq!(settings.provider.request_timeout_secs, 30);
    }

    #[tokio::test]
    async fn test_invalid_toml() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "invalid toml content {{{").unwrap();

        let result = SettingsManager::load_from(path.clone()).await;

        if let Err(SettingsError::ParsingFailed { path: failed, .. }) = result {
            assert_eq!(failed, path);
        } else {
            panic!("Expected ParsingFailed error");
        }
    }

    #[tokio::test]
    async fn test_zero_pool_size_rejected() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);
        std::fs::write(&path, "[refresh]\nworker_pool_size = 0\n").unwrap();

        let result = SettingsManager::load_from(path).await;
        assert!(matches!(
            result,
            Err(SettingsError::Invalid {
                field: "refresh.worker_pool_size",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_save_round_trip() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join(SETTINGS_FILE);

        let mut manager = SettingsManager::load_from(path.clone()).await.unwrap();
        manager.settings_mut().storage.data_dir = Some(temp_dir.path().join("data"));
        manager.settings_mut().refresh.shutdown_grace_secs = 3;
        manager.save().await.unwrap();

        let reloaded = SettingsManager::load_from(path).await.unwrap();
        assert_eq!(reloaded.settings(), manager.settings());
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(
        "Project directories are unavailable - this usually indicates an unsupported OS or missing home directory"
    )]
    ProjectDirectoriesUnavailable,

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read settings file '{path}': {source}")]
    FileReadFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to write settings file '{path}': {source}")]
    FileWriteFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to parse settings file '{path}': {source}")]
    ParsingFailed {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to serialize settings: {source}")]
    SerializationFailed {
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },
}
