use std::io::Write;
use std::path::{Path, PathBuf};

use tubearc_core::models::settings::Settings;

use crate::core::configuration::Configuration;
use crate::core::error::{CoreError, Result};

const DOWNLOAD_PATH_KEY: &str = "download_path";

/// Reads and writes the settings file. Only the owner of the `Settings`
/// value calls `save`, so writes never interleave.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    default_download_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>, default_download_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            default_download_dir: default_download_dir.into(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(&config.settings_path, &config.default_download_dir)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn defaults(&self) -> Settings {
        Settings::with_download_path(&self.default_download_dir)
    }

    /// Never fails: a missing or unreadable file yields defaults, which are
    /// written back so the next start finds a valid file.
    pub fn load(&self) -> Settings {
        match self.try_load() {
            Ok(Some(settings)) => settings,
            Ok(None) => {
                tracing::info!("No settings at {}, creating defaults", self.path.display());
                self.write_defaults()
            }
            Err(e) => {
                tracing::warn!("{}; falling back to defaults", e);
                self.write_defaults()
            }
        }
    }

    /// `Ok(None)` when the file does not exist yet.
    pub fn try_load(&self) -> Result<Option<Settings>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.corrupt(e)),
        };

        let mut value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| self.corrupt(e))?;
        let Some(object) = value.as_object_mut() else {
            return Err(self.corrupt("top level is not an object"));
        };
        if !object.contains_key(DOWNLOAD_PATH_KEY) {
            object.insert(
                DOWNLOAD_PATH_KEY.to_string(),
                serde_json::Value::String(self.default_download_dir.to_string_lossy().to_string()),
            );
        }

        let mut settings: Settings = serde_json::from_value(value).map_err(|e| self.corrupt(e))?;
        settings.normalize();
        Ok(Some(settings))
    }

    /// Pretty JSON, written to a sibling temp file and renamed into place.
    pub fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(settings)?;

        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!("Saved settings to {}", self.path.display());
        Ok(())
    }

    fn write_defaults(&self) -> Settings {
        let settings = self.defaults();
        if let Err(e) = self.save(&settings) {
            tracing::warn!("Could not write default settings: {}", e);
        }
        settings
    }

    fn corrupt(&self, reason: impl std::fmt::Display) -> CoreError {
        CoreError::ConfigCorrupt {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
    }
}
