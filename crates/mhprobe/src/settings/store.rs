//! TOML persistence for probe settings.

use std::{fs, io, path};

use thiserror::Error;
use tracing::info;

use super::ProbeSettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: path::PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    Write { path: path::PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

impl ProbeSettings {
    /// Load settings from `path`, creating the file if it does not exist.
    ///
    /// An unset identifier is replaced with a random one and written back,
    /// so the identifier stays the same across restarts.
    pub fn load_or_init(path: impl AsRef<path::Path>) -> Result<Self, ConfigError> {
        let path = normalize_toml_path(path.as_ref());

        let mut settings: Self = if path.exists() {
            let raw = fs::read_to_string(&path)
                .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
            toml::from_str(&raw).map_err(|source| ConfigError::Parse { path: path.clone(), source })?
        } else {
            info!("Creating probe settings at {}", path.display());
            let mut settings = Self::default();
            settings.ensure_identifier(&mut rand::thread_rng());
            settings.write(&path)?;
            return Ok(settings);
        };

        if settings.ensure_identifier(&mut rand::thread_rng()) {
            info!("Generated new probe identifier");
            settings.write(&path)?;
        }

        Ok(settings)
    }

    /// Serialize and write settings to a file
    pub fn write(&self, path: impl AsRef<path::Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let raw = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })?;
        }

        fs::write(path, raw).map_err(|source| ConfigError::Write { path: path.to_path_buf(), source })
    }
}
