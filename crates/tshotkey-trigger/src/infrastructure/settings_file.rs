//! Loading the optional TOML settings file.
//!
//! Default location:
//! - Linux:   `$XDG_CONFIG_HOME/tshotkeysctl/config.toml` or `~/.config/tshotkeysctl/config.toml`
//! - Windows: `%APPDATA%\tshotkeysctl\config.toml`
//! - macOS:   `~/Library/Application Support/tshotkeysctl/config.toml`
//!
//! A missing file at the default location means "use defaults".  A file named
//! explicitly with `--config` must exist.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::domain::config::Settings;
use crate::infrastructure::credential_file::APP_DIR_NAME;

/// File name of the settings file inside the application directory.
pub const SETTINGS_FILE_NAME: &str = "config.toml";

/// Error type for settings file operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error reading settings at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse settings TOML at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Resolves the default settings file path.
///
/// # Errors
///
/// Returns [`SettingsError::NoPlatformConfigDir`] when the base directory
/// cannot be determined from the environment.
pub fn default_settings_path() -> Result<PathBuf, SettingsError> {
    platform_config_dir()
        .map(|dir| dir.join(APP_DIR_NAME).join(SETTINGS_FILE_NAME))
        .ok_or(SettingsError::NoPlatformConfigDir)
}

/// Loads settings from `explicit`, or from the default path when `None`.
///
/// # Errors
///
/// Returns [`SettingsError::Io`] when an explicit file is missing or any file
/// cannot be read, and [`SettingsError::Parse`] for malformed TOML.
pub fn load_settings(explicit: Option<&Path>) -> Result<Settings, SettingsError> {
    match explicit {
        Some(path) => read_settings(path),
        None => {
            let Ok(path) = default_settings_path() else {
                debug!("no platform config directory, using default settings");
                return Ok(Settings::default());
            };
            if path.exists() {
                read_settings(&path)
            } else {
                debug!("no settings file at {}, using defaults", path.display());
                Ok(Settings::default())
            }
        }
    }
}

fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let settings = toml::from_str(&content).map_err(|source| SettingsError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("settings loaded from {}", path.display());
    Ok(settings)
}

/// Resolves the platform config base directory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(PathBuf::from)
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join("Library").join("Application Support"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_file(content: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tshotkey-settings-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(SETTINGS_FILE_NAME);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_explicit_file_is_parsed() {
        // Arrange
        let path = scratch_file("[connection]\nport = 7000\n");

        // Act
        let settings = load_settings(Some(&path)).unwrap();

        // Assert
        assert_eq!(settings.connection.port, 7000);
        assert_eq!(settings.connection.host, "localhost");

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let path = std::env::temp_dir()
            .join(format!("tshotkey-missing-{}", uuid::Uuid::new_v4()))
            .join(SETTINGS_FILE_NAME);

        let result = load_settings(Some(&path));

        assert!(matches!(result, Err(SettingsError::Io { .. })));
    }

    #[test]
    fn test_malformed_file_is_a_parse_error() {
        let path = scratch_file("[connection\nport = ");

        let result = load_settings(Some(&path));

        assert!(matches!(result, Err(SettingsError::Parse { .. })));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_default_path_ends_with_app_dir_and_file_name() {
        if let Ok(path) = default_settings_path() {
            assert!(path.ends_with(Path::new(APP_DIR_NAME).join(SETTINGS_FILE_NAME)));
        }
    }
}
