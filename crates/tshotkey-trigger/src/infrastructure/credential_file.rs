//! File-backed [`CredentialStore`]: one line of text under the platform data
//! directory.
//!
//! Location:
//! - Linux and other Unix: `$XDG_DATA_HOME/tshotkeysctl/api_key`, falling back
//!   to `~/.local/share/tshotkeysctl/api_key`
//! - Windows: `%APPDATA%\tshotkeysctl\api_key`
//! - macOS:   `~/Library/Application Support/tshotkeysctl/api_key`
//!
//! The file holds the raw key with no encoding.  A missing or unreadable file
//! simply means no key has been issued yet.
//!
//! # Permissions (for beginners)
//!
//! The key authorizes anyone holding it to press buttons in the control
//! application, so on Unix the directory is created `0700` and the file `0600`:
//! readable by the owner only.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use tshotkey_core::domain::credential::{
    ApiKey, CredentialStore, SaveOutcome, StoreError, MAX_PATH_LEN,
};

/// Directory created under the platform data (and config) directory.
pub const APP_DIR_NAME: &str = "tshotkeysctl";

/// Name of the credential file.
pub const API_KEY_FILE_NAME: &str = "api_key";

/// Credential store backed by a single text file.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    /// Last value loaded from or written to the file.
    current: Option<ApiKey>,
}

impl FileCredentialStore {
    /// A store reading and writing `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            current: None,
        }
    }

    /// A store at the platform default location.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NoDataDir`] when no data directory can be
    /// determined, or a path-length error when either path is too long.
    pub fn from_platform() -> Result<Self, StoreError> {
        let base = platform_data_dir().ok_or_else(|| {
            StoreError::NoDataDir("neither XDG_DATA_HOME, HOME nor APPDATA is set".to_string())
        })?;
        let path = credential_path(&base)?;
        debug!("credential file: {}", path.display());
        Ok(Self::new(path))
    }

    /// The credential file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_key(&self, key: &ApiKey) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir).map_err(|source| StoreError::Open {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let mut file = open_private_file(&self.path).map_err(|source| StoreError::Open {
            path: self.path.clone(),
            source,
        })?;
        file.write_all(key.as_str().as_bytes())
            .and_then(|()| file.flush())
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&mut self) -> Result<Option<ApiKey>, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no API key file at {}", self.path.display());
                self.current = None;
                return Ok(None);
            }
            Err(e) => {
                info!("cannot read {}: {e}; continuing without API key", self.path.display());
                self.current = None;
                return Ok(None);
            }
        };

        let line = content.lines().next().unwrap_or_default();
        if line.is_empty() {
            self.current = None;
            return Ok(None);
        }
        let key = ApiKey::new(line)?;
        debug!("API key read from {}", self.path.display());
        self.current = Some(key.clone());
        Ok(Some(key))
    }

    fn save(&mut self, key: &ApiKey) -> Result<SaveOutcome, StoreError> {
        if self.current.as_ref() == Some(key) {
            debug!("API key unchanged, not writing {}", self.path.display());
            return Ok(SaveOutcome::Unchanged);
        }
        self.write_key(key)?;
        info!("API key written to {}", self.path.display());
        self.current = Some(key.clone());
        Ok(SaveOutcome::Written)
    }
}

// ── Path resolution ───────────────────────────────────────────────────────────

/// Builds `<base>/tshotkeysctl/api_key`, enforcing the path-length limits.
///
/// # Errors
///
/// Returns [`StoreError::DataPathTooLong`] or [`StoreError::FilePathTooLong`].
pub fn credential_path(base: &Path) -> Result<PathBuf, StoreError> {
    let dir = base.join(APP_DIR_NAME);
    let dir_len = dir.as_os_str().len();
    if dir_len > MAX_PATH_LEN {
        return Err(StoreError::DataPathTooLong {
            len: dir_len,
            max: MAX_PATH_LEN,
        });
    }
    let file = dir.join(API_KEY_FILE_NAME);
    let file_len = file.as_os_str().len();
    if file_len > MAX_PATH_LEN {
        return Err(StoreError::FilePathTooLong {
            len: file_len,
            max: MAX_PATH_LEN,
        });
    }
    Ok(file)
}

/// Resolves the platform data base directory without the application subdirectory.
fn platform_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .filter(|v| !v.is_empty())
            .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var_os("HOME")
                    .filter(|v| !v.is_empty())
                    .map(|h| PathBuf::from(h).join(".local").join("share"))
            })
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).create(dir)
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
