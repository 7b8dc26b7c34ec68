//! The API key and the port through which it is persisted.
//!
//! # Where does the key come from? (for beginners)
//!
//! The control application issues a key the first time this client asks for
//! authorization and a human accepts the request.  The key arrives inside a
//! normal inbound message at `payload.apiKey`; the session saves it through
//! [`CredentialStore`] so the next run can authenticate without asking again.
//!
//! The store is a trait so the session can be tested without touching the
//! filesystem.  The real implementation writes a one-line text file under the
//! platform data directory.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::domain::error::ErrorCode;

/// Maximum credential length in bytes.
pub const MAX_API_KEY_LEN: usize = 39;

/// Maximum length in bytes of the data directory and credential file paths.
pub const MAX_PATH_LEN: usize = 4095;

/// Errors raised by a [`CredentialStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The credential is longer than [`MAX_API_KEY_LEN`].
    #[error("API key is {len} bytes, the maximum is {max}")]
    KeyTooLong { len: usize, max: usize },

    /// The data directory path exceeds [`MAX_PATH_LEN`].
    #[error("data directory path is {len} bytes, the maximum is {max}")]
    DataPathTooLong { len: usize, max: usize },

    /// The credential file path exceeds [`MAX_PATH_LEN`].
    #[error("credential file path is {len} bytes, the maximum is {max}")]
    FilePathTooLong { len: usize, max: usize },

    /// No platform data directory could be determined.
    #[error("cannot determine data directory: {0}")]
    NoDataDir(String),

    /// The credential file or its directory could not be opened or created.
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The credential file could not be written.
    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    /// The exit code this error terminates the run with.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            StoreError::KeyTooLong { .. } => ErrorCode::ApiKeyTooLong,
            StoreError::DataPathTooLong { .. } => ErrorCode::DataPathTooLong,
            StoreError::FilePathTooLong { .. } => ErrorCode::DataFilePathTooLong,
            StoreError::NoDataDir(_) | StoreError::Open { .. } => ErrorCode::DataFileOpen,
            StoreError::Write { .. } => ErrorCode::DataFileWrite,
        }
    }
}

/// What [`CredentialStore::save`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The key was written.
    Written,
    /// The stored key already had this value; nothing was written.
    Unchanged,
}

// ── ApiKey ────────────────────────────────────────────────────────────────────

/// An opaque credential of at most [`MAX_API_KEY_LEN`] bytes.
///
/// `Debug` never prints the key itself.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps `value`, rejecting anything longer than [`MAX_API_KEY_LEN`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyTooLong`] for oversized values.
    pub fn new(value: impl Into<String>) -> Result<Self, StoreError> {
        let value = value.into();
        if value.len() > MAX_API_KEY_LEN {
            return Err(StoreError::KeyTooLong {
                len: value.len(),
                max: MAX_API_KEY_LEN,
            });
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A short form safe for logs: the first four characters and the length.
    pub fn redacted(&self) -> String {
        let head: String = self.0.chars().take(4).collect();
        format!("{head}… ({} bytes)", self.0.len())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&"<redacted>").finish()
    }
}

// ── Port ──────────────────────────────────────────────────────────────────────

/// Persistence port for the API key.
#[cfg_attr(test, mockall::automock)]
pub trait CredentialStore {
    /// Loads the stored key.
    ///
    /// Returns `Ok(None)` when no key has been saved yet.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KeyTooLong`] if the stored value is oversized.
    fn load(&mut self) -> Result<Option<ApiKey>, StoreError>;

    /// Saves `key`, creating missing directories with owner-only permissions.
    ///
    /// Saving the value that is already stored performs no write.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] on any filesystem failure.
    fn save(&mut self, key: &ApiKey) -> Result<SaveOutcome, StoreError>;
}
