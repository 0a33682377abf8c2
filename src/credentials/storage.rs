//! Durable storage backends for the credential pair.
//!
//! Provides the [`CredentialStorage`] trait and several implementations:
//! - [`FileCredentialStorage`] - One file per key in a per-origin directory
//! - [`MemoryCredentialStorage`] - In-memory storage for testing
//! - [`KeyringCredentialStorage`] - System keyring storage (requires `system-keyring` feature)
//!
//! Backends hold plain string values under the well-known keys
//! [`ACCESS_TOKEN_KEY`] and [`REFRESH_TOKEN_KEY`]. Keeping the two values
//! consistent is the job of [`CredentialStore`](super::CredentialStore).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::instrument;
use url::Url;

use crate::error::CredentialError;

/// Storage key for the access token.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";

/// Storage key for the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Namespace for an API origin, safe as a directory or keyring user prefix.
///
/// `https://api.example.com:8443/v1` becomes `https_api.example.com_8443`.
pub fn origin_namespace(url: &Url) -> String {
    let host = url.host_str().unwrap_or("local");
    let mut ns = format!("{}_{}", url.scheme(), host);
    if let Some(port) = url.port_or_known_default() {
        ns.push('_');
        ns.push_str(&port.to_string());
    }
    ns.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// =============================================================================
// CredentialStorage trait
// =============================================================================

/// Trait for credential storage backends.
///
/// All storage implementations must be thread-safe (`Send + Sync`).
pub trait CredentialStorage: Send + Sync {
    /// Load the value stored under `key`, if any.
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError>;

    /// Store `value` under `key`, replacing any previous value.
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError>;

    /// Remove the value under `key`. Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CredentialError>;

    /// Check if a value exists under `key`.
    fn exists(&self, key: &str) -> Result<bool, CredentialError> {
        Ok(self.load(key)?.is_some())
    }

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}

impl<T: CredentialStorage + ?Sized> CredentialStorage for Arc<T> {
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError> {
        (**self).load(key)
    }
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        (**self).save(key, value)
    }
    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        (**self).remove(key)
    }
    fn exists(&self, key: &str) -> Result<bool, CredentialError> {
        (**self).exists(key)
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// =============================================================================
// FileCredentialStorage
// =============================================================================

/// File permissions for credential files (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based credential storage.
///
/// Each key is a file holding the raw value: `{dir}/{key}`. Point `dir` at a
/// per-origin directory (see [`FileCredentialStorage::for_origin`]) so that
/// sessions for different API origins stay apart.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileCredentialStorage {
    dir: PathBuf,
}

impl FileCredentialStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Storage rooted at `{base}/{origin_namespace(origin)}`.
    pub fn for_origin(base: impl AsRef<Path>, origin: &Url) -> Self {
        Self::new(base.as_ref().join(origin_namespace(origin)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    fn ensure_dir(&self) -> Result<(), CredentialError> {
        if !self.dir.exists() {
            std::fs::create_dir_all(&self.dir).map_err(|e| {
                CredentialError::Storage(format!(
                    "Failed to create credential directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(DIR_MODE);
                std::fs::set_permissions(&self.dir, perms).map_err(|e| {
                    CredentialError::Storage(format!(
                        "Failed to set directory permissions on '{}': {}",
                        self.dir.display(),
                        e
                    ))
                })?;
            }
        }
        Ok(())
    }
}

impl CredentialStorage for FileCredentialStorage {
    #[instrument(skip(self))]
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError> {
        let path = self.key_path(key);
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CredentialError::Storage(format!(
                    "Failed to read credential file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        let value = content.trim();
        if value.is_empty() {
            return Ok(None);
        }
        Ok(Some(value.to_string()))
    }

    #[instrument(skip(self, value))]
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.ensure_dir()?;

        let path = self.key_path(key);

        // Temp file + rename. On Unix the temp file is created 0600 so the
        // value is never readable by other users.
        let temp_path = path.with_extension("tmp");

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(&temp_path)
                .map_err(|e| {
                    CredentialError::Storage(format!(
                        "Failed to create temp file '{}': {}",
                        temp_path.display(),
                        e
                    ))
                })?;
            file.write_all(value.as_bytes()).map_err(|e| {
                CredentialError::Storage(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().map_err(|e| {
                CredentialError::Storage(format!(
                    "Failed to sync temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(&temp_path, value).map_err(|e| {
                CredentialError::Storage(format!(
                    "Failed to write temp file '{}': {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if let Err(e) = std::fs::rename(&temp_path, &path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(CredentialError::Storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                path.display(),
                e
            )));
        }

        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        let path = self.key_path(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CredentialError::Storage(format!(
                "Failed to remove credential file '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn exists(&self, key: &str) -> Result<bool, CredentialError> {
        Ok(self.key_path(key).exists())
    }

    fn name(&self) -> &str {
        "file"
    }
}

// =============================================================================
// KeyringCredentialStorage
// =============================================================================

/// Keyring-based credential storage.
///
/// Entries live under one service name; the keyring user is
/// `{namespace}:{key}` so that origins do not collide.
///
/// Feature-gated behind `system-keyring`.
#[cfg(feature = "system-keyring")]
#[derive(Debug, Clone)]
pub struct KeyringCredentialStorage {
    service: String,
    namespace: String,
}

#[cfg(feature = "system-keyring")]
impl KeyringCredentialStorage {
    const SERVICE_NAME: &str = "sessiongate";

    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            service: Self::SERVICE_NAME.to_string(),
            namespace: namespace.into(),
        }
    }

    pub fn for_origin(origin: &Url) -> Self {
        Self::new(origin_namespace(origin))
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, CredentialError> {
        keyring::Entry::new(&self.service, &format!("{}:{}", self.namespace, key)).map_err(|e| {
            CredentialError::Storage(format!("Failed to create keyring entry: {}", e))
        })
    }
}

#[cfg(feature = "system-keyring")]
impl CredentialStorage for KeyringCredentialStorage {
    #[instrument(skip(self))]
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CredentialError::Storage(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, value))]
    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| CredentialError::Storage(format!("Keyring error: {}", e)))
    }

    #[instrument(skip(self))]
    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        match self.entry(key)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Storage(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}

// =============================================================================
// MemoryCredentialStorage
// =============================================================================

/// In-memory credential storage.
///
/// Clones share the same map, so a test can keep a handle and observe what
/// the store persisted.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStorage {
    inner: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryCredentialStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with both token keys.
    pub fn with_tokens(access_token: &str, refresh_token: &str) -> Self {
        let storage = Self::new();
        {
            let mut map = storage.inner.write();
            map.insert(ACCESS_TOKEN_KEY.to_string(), access_token.to_string());
            map.insert(REFRESH_TOKEN_KEY.to_string(), refresh_token.to_string());
        }
        storage
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl CredentialStorage for MemoryCredentialStorage {
    fn load(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.inner.read().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.inner.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CredentialError> {
        self.inner.write().remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, CredentialError> {
        Ok(self.inner.read().contains_key(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
