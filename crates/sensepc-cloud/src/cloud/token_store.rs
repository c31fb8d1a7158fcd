//! Auth token storage.
//!
//! Tokens are kept as [`SecretString`] in memory and only exposed when they
//! are written to disk or attached to a request.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use secrecy::{ExposeSecret, SecretString};

use crate::cloud::error::CloudError;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Key/value store for auth tokens.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<SecretString>;
    fn set(&self, key: &str, value: SecretString) -> Result<(), CloudError>;
    /// Removing a missing key is not an error.
    fn remove(&self, key: &str) -> Result<(), CloudError>;

    /// Forget every token this client manages (sign-out).
    fn clear(&self) -> Result<(), CloudError> {
        self.remove(ACCESS_TOKEN_KEY)?;
        self.remove(REFRESH_TOKEN_KEY)
    }
}

fn poisoned() -> CloudError {
    CloudError::Storage("token cache lock poisoned".to_string())
}

// ── In-memory ───────────────────────────────────────────────────────────

/// Process-lifetime store, for tests and for runs without a data directory.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: RwLock<HashMap<String, SecretString>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<SecretString> {
        self.tokens.read().ok().and_then(|t| t.get(key).cloned())
    }

    fn set(&self, key: &str, value: SecretString) -> Result<(), CloudError> {
        self.tokens.write().map_err(|_| poisoned())?.insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CloudError> {
        self.tokens.write().map_err(|_| poisoned())?.remove(key);
        Ok(())
    }
}

// ── JSON file ───────────────────────────────────────────────────────────

/// Tokens persisted as a flat JSON object, readable by the owner only.
///
/// The file is read once on open; every mutation rewrites it through a
/// temporary file and a rename.
pub struct FileTokenStore {
    path: PathBuf,
    tokens: RwLock<HashMap<String, SecretString>>,
}

impl FileTokenStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CloudError> {
        let path = path.into();
        let tokens = if path.exists() {
            let data = fs::read_to_string(&path)?;
            if data.trim().is_empty() {
                HashMap::new()
            } else {
                let raw: HashMap<String, String> = serde_json::from_str(&data)
                    .map_err(|e| CloudError::Storage(format!("{}: {}", path.display(), e)))?;
                raw.into_iter().map(|(k, v)| (k, SecretString::new(v))).collect()
            }
        } else {
            HashMap::new()
        };
        log::debug!("[token-store] opened {} ({} keys)", path.display(), tokens.len());
        Ok(Self {
            path,
            tokens: RwLock::new(tokens),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, tokens: &HashMap<String, SecretString>) -> Result<(), CloudError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let raw: HashMap<&str, &str> = tokens
            .iter()
            .map(|(k, v)| (k.as_str(), v.expose_secret().as_str()))
            .collect();
        let json = serde_json::to_string_pretty(&raw).map_err(|e| CloudError::Storage(e.to_string()))?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        restrict_permissions(&tmp)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), CloudError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), CloudError> {
    Ok(())
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Option<SecretString> {
        self.tokens.read().ok().and_then(|t| t.get(key).cloned())
    }

    fn set(&self, key: &str, value: SecretString) -> Result<(), CloudError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned())?;
        tokens.insert(key.to_string(), value);
        self.persist(&tokens)
    }

    fn remove(&self, key: &str) -> Result<(), CloudError> {
        let mut tokens = self.tokens.write().map_err(|_| poisoned())?;
        if tokens.remove(key).is_none() {
            return Ok(());
        }
        self.persist(&tokens)
    }
}

impl std::fmt::Debug for FileTokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTokenStore").field("path", &self.path).finish()
    }
}
