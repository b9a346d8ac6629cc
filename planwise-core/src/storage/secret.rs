//! Session token storage.
//!
//! The file-backed store writes a small JSON document with owner-only
//! permissions (0o600 on unix).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

/// Platform secret store holding at most one token pair
pub trait SecretStore: Send + Sync {
    fn get(&self) -> Result<Option<TokenPair>>;
    fn set(&self, tokens: &TokenPair) -> Result<()>;
    fn clear(&self) -> Result<()>;
}

/// Secret store backed by a JSON file
pub struct FileSecretStore {
    path: PathBuf,
}

impl FileSecretStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self) -> Result<Option<TokenPair>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_str::<TokenPair>(&data) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), "ignoring unreadable credentials file: {e}");
                Ok(None)
            }
        }
    }

    fn set(&self, tokens: &TokenPair) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(tokens)?;

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // `mode` only applies on creation; tighten a pre-existing file before writing
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(json.as_bytes())?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory secret store
#[derive(Default)]
pub struct MemorySecretStore {
    tokens: Mutex<Option<TokenPair>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tokens(tokens: TokenPair) -> Self {
        Self {
            tokens: Mutex::new(Some(tokens)),
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn get(&self) -> Result<Option<TokenPair>> {
        let guard = self
            .tokens
            .lock()
            .map_err(|_| Error::Storage("secret store lock poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn set(&self, tokens: &TokenPair) -> Result<()> {
        let mut guard = self
            .tokens
            .lock()
            .map_err(|_| Error::Storage("secret store lock poisoned".to_string()))?;
        *guard = Some(tokens.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut guard = self
            .tokens
            .lock()
            .map_err(|_| Error::Storage("secret store lock poisoned".to_string()))?;
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_secret_store_roundtrip_and_clear() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path().join("nested/credentials.json"));

        assert!(store.get().unwrap().is_none());

        let tokens = TokenPair::new("access-1", "refresh-1");
        store.set(&tokens).unwrap();
        assert_eq!(store.get().unwrap(), Some(tokens));

        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
        // Clearing twice is fine
        store.clear().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_file_secret_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let store = FileSecretStore::new(dir.path().join("credentials.json"));
        store.set(&TokenPair::new("a", "r")).unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_existing_readable_credentials_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "{\"token\": \"old-and-much-longer-than-the-new-one\"}").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();

        let store = FileSecretStore::new(&path);
        store.set(&TokenPair::new("a", "r")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(store.get().unwrap(), Some(TokenPair::new("a", "r")));
    }

    #[test]
    fn test_corrupt_credentials_read_as_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(&path, "not json").unwrap();

        let store = FileSecretStore::new(path);
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn test_memory_secret_store() {
        let store = MemorySecretStore::with_tokens(TokenPair::new("a", "r"));
        assert_eq!(store.get().unwrap().unwrap().token, "a");
        store.clear().unwrap();
        assert!(store.get().unwrap().is_none());
    }
}
