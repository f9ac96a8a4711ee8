//! Persistence for OAuth user tokens between runs.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Tokens closer than this to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A user token as persisted by a [`CredentialStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Where a stored token stands relative to the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    NoToken,
    ValidToken,
    ExpiredRefreshable,
    ExpiredTerminal,
}

impl TokenState {
    pub fn classify(token: Option<&StoredToken>, now: DateTime<Utc>) -> Self {
        match token {
            None => TokenState::NoToken,
            Some(t) if t.expires_at > now + Duration::seconds(EXPIRY_SKEW_SECS) => {
                TokenState::ValidToken
            }
            Some(t) if t.refresh_token.as_deref().is_some_and(|r| !r.is_empty()) => {
                TokenState::ExpiredRefreshable
            }
            Some(_) => TokenState::ExpiredTerminal,
        }
    }
}

/// Storage backend for user tokens.
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> Result<Option<StoredToken>>;
    fn save(&self, token: &StoredToken) -> Result<()>;
    /// Forget any stored token. Clearing an empty store is not an error.
    fn clear(&self) -> Result<()>;
}

/// Token cache kept as a JSON file on local disk.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Open a store at `path`, creating its parent directory if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let token: StoredToken = serde_json::from_str(&content)?;
        Ok(Some(token))
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;

        // An existing cache keeps its old mode on open.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(json.as_bytes())?;
        debug!(path = %self.path.display(), "saved token cache");
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store, mostly useful in tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<StoredToken>>,
}

impl MemoryCredentialStore {
    pub fn new(token: Option<StoredToken>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<Option<StoredToken>> {
        Ok(self.token.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save(&self, token: &StoredToken) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn token(expires_in: i64, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "access".to_string(),
            refresh_token: refresh.map(str::to_string),
            expires_at: Utc::now() + Duration::seconds(expires_in),
            scope: None,
        }
    }

    #[test]
    fn test_classify_states() {
        let now = Utc::now();
        assert_eq!(TokenState::classify(None, now), TokenState::NoToken);
        assert_eq!(
            TokenState::classify(Some(&token(3600, None)), now),
            TokenState::ValidToken
        );
        assert_eq!(
            TokenState::classify(Some(&token(-10, Some("r"))), now),
            TokenState::ExpiredRefreshable
        );
        assert_eq!(
            TokenState::classify(Some(&token(-10, None)), now),
            TokenState::ExpiredTerminal
        );
        assert_eq!(
            TokenState::classify(Some(&token(-10, Some(""))), now),
            TokenState::ExpiredTerminal
        );
    }

    #[test]
    fn test_classify_within_skew_is_expired() {
        let now = Utc::now();
        assert_eq!(
            TokenState::classify(Some(&token(30, Some("r"))), now),
            TokenState::ExpiredRefreshable
        );
    }

    #[test]
    fn test_file_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = FileCredentialStore::open(dir.path().join("nested/token.json")).unwrap();

        assert_eq!(store.load().unwrap(), None);

        let saved = token(3600, Some("refresh"));
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_file_store_rejects_corrupt_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        fs::write(&path, "not json").unwrap();

        let store = FileCredentialStore::open(&path).unwrap();
        assert!(store.load().is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_file_store_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        let store = FileCredentialStore::open(&path).unwrap();

        store.save(&token(3600, Some("refresh"))).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).unwrap();
        store.save(&token(3600, Some("refresh"))).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryCredentialStore::default();
        store.save(&token(10, None)).unwrap();
        assert!(store.load().unwrap().is_some());
        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
    }
}
