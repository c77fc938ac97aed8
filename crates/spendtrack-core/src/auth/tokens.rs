//! Persistent storage for the access/refresh token pair.
//!
//! Tokens live under two fixed keys, `st_access` and `st_refresh`, in a
//! pluggable key-value [`TokenStore`]. [`Tokens`] is the typed view the rest
//! of the crate uses; it treats an empty stored value as absent.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ACCESS_KEY: &str = "st_access";
pub const REFRESH_KEY: &str = "st_refresh";

/// Keychain service name for [`KeyringTokenStore`]
const SERVICE_NAME: &str = "spendtrack";

/// Cookie jar file name for [`FileTokenStore`]
const COOKIE_FILE: &str = "cookies.json";

pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Typed access to the token pair. Clone is cheap.
#[derive(Clone)]
pub struct Tokens {
    store: Arc<dyn TokenStore>,
}

impl Tokens {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Tokens backed by process memory only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::default()))
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                warn!(key, error = %e, "Failed to read token");
                None
            }
        }
    }

    pub fn access(&self) -> Option<String> {
        self.read(ACCESS_KEY)
    }

    pub fn refresh(&self) -> Option<String> {
        self.read(REFRESH_KEY)
    }

    pub fn set_access(&self, token: &str) -> Result<()> {
        self.store.set(ACCESS_KEY, token)
    }

    pub fn set_refresh(&self, token: &str) -> Result<()> {
        self.store.set(REFRESH_KEY, token)
    }

    pub fn set_pair(&self, access: &str, refresh: &str) -> Result<()> {
        self.set_access(access)?;
        self.set_refresh(refresh)
    }

    /// Remove both tokens. Both removals are attempted even if the first fails.
    pub fn clear(&self) -> Result<()> {
        let access = self.store.remove(ACCESS_KEY);
        let refresh = self.store.remove(REFRESH_KEY);
        access.and(refresh)
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    values: Mutex<HashMap<String, String>>,
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        values.remove(key);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredCookie {
    pub value: String,
    pub same_site: SameSite,
    pub set_at: DateTime<Utc>,
}

/// Cookie jar persisted as JSON on disk.
pub struct FileTokenStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileTokenStore {
    /// Store tokens in `cookies.json` inside `dir`.
    pub fn new(dir: &Path) -> Self {
        Self::at_path(dir.join(COOKIE_FILE))
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, StoredCookie>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read cookie file")?;
        if contents.trim().is_empty() {
            return Ok(HashMap::new());
        }
        serde_json::from_str(&contents).context("Failed to parse cookie file")
    }

    fn save(&self, jar: &HashMap<String, StoredCookie>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(jar)?;
        std::fs::write(&self.path, contents).context("Failed to write cookie file")?;
        Ok(())
    }

    /// Full cookie entry, including attributes.
    pub fn cookie(&self, key: &str) -> Result<Option<StoredCookie>> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(self.load()?.remove(key))
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cookie(key)?.map(|c| c.value))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut jar = self.load()?;
        jar.insert(
            key.to_string(),
            StoredCookie {
                value: value.to_string(),
                same_site: SameSite::Lax,
                set_at: Utc::now(),
            },
        );
        self.save(&jar)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut jar = self.load()?;
        if jar.remove(key).is_some() {
            self.save(&jar)?;
        }
        Ok(())
    }
}

/// Tokens kept in the OS keychain, one entry per key.
pub struct KeyringTokenStore {
    service: String,
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME.to_string(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?
            .set_password(value)
            .context("Failed to store token in keychain")
    }

    fn remove(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}
