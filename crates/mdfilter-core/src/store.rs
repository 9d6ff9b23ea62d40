//! Flat key-value persistence for credentials and the last filter selection.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use mdfilter_api::Credentials;

use crate::config::AppConfig;
use crate::error::CoreError;
use crate::models::StatusSelection;

/// Keys understood by [`CredentialStore`].
pub mod keys {
    pub const USERNAME: &str = "username";
    pub const PASSWORD: &str = "password";
    pub const CLIENT_ID: &str = "client_id";
    pub const CLIENT_SECRET: &str = "client_secret";
    pub const LAST_FILTER_STATUS: &str = "lastFilterStatus";
}

/// Process-wide string store that survives restarts.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), CoreError>;
}

/// TOML-file backed store. Every `set` is written through to disk.
pub struct FileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();
        let values = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw).map_err(|e| CoreError::Store(e.to_string()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    /// Open the store at the platform data directory.
    pub fn open_default() -> Result<Self, CoreError> {
        Self::open(AppConfig::settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> Result<(), CoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(values).map_err(|e| CoreError::Store(e.to_string()))?;
        let tmp = self.path.with_extension("toml.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        self.persist(&values)
    }
}

/// In-memory store that also records every write, in order.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values<'a>(values: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        {
            let mut map = store.values.lock().unwrap_or_else(|e| e.into_inner());
            for (k, v) in values {
                map.insert(k.to_string(), v.to_string());
            }
        }
        store
    }

    pub fn writes(&self) -> Vec<(String, String)> {
        self.writes.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CoreError> {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), value.to_string());
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((key.to_string(), value.to_string()));
        Ok(())
    }
}

/// Typed view over the key-value store.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
}

impl CredentialStore {
    pub fn new(kv: Arc<dyn KeyValueStore>) -> Self {
        Self { kv }
    }

    fn get_or_empty(&self, key: &str) -> String {
        self.kv.get(key).unwrap_or_default()
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            username: self.get_or_empty(keys::USERNAME),
            password: self.get_or_empty(keys::PASSWORD),
            client_id: self.get_or_empty(keys::CLIENT_ID),
            client_secret: self.get_or_empty(keys::CLIENT_SECRET),
        }
    }

    pub fn save_credentials(&self, creds: &Credentials) -> Result<(), CoreError> {
        self.kv.set(keys::USERNAME, &creds.username)?;
        self.kv.set(keys::PASSWORD, &creds.password)?;
        self.kv.set(keys::CLIENT_ID, &creds.client_id)?;
        self.kv.set(keys::CLIENT_SECRET, &creds.client_secret)?;
        tracing::info!(username = %creds.username, "saved MangaDex credentials");
        Ok(())
    }

    /// The persisted filter, `All` when unset or unrecognised.
    pub fn last_selection(&self) -> StatusSelection {
        let raw = self.get_or_empty(keys::LAST_FILTER_STATUS);
        StatusSelection::from_stored_str(&raw).unwrap_or_else(|| {
            tracing::warn!(value = %raw, "ignoring unknown persisted filter status");
            StatusSelection::All
        })
    }

    pub fn set_last_selection(&self, selection: StatusSelection) -> Result<(), CoreError> {
        self.kv
            .set(keys::LAST_FILTER_STATUS, selection.as_stored_str())
    }
}
