// Local key-value persistence for auth tokens

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid storage file: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No storage location available")]
    NoLocation,
}

/// Small string key-value store.
///
/// Backends own the real session; this store only mirrors tokens locally.
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.read().contains_key(key)
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.write().remove(key);
        Ok(())
    }
}

/// Store backed by one JSON object file
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileTokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at `<config_dir>/<token_file>` from the app config
    pub fn from_config(config: &crate::config::AppConfig) -> Result<Self, StorageError> {
        let dir = config.config_dir().ok_or(StorageError::NoLocation)?;
        Ok(Self::new(dir.join(&config.storage.token_file)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<HashMap<String, String>, StorageError> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, entries: &HashMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(entries)?;
        fs::write(&self.path, content)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let _guard = self.lock.lock();
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        entries.insert(key.to_string(), value.to_string());
        self.save(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock();
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_store() -> FileTokenStore {
        let path = std::env::temp_dir()
            .join(format!("billo_store_{}", Uuid::new_v4().simple()))
            .join("auth.json");
        FileTokenStore::new(path)
    }

    #[test]
    fn test_memory_store_roundtrip() {
        let store = MemoryTokenStore::new();
        store.set("sb-auth-token", "abc").unwrap();
        assert_eq!(store.get("sb-auth-token").unwrap().as_deref(), Some("abc"));

        store.remove("sb-auth-token").unwrap();
        assert!(!store.contains("sb-auth-token"));
    }

    #[test]
    fn test_file_store_persists_between_instances() {
        let store = temp_store();
        store.set("sb-auth-token", "abc").unwrap();
        store.set("other", "keep").unwrap();

        let reopened = FileTokenStore::new(store.path().to_path_buf());
        assert_eq!(reopened.get("sb-auth-token").unwrap().as_deref(), Some("abc"));

        reopened.remove("sb-auth-token").unwrap();
        assert_eq!(store.get("sb-auth-token").unwrap(), None);
        assert_eq!(store.get("other").unwrap().as_deref(), Some("keep"));

        let _ = fs::remove_dir_all(store.path().parent().unwrap());
    }

    #[test]
    fn test_file_store_missing_file_is_empty() {
        let store = temp_store();
        assert_eq!(store.get("anything").unwrap(), None);
        store.remove("anything").unwrap();
        assert!(!store.path().exists());
    }
}
