//! Durable local key-value snapshots.
//!
//! Each store persists a JSON projection of its state under a fixed key.
//! Nothing else writes to this storage.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tempfile::NamedTempFile;

/// Session snapshot: authenticated flag, user profile and bearer token.
pub const SESSION_KEY: &str = "auth";
/// Bearer token for the primary backend.
pub const PRIMARY_TOKEN_KEY: &str = "token";
/// Bearer token for the OneAPI backend.
pub const ONEAPI_TOKEN_KEY: &str = "oneapi_token";
/// Token list and selection snapshot of the token store.
pub const TOKEN_STORE_KEY: &str = "oneapi_token_config";

#[derive(Debug)]
pub enum StorageError {
    Io {
        key: String,
        source: std::io::Error,
    },
    Json {
        key: String,
        source: serde_json::Error,
    },
    Persist {
        key: String,
        source: tempfile::PersistError,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { key, source } => {
                write!(f, "Storage I/O failed for '{key}': {source}")
            }
            StorageError::Json { key, source } => {
                write!(f, "Stored value for '{key}' is not valid JSON: {source}")
            }
            StorageError::Persist { key, source } => {
                write!(f, "Failed to persist '{key}': {source}")
            }
        }
    }
}

impl StdError for StorageError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::Json { source, .. } => Some(source),
            StorageError::Persist { source, .. } => Some(source),
        }
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;
    /// Removing a key that was never written is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

pub fn load_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    match store.get(key)? {
        Some(value) => serde_json::from_value(value)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            }),
        None => Ok(None),
    }
}

pub fn save_json<T: Serialize>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<(), StorageError> {
    let value = serde_json::to_value(value).map_err(|source| StorageError::Json {
        key: key.to_string(),
        source,
    })?;
    store.set(key, value)
}

/// One `<key>.json` file per key inside a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(StorageError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        };
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            })
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            key: key.to_string(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(io_err)?;

        let contents = serde_json::to_vec_pretty(&value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        let mut temp_file = NamedTempFile::new_in(&self.dir).map_err(io_err)?;
        temp_file.write_all(&contents).map_err(io_err)?;
        temp_file.as_file_mut().sync_all().map_err(io_err)?;
        temp_file
            .persist(self.path_for(key))
            .map_err(|source| StorageError::Persist {
                key: key.to_string(),
                source,
            })?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StorageError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }
}

/// Process-local storage; nothing survives a restart.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values().contains_key(key)
    }

    fn values(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.values().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.values().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.values().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn file_store_round_trip_and_remove() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::new(temp_dir.path().join("state"));

        assert!(store.get(SESSION_KEY).expect("get failed").is_none());

        store
            .set(SESSION_KEY, json!({"isAuthenticated": true}))
            .expect("set failed");
        assert_eq!(
            store.get(SESSION_KEY).expect("get failed"),
            Some(json!({"isAuthenticated": true}))
        );
        assert!(temp_dir.path().join("state").join("auth.json").exists());

        store.remove(SESSION_KEY).expect("remove failed");
        assert!(store.get(SESSION_KEY).expect("get failed").is_none());
    }

    #[test]
    fn removing_missing_key_is_ok() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = FileStore::new(temp_dir.path());
        store.remove("never-written").expect("remove should succeed");

        let memory = MemoryStore::new();
        memory.remove("never-written").expect("remove should succeed");
    }

    #[test]
    fn corrupt_file_surfaces_json_error() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        fs::write(temp_dir.path().join("oneapi_token_config.json"), "{not json")
            .expect("write failed");
        let store = FileStore::new(temp_dir.path());

        let err = store
            .get(TOKEN_STORE_KEY)
            .expect_err("corrupt file should not parse");
        assert!(matches!(err, StorageError::Json { .. }));
        assert!(err.to_string().contains("oneapi_token_config"));
    }

    #[test]
    fn typed_helpers_use_serde() {
        let memory = MemoryStore::new();
        save_json(&memory, PRIMARY_TOKEN_KEY, &"abc").expect("save failed");
        let loaded: Option<String> = load_json(&memory, PRIMARY_TOKEN_KEY).expect("load failed");
        assert_eq!(loaded.as_deref(), Some("abc"));

        let mismatched: Result<Option<u32>, _> = load_json(&memory, PRIMARY_TOKEN_KEY);
        assert!(mismatched.is_err());
    }
}
