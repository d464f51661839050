// Persistence medium for the message store
//! Synchronous key-value storage holding JSON documents.
//!
//! The store only ever touches two keys, one holding every chat and one
//! holding a flat list of every message across all chats.

use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Key holding the list of chats
pub const CHATS_KEY: &str = "chat_chats";

/// Key holding the flat list of messages for all chats
pub const MESSAGES_KEY: &str = "chat_messages";

/// Errors raised by a storage medium
#[derive(Debug, Error)]
pub enum StorageError {
    /// Reading or writing the backing file failed
    #[error("Storage I/O error for key {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// The stored document is not valid JSON
    #[error("Storage serialization error for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A synchronous key-value medium addressed by string keys.
pub trait KeyValueStorage: Send {
    /// Returns `None` when the key has never been written.
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError>;
}

/// Volatile storage, used by tests and by the demo with `--in-memory`
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Storage keeping one `<key>.json` document per key inside a directory
#[derive(Debug)]
pub struct JsonFileStorage {
    dir: PathBuf,
}

impl JsonFileStorage {
    /// Open (and create if needed) a storage directory
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|source| StorageError::Io {
                key: dir.display().to_string(),
                source,
            })?;
        }
        debug!("Opened JSON storage at {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

impl KeyValueStorage for JsonFileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&path).map_err(|source| StorageError::Io {
            key: key.to_string(),
            source,
        })?;
        let value = serde_json::from_str(&contents).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;
        Ok(Some(value))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<(), StorageError> {
        let contents = serde_json::to_string(&value).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;

        // Write to a sibling file first so a crash never leaves half a document
        let path = self.path_for(key);
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .and_then(|_| fs::rename(&tmp_path, &path))
            .map_err(|source| StorageError::Io {
                key: key.to_string(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_storage_get_and_set() {
        let mut storage = MemoryStorage::new();
        assert!(storage.get(CHATS_KEY).unwrap().is_none());

        storage.set(CHATS_KEY, json!([{"id": "c1"}])).unwrap();
        assert_eq!(storage.get(CHATS_KEY).unwrap(), Some(json!([{"id": "c1"}])));
        assert!(storage.get(MESSAGES_KEY).unwrap().is_none());
    }

    #[test]
    fn test_json_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();

        {
            let mut storage = JsonFileStorage::open(dir.path()).unwrap();
            storage.set(MESSAGES_KEY, json!([{"id": "m1", "chatId": "c1"}])).unwrap();
        }

        let storage = JsonFileStorage::open(dir.path()).unwrap();
        let value = storage.get(MESSAGES_KEY).unwrap().unwrap();
        assert_eq!(value[0]["chatId"], "c1");
        assert!(!dir.path().join("chat_messages.json.tmp").exists());
    }

    #[test]
    fn test_json_file_storage_reports_corrupt_documents() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("chat_chats.json"), "{not json").unwrap();

        let storage = JsonFileStorage::open(dir.path()).unwrap();
        match storage.get(CHATS_KEY) {
            Err(StorageError::Serialization { key, .. }) => assert_eq!(key, CHATS_KEY),
            other => panic!("Expected serialization error, got {:?}", other),
        }
    }
}
