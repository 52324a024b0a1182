use std::{
    collections::{BTreeMap, HashMap},
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};

use platelog_types::Result;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::store_error;

/// Synchronous string store in the spirit of browser local storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// In-memory store for tests and throwaway sessions.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| store_error("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| store_error("memory store lock poisoned"))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| store_error("memory store lock poisoned"))?
            .remove(key);
        Ok(())
    }
}

/// Store persisted as a single JSON object, rewritten on every change.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let contents = fs::read_to_string(&path).map_err(|err| {
                store_error(format!("failed to read {}: {err}", path.display()))
            })?;
            if contents.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&contents).map_err(|err| {
                    store_error(format!("corrupt store file {}: {err}", path.display()))
                })?
            }
        } else {
            BTreeMap::new()
        };
        debug!(path = %path.display(), keys = entries.len(), "store opened");
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `entries` to a sibling temp file and rename it over the store,
    /// so readers never see a half-written file.
    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent).map_err(|err| {
            store_error(format!("failed to create {}: {err}", parent.display()))
        })?;
        let json = serde_json::to_string_pretty(entries)
            .map_err(|err| store_error(format!("failed to serialize store: {err}")))?;

        let write_err = |err: std::io::Error| {
            store_error(format!("failed to write {}: {err}", self.path.display()))
        };
        let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| store_error("file store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| store_error("file store lock poisoned"))?;
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| store_error("file store lock poisoned"))?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut next = entries.clone();
        next.remove(key);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_set_get_remove() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("store.json");
        {
            let store = JsonFileStore::open(&path).expect("open");
            store.set("platelog:users", r#"["mina"]"#).expect("set");
            store.set("other", "x").expect("set");
            store.remove("other").expect("remove");
        }
        let reopened = JsonFileStore::open(&path).expect("reopen");
        assert_eq!(
            reopened.get("platelog:users").unwrap().as_deref(),
            Some(r#"["mina"]"#)
        );
        assert_eq!(reopened.get("other").unwrap(), None);
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested").join("store.json");
        let store = JsonFileStore::open(&path).expect("open");
        store.set("kept", "1").expect("set");

        // a plain file where the store's directory should be
        fs::remove_dir_all(dir.path().join("nested")).expect("remove dir");
        fs::write(dir.path().join("nested"), "blocker").expect("write blocker");

        assert!(store.set("lost", "2").is_err());
        assert_eq!(store.get("lost").unwrap(), None);
        assert!(store.remove("kept").is_err());
        assert_eq!(store.get("kept").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn writes_leave_no_temp_files_behind() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).expect("open");
        store.set("a", "1").expect("set");
        store.set("b", "2").expect("set");
        store.remove("a").expect("remove");

        let names: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("store.json")]);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }
}
