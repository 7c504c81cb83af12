use std::collections::BTreeMap;
use std::fs;
use std::path::{ Path, PathBuf };
use std::sync::Mutex;

use log::{ debug, warn };

use super::LocalStore;
use crate::error::ChatResult;

/// JSON-object file holding every key. Rewritten on each mutation.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>) -> ChatResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Ignoring unreadable local state at {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };
        debug!("Loaded {} local state entries from {}", entries.len(), path.display());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> ChatResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl LocalStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> ChatResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = entries.clone();
        next.insert(key.to_string(), value.to_string());
        // Memory only follows once the file holds the change.
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    fn remove(&self, key: &str) -> ChatResult<()> {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
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
    use crate::store::{ DARK_MODE_KEY, SELECTED_USER_KEY };
    use tempfile::TempDir;

    #[test]
    fn values_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let store = FileStore::open(&path).unwrap();
        store.set_flag(DARK_MODE_KEY, true).unwrap();
        store.set(SELECTED_USER_KEY, "{}").unwrap();
        store.remove(SELECTED_USER_KEY).unwrap();
        drop(store);

        let reopened = FileStore::open(&path).unwrap();
        assert!(reopened.get_flag(DARK_MODE_KEY));
        assert_eq!(reopened.get(SELECTED_USER_KEY), None);
    }

    #[test]
    fn corrupt_file_opens_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.get(DARK_MODE_KEY), None);
    }

    #[test]
    fn failed_write_leaves_memory_matching_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        let store = FileStore::open(&path).unwrap();
        store.set(DARK_MODE_KEY, "true").unwrap();

        // Block the temp file so the next rewrite fails.
        fs::create_dir(path.with_extension("tmp")).unwrap();

        assert!(store.set(SELECTED_USER_KEY, "{}").is_err());
        assert_eq!(store.get(SELECTED_USER_KEY), None);
        assert!(store.remove(DARK_MODE_KEY).is_err());
        assert_eq!(store.get(DARK_MODE_KEY).as_deref(), Some("true"));
    }

    #[test]
    fn nested_directories_are_created() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a").join("b").join("state.json");
        let store = FileStore::open(&path).unwrap();
        store.set("k", "v").unwrap();
        assert!(path.exists());
    }
}
