//! Persisted documents (configuration, port map) behind a load/save interface.
//!
//! Stores hand out snapshots; whoever holds the `StoreLock` is the single writer.

use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::errors::{DevrouteError, Result};
use crate::util::write_atomic;

pub trait DocumentStore<T> {
    /// Current snapshot; a missing document yields the default value.
    fn load(&self) -> Result<T>;
    /// Replace the stored document as a whole.
    fn save(&self, doc: &T) -> Result<()>;
}

/// JSON document on disk, pretty-printed, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonFileStore<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> DocumentStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> Result<T> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(T::default()),
            Err(e) => return Err(DevrouteError::filesystem(&self.path, e)),
        };
        if raw.trim().is_empty() {
            return Ok(T::default());
        }
        serde_json::from_str(&raw).map_err(|e| {
            DevrouteError::config(format!("Not valid JSON: {} ({e})", self.path.display()))
        })
    }

    fn save(&self, doc: &T) -> Result<()> {
        let mut buf = serde_json::to_vec_pretty(doc).map_err(|e| {
            DevrouteError::config(format!("cannot serialize {}: {e}", self.path.display()))
        })?;
        buf.push(b'\n');
        write_atomic(&self.path, &buf)
    }
}

/// In-memory store used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore<T> {
    doc: RefCell<T>,
    saves: RefCell<usize>,
}

impl<T: Clone> MemoryStore<T> {
    pub fn new(doc: T) -> Self {
        Self {
            doc: RefCell::new(doc),
            saves: RefCell::new(0),
        }
    }

    pub fn snapshot(&self) -> T {
        self.doc.borrow().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }
}

impl<T: Clone> DocumentStore<T> for MemoryStore<T> {
    fn load(&self) -> Result<T> {
        Ok(self.doc.borrow().clone())
    }

    fn save(&self, doc: &T) -> Result<()> {
        *self.doc.borrow_mut() = doc.clone();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

/// Exclusive advisory lock held for the duration of a mutating command.
///
/// The lock file stays on disk after release so every process locks the same inode.
#[derive(Debug)]
pub struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Acquire a non-blocking exclusive lock at `p`.
pub fn acquire_lock_at(p: &Path) -> Result<StoreLock> {
    if let Some(parent) = p.parent() {
        fs::create_dir_all(parent).map_err(|e| DevrouteError::filesystem(parent, e))?;
    }
    let f = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(true)
        .open(p)
        .map_err(|e| DevrouteError::filesystem(p, e))?;
    match f.try_lock_exclusive() {
        Ok(()) => Ok(StoreLock { file: f }),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Err(DevrouteError::config(
            "Another devroute command is already running (lock held). Please try again later.",
        )),
        Err(e) => Err(DevrouteError::filesystem(p, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::portmap::PortMap;

    #[test]
    fn test_missing_document_loads_default() {
        let td = tempfile::tempdir().expect("tmpdir");
        let store: JsonFileStore<PortMap> = JsonFileStore::new(td.path().join("portmap.json"));
        assert_eq!(store.load().expect("load"), PortMap::default());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("config.json");
        fs::write(&p, "{ not json").expect("write");
        let store: JsonFileStore<Config> = JsonFileStore::new(&p);
        let err = store.load().expect_err("invalid");
        assert!(matches!(err, DevrouteError::Config(_)));
        assert!(err.to_string().contains("Not valid JSON"), "{err}");
    }

    #[test]
    fn test_save_then_load_is_stable_on_disk() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("portmap.json");
        let store: JsonFileStore<PortMap> = JsonFileStore::new(&p);
        let mut pm = PortMap::default();
        pm.insert("projects", "web", 50101);
        pm.insert("projects", "api", 50100);
        store.save(&pm).expect("save");
        let first = fs::read(&p).expect("read");
        let loaded = store.load().expect("load");
        store.save(&loaded).expect("save again");
        assert_eq!(first, fs::read(&p).expect("read again"));
    }

    #[test]
    fn test_lock_is_exclusive_and_released_on_drop() {
        let td = tempfile::tempdir().expect("tmpdir");
        let p = td.path().join("devroute.lock");
        let first = acquire_lock_at(&p).expect("first lock");
        let err = acquire_lock_at(&p).expect_err("second lock");
        assert!(err.to_string().contains("already running"), "{err}");
        drop(first);
        assert!(p.exists(), "lock file must survive release");
        let _again = acquire_lock_at(&p).expect("lock after release");
    }
}
