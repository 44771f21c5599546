//! # State documents
//! Persistence port for the price history and post records.
//!
//! Each document is a flat JSON object addressed by name (`prices_wb`,
//! `history`, ...). The file implementation writes `<name>.tmp` first and
//! renames it over `<name>.json`, so a crash mid-write never leaves a
//! truncated document behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

pub trait StateStore: Send + Sync {
    /// Raw bytes of the document, or `None` if it was never written.
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>>;
    /// Replace the document with `bytes`.
    fn save(&self, name: &str, bytes: &[u8]) -> Result<()>;
}

/// Load and decode a document. Unreadable or corrupt documents yield
/// `T::default()` with a warning; losing state beats refusing to start.
pub fn load_or_default<T>(store: &dyn StateStore, name: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let bytes = match store.load(name) {
        Ok(Some(b)) => b,
        Ok(None) => return T::default(),
        Err(e) => {
            tracing::warn!(document = name, error = ?e, "state load failed, starting empty");
            return T::default();
        }
    };
    match serde_json::from_slice(&bytes) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(document = name, error = %e, "corrupt state document, starting empty");
            T::default()
        }
    }
}

/// Encode `value` as pretty JSON and hand it to the store.
pub fn save_json<T: Serialize>(store: &dyn StateStore, name: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(value).with_context(|| format!("encode {name}"))?;
    store.save(name, &bytes)
}

/// JSON files in one directory, replaced atomically.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Creates `dir` if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("create state dir {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }
}

impl StateStore for JsonFileStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_of(name);
        match fs::read(&path) {
            Ok(b) => Ok(Some(b)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_of(name);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, &path)
            .with_context(|| format!("rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

/// In-process store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    docs: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every `save` fails; used to exercise the write-failure path.
    pub fn failing() -> Self {
        Self {
            docs: Mutex::new(HashMap::new()),
            fail_writes: true,
        }
    }

    /// Seed a document with raw bytes.
    pub fn insert(&self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.docs.lock().insert(name.to_string(), bytes.into());
    }

    /// Current bytes of a document.
    pub fn get(&self, name: &str) -> Option<Vec<u8>> {
        self.docs.lock().get(name).cloned()
    }
}

impl StateStore for MemoryStore {
    fn load(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.docs.lock().get(name).cloned())
    }

    fn save(&self, name: &str, bytes: &[u8]) -> Result<()> {
        if self.fail_writes {
            anyhow::bail!("memory store is read-only ({name})");
        }
        self.docs.lock().insert(name.to_string(), bytes.to_vec());
        Ok(())
    }
}
