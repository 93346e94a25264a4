//! Classification cache keyed by normalized transaction id.
//!
//! Injected into the classifier so repeat imports of the same transactions do
//! not hit the service again.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tally_core::Category;

use crate::ledger::write_atomic;

pub trait CategoryCache: Send + Sync {
    fn get(&self, id: &str) -> Option<Category>;
    fn put(&self, id: &str, category: Category);
    /// Persist pending entries; a no-op for purely in-memory caches.
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Cache that remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCache;

impl CategoryCache for NoCache {
    fn get(&self, _id: &str) -> Option<Category> {
        None
    }

    fn put(&self, _id: &str, _category: Category) {}
}

#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, Category>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CategoryCache for MemoryCache {
    fn get(&self, id: &str) -> Option<Category> {
        self.entries.lock().ok()?.get(id).copied()
    }

    fn put(&self, id: &str, category: Category) {
        if let Ok(mut m) = self.entries.lock() {
            m.insert(id.to_string(), category);
        }
    }
}

/// Memory cache backed by a JSON object file (`{"<id>": "<label>"}`).
///
/// `flush` folds in entries another process wrote since `open`, so callers
/// holding the ledger lock never drop each other's results.
#[derive(Debug)]
pub struct JsonFileCache {
    path: PathBuf,
    inner: MemoryCache,
}

impl JsonFileCache {
    /// Open the cache at `path`; a missing or unreadable file starts empty.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = read_entries(&path).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable classification cache");
            HashMap::new()
        });
        Ok(Self {
            path,
            inner: MemoryCache {
                entries: Mutex::new(entries),
            },
        })
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

fn read_entries(path: &Path) -> Result<HashMap<String, Category>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    if s.trim().is_empty() {
        return Ok(HashMap::new());
    }
    serde_json::from_str(&s).with_context(|| format!("parse {}", path.display()))
}

impl CategoryCache for JsonFileCache {
    fn get(&self, id: &str) -> Option<Category> {
        self.inner.get(id)
    }

    fn put(&self, id: &str, category: Category) {
        self.inner.put(id, category);
    }

    fn flush(&self) -> Result<()> {
        let on_disk = read_entries(&self.path).unwrap_or_else(|e| {
            tracing::warn!(path = %self.path.display(), error = %e, "overwriting unreadable classification cache");
            HashMap::new()
        });

        let json = {
            let mut m = self
                .inner
                .entries
                .lock()
                .map_err(|_| anyhow::anyhow!("classification cache lock poisoned"))?;
            for (id, category) in on_disk {
                m.entry(id).or_insert(category);
            }
            serde_json::to_string_pretty(&*m).context("serialize classification cache")?
        };
        write_atomic(&self.path, json.as_bytes())
    }
}
