//! Per-run memo of module loads

use mlua::Table;
use std::collections::HashMap;

use super::error::LoadError;

#[derive(Debug, Clone)]
pub enum CacheEntry {
    /// Execution has started and not yet finished.
    Loading,
    Loaded(Table),
    Failed(LoadError),
}

/// Outcome of [`ModuleCache::begin`].
#[derive(Debug)]
pub enum Begin {
    /// The caller now owns the load and must call [`ModuleCache::complete`].
    Started,
    Cached(Table),
}

/// Entries move `Loading -> Loaded | Failed` exactly once and are never
/// evicted.
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: HashMap<String, CacheEntry>,
}

impl ModuleCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` for loading. A key still loading means the load graph has
    /// a cycle; a completed key returns its memoized outcome.
    pub fn begin(&mut self, key: &str) -> Result<Begin, LoadError> {
        match self.entries.get(key) {
            Some(CacheEntry::Loading) => Err(LoadError::Cycle {
                path: key.to_string(),
            }),
            Some(CacheEntry::Loaded(bindings)) => Ok(Begin::Cached(bindings.clone())),
            Some(CacheEntry::Failed(err)) => Err(err.clone()),
            None => {
                self.entries.insert(key.to_string(), CacheEntry::Loading);
                Ok(Begin::Started)
            }
        }
    }

    pub fn complete(&mut self, key: &str, outcome: &Result<Table, LoadError>) {
        let entry = match outcome {
            Ok(bindings) => CacheEntry::Loaded(bindings.clone()),
            Err(err) => CacheEntry::Failed(err.clone()),
        };
        self.entries.insert(key.to_string(), entry);
    }

    pub fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
