use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use confik::Configuration;
use log::debug;
use serde::{Deserialize, Serialize};

/// Whether rendered output is memoized for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Configuration)]
#[serde(rename_all = "lowercase")]
#[confik(forward(serde(rename_all = "lowercase")))]
pub enum CacheMode {
    /// Every key is computed once and served from memory afterwards.
    Production,
    /// Nothing is stored, so edits to content show up on the next request.
    Draft,
}

impl CacheMode {
    pub fn is_draft(self) -> bool {
        self == CacheMode::Draft
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    Text(String),
    Bytes(Vec<u8>),
}

/// Value kinds the cache can hold.
pub trait Cacheable: Sized {
    fn into_cached(self) -> CachedValue;
    fn from_cached(value: &CachedValue) -> Option<Self>;
}

impl Cacheable for String {
    fn into_cached(self) -> CachedValue {
        CachedValue::Text(self)
    }

    fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
            CachedValue::Text(text) => Some(text.clone()),
            CachedValue::Bytes(_) => None,
        }
    }
}

impl Cacheable for Vec<u8> {
    fn into_cached(self) -> CachedValue {
        CachedValue::Bytes(self)
    }

    fn from_cached(value: &CachedValue) -> Option<Self> {
        match value {
            CachedValue::Bytes(bytes) => Some(bytes.clone()),
            CachedValue::Text(_) => None,
        }
    }
}

/// Process-wide memo of rendered pages, feeds and file contents.
///
/// Entries are never evicted. A miss releases the lock while `compute` runs,
/// so two requests racing on the same key may both compute it; the last
/// store wins.
#[derive(Debug)]
pub struct RenderCache {
    mode: CacheMode,
    entries: Mutex<HashMap<String, CachedValue>>,
}

impl RenderCache {
    pub fn new(mode: CacheMode) -> Self {
        Self {
            mode,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    pub fn get_or_compute<V, F>(&self, key: &str, compute: F) -> V
    where
        V: Cacheable + Clone,
        F: FnOnce() -> V,
    {
        if self.mode.is_draft() {
            return compute();
        }

        if let Some(hit) = self.lock().get(key).and_then(V::from_cached) {
            return hit;
        }

        debug!("render cache miss for {key}");
        let value = compute();
        self.lock().insert(key.to_string(), value.clone().into_cached());
        value
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, CachedValue>> {
        // The map holds plain data, so a panic elsewhere cannot leave it torn.
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
