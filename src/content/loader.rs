//! Mtime-validated caching of loaded items.
//!
//! Both content documents and compiled templates are cached by source path
//! and reloaded only when the source's modification time changes. The
//! [`Loader`] trait produces an item from a path; [`MtimeCache`] remembers
//! which mtime each item was produced from.

use rustc_hash::FxHashMap;
use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Produces an item from a source path.
pub trait Loader {
    type Item;
    type Error;

    fn load(&self, key: &Path) -> Result<Self::Item, Self::Error>;
}

/// A cached item and the mtime of the source it was loaded from.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub item: T,
    pub mtime: SystemTime,
}

/// Map from source path to the item last loaded from it.
#[derive(Debug, Clone)]
pub struct MtimeCache<T> {
    entries: FxHashMap<PathBuf, Cached<T>>,
}

impl<T> Default for MtimeCache<T> {
    fn default() -> Self {
        Self {
            entries: FxHashMap::default(),
        }
    }
}

impl<T: Clone> MtimeCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Path) -> Option<&Cached<T>> {
        self.entries.get(key)
    }

    /// Whether `key` is cached with exactly this mtime.
    pub fn is_fresh(&self, key: &Path, mtime: SystemTime) -> bool {
        self.entries.get(key).is_some_and(|c| c.mtime == mtime)
    }

    pub fn insert(&mut self, key: impl Into<PathBuf>, item: T, mtime: SystemTime) {
        self.entries.insert(key.into(), Cached { item, mtime });
    }

    /// Drop entries whose key fails `keep`, returning how many were dropped.
    pub fn retain(&mut self, mut keep: impl FnMut(&Path) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(key));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Return the cached item if fresh, otherwise load and cache it.
    ///
    /// The flag is `true` when the loader ran.
    pub fn load_if_stale<L>(
        &mut self,
        loader: &L,
        key: &Path,
        mtime: SystemTime,
    ) -> Result<(T, bool), L::Error>
    where
        L: Loader<Item = T>,
    {
        if let Some(cached) = self.entries.get(key)
            && cached.mtime == mtime
        {
            return Ok((cached.item.clone(), false));
        }

        let item = loader.load(key)?;
        self.insert(key, item.clone(), mtime);
        Ok((item, true))
    }
}
