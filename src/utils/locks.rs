//! Per-path write exclusion.
//!
//! Writers to the same path are serialized by refusing the second writer
//! instead of queueing it: a conflicting write is reported to the caller,
//! which can re-read and retry.

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

/// Set of paths currently held by a writer.
#[derive(Debug, Default)]
pub struct PathLocks {
    held: Mutex<FxHashSet<String>>,
}

/// Exclusive hold on one path, released on drop.
#[derive(Debug)]
pub struct PathGuard<'a> {
    locks: &'a PathLocks,
    key: String,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `key`, or `None` if another writer holds it.
    pub fn try_acquire(&self, key: impl Into<String>) -> Option<PathGuard<'_>> {
        let key = key.into();
        let mut held = self.held.lock();
        if !held.insert(key.clone()) {
            return None;
        }
        Some(PathGuard { locks: self, key })
    }

    pub fn is_held(&self, key: &str) -> bool {
        self.held.lock().contains(key)
    }
}

impl PathGuard<'_> {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for PathGuard<'_> {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_writer_refused() {
        let locks = PathLocks::new();
        let guard = locks.try_acquire("posts/a.md").unwrap();
        assert_eq!(guard.key(), "posts/a.md");
        assert!(locks.try_acquire("posts/a.md").is_none());
        assert!(locks.try_acquire("posts/b.md").is_some());
    }

    #[test]
    fn test_released_on_drop() {
        let locks = PathLocks::new();
        {
            let _guard = locks.try_acquire("posts/a.md").unwrap();
            assert!(locks.is_held("posts/a.md"));
        }
        assert!(!locks.is_held("posts/a.md"));
        assert!(locks.try_acquire("posts/a.md").is_some());
    }
}
