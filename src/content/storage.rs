//! Storage abstraction for content, templates and comments.
//!
//! All paths are relative to the storage root, using `/` separators.
//! Two backends ship with the crate:
//!
//! - [`FsStorage`]: a directory on disk
//! - [`MemoryStorage`]: an in-memory map with a logical clock for mtimes
//!
//! Mutating operations are grouped with [`Storage::transaction`] so that a
//! versioned backend can record them as one change with a message.

use glob::{MatchOptions, Pattern};
use parking_lot::RwLock;
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Component, Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use thiserror::Error;
use walkdir::WalkDir;

/// Storage-level failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("`{0}` does not exist")]
    NotFound(PathBuf),

    #[error("IO error on `{path}`")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid path `{0}`")]
    InvalidPath(PathBuf),

    #[error("invalid glob pattern `{pattern}`")]
    Pattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
}

impl StorageError {
    fn io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path.to_path_buf())
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Body of a [`Storage::transaction`].
pub type TransactionFn<'a> = dyn FnMut(&dyn Storage) -> Result<(), StorageError> + 'a;

/// Backend holding blog files.
pub trait Storage: Send + Sync {
    /// Read a whole file as UTF-8 text.
    fn read(&self, path: &Path) -> Result<String, StorageError>;

    /// Create or replace a file, creating parent directories as needed.
    fn write(&self, path: &Path, contents: &str) -> Result<(), StorageError>;

    fn remove(&self, path: &Path) -> Result<(), StorageError>;

    /// Files matching a glob such as `posts/**/*.md`, sorted by path.
    fn list(&self, pattern: &str) -> Result<Vec<PathBuf>, StorageError>;

    fn mtime(&self, path: &Path) -> Result<SystemTime, StorageError>;

    fn exists(&self, path: &Path) -> bool;

    /// Run `f` as one logical change described by `message`.
    ///
    /// Plain backends simply run the body against themselves.
    fn transaction(&self, message: &str, f: &mut TransactionFn<'_>) -> Result<(), StorageError> {
        let _ = message;
        f(self.as_dyn())
    }

    /// Upcast helper for the default `transaction`.
    fn as_dyn(&self) -> &dyn Storage;
}

/// Match options shared by both backends: `*` never crosses a `/`.
const MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: true,
};

fn compile_pattern(pattern: &str) -> Result<Pattern, StorageError> {
    Pattern::new(pattern).map_err(|source| StorageError::Pattern {
        pattern: pattern.to_owned(),
        source,
    })
}

/// Leading directory of a glob that contains no wildcard.
///
/// `posts/**/*.md` → `posts`, `*.md` → ``.
fn literal_prefix(pattern: &str) -> PathBuf {
    pattern
        .split('/')
        .take_while(|part| !part.contains(['*', '?', '[']))
        .collect()
}

/// Reject absolute paths and `..` so callers cannot escape the root.
fn check_relative(path: &Path) -> Result<(), StorageError> {
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || path.as_os_str().is_empty() {
        return Err(StorageError::InvalidPath(path.to_path_buf()));
    }
    Ok(())
}

// ============================================================================
// Filesystem Backend
// ============================================================================

/// Storage rooted at a directory on disk.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &Path) -> Result<PathBuf, StorageError> {
        check_relative(path)?;
        Ok(self.root.join(path))
    }

    /// A directory walk failure, reported relative to the root.
    fn walk_error(&self, start: &Path, err: walkdir::Error) -> StorageError {
        let at = err.path().unwrap_or(start);
        let path = at.strip_prefix(&self.root).unwrap_or(at).to_path_buf();
        StorageError::io(&path, io::Error::from(err))
    }
}

impl Storage for FsStorage {
    fn read(&self, path: &Path) -> Result<String, StorageError> {
        let full = self.resolve(path)?;
        fs::read_to_string(&full).map_err(|err| StorageError::io(path, err))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|err| StorageError::io(path, err))?;
        }
        fs::write(&full, contents).map_err(|err| StorageError::io(path, err))
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        let full = self.resolve(path)?;
        fs::remove_file(&full).map_err(|err| StorageError::io(path, err))
    }

    fn list(&self, pattern: &str) -> Result<Vec<PathBuf>, StorageError> {
        let matcher = compile_pattern(pattern)?;
        let start = self.root.join(literal_prefix(pattern));
        if !start.is_dir() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(&start).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => match self.walk_error(&start, err) {
                    // Removed while walking: treat as gone.
                    StorageError::NotFound(_) => continue,
                    err => return Err(err),
                },
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.root)
                && matcher.matches_path_with(rel, MATCH)
            {
                files.push(rel.to_path_buf());
            }
        }
        files.sort();
        Ok(files)
    }

    fn mtime(&self, path: &Path) -> Result<SystemTime, StorageError> {
        let full = self.resolve(path)?;
        fs::metadata(&full)
            .and_then(|meta| meta.modified())
            .map_err(|err| StorageError::io(path, err))
    }

    fn exists(&self, path: &Path) -> bool {
        self.resolve(path).is_ok_and(|full| full.is_file())
    }

    fn as_dyn(&self) -> &dyn Storage {
        self
    }
}

// ============================================================================
// In-Memory Backend
// ============================================================================

/// In-memory storage for tests and embedding.
///
/// Every write advances a logical clock by one second, so two successive
/// writes to the same file always yield distinct mtimes.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: RwLock<BTreeMap<PathBuf, (String, SystemTime)>>,
    clock: AtomicU64,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_file(self, path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    /// Insert or replace a file without path validation.
    pub fn insert(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let mtime = self.tick();
        self.files
            .write()
            .insert(path.into(), (contents.into(), mtime));
    }

    /// Advance a file's mtime without changing its contents.
    pub fn touch(&self, path: &Path) -> Result<(), StorageError> {
        let mtime = self.tick();
        let mut files = self.files.write();
        let entry = files
            .get_mut(path)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))?;
        entry.1 = mtime;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    fn tick(&self) -> SystemTime {
        let n = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        UNIX_EPOCH + Duration::from_secs(n)
    }
}

impl Storage for MemoryStorage {
    fn read(&self, path: &Path) -> Result<String, StorageError> {
        self.files
            .read()
            .get(path)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    fn write(&self, path: &Path, contents: &str) -> Result<(), StorageError> {
        check_relative(path)?;
        self.insert(path, contents);
        Ok(())
    }

    fn remove(&self, path: &Path) -> Result<(), StorageError> {
        self.files
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    fn list(&self, pattern: &str) -> Result<Vec<PathBuf>, StorageError> {
        let matcher = compile_pattern(pattern)?;
        Ok(self
            .files
            .read()
            .keys()
            .filter(|path| matcher.matches_path_with(path, MATCH))
            .cloned()
            .collect())
    }

    fn mtime(&self, path: &Path) -> Result<SystemTime, StorageError> {
        self.files
            .read()
            .get(path)
            .map(|(_, mtime)| *mtime)
            .ok_or_else(|| StorageError::NotFound(path.to_path_buf()))
    }

    fn exists(&self, path: &Path) -> bool {
        self.files.read().contains_key(path)
    }

    fn as_dyn(&self) -> &dyn Storage {
        self
    }
}
