//! The content store: scanning, publishing and mutating documents.
//!
//! # Reload
//!
//! ```text
//! list dirs × extensions ──► mtimes ──► fingerprint == published? ──► done
//!                                              │ no
//!                                              ▼
//!                  clone cache ──► parse stale files (rayon) ──► Index::build
//!                                                                     │
//!                                  publish lock: newer than last? ◄───┘
//!                                              │ yes
//!                                              ▼
//!                                 ArcSwap::store + cache replace
//! ```
//!
//! Any parse or read failure aborts the cycle before publication: the
//! document cache is untouched and the previous index keeps being served.
//! Readers never block; they hold whatever `Arc<Index>` they loaded.

use super::{
    document::Document,
    error::ContentError,
    frontmatter::Metadata,
    index::{Archive, CategorySummary, Fingerprint, Index},
    loader::{Loader, MtimeCache},
    markup::Markup,
    storage::Storage,
};
use crate::{
    config::ContentConfig,
    log,
    utils::{locks::PathLocks, slug::file_slug},
};
use arc_swap::ArcSwap;
use chrono::{Datelike, NaiveDate};
use parking_lot::Mutex;
use rayon::prelude::*;
use rustc_hash::FxHashSet;
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

// ============================================================================
// Loading
// ============================================================================

/// Reads and parses one content file through the storage backend.
pub struct DocumentLoader {
    storage: Arc<dyn Storage>,
    markup: Arc<dyn Markup>,
    dirs: Vec<PathBuf>,
}

impl DocumentLoader {
    fn dir_of(&self, source: &Path) -> Option<&Path> {
        self.dirs
            .iter()
            .find(|dir| source.starts_with(dir))
            .map(PathBuf::as_path)
    }
}

impl Loader for DocumentLoader {
    type Item = Arc<Document>;
    type Error = ContentError;

    fn load(&self, source: &Path) -> Result<Arc<Document>, ContentError> {
        let read_err = |source_err| ContentError::Read {
            path: source.to_path_buf(),
            source: source_err,
        };
        let mtime = self.storage.mtime(source).map_err(read_err)?;
        let text = self.storage.read(source).map_err(read_err)?;
        let dir = self
            .dir_of(source)
            .ok_or_else(|| ContentError::parse(source, "not inside a content directory"))?;

        Document::parse(dir, source, &text, mtime, Arc::clone(&self.markup)).map(Arc::new)
    }
}

// ============================================================================
// Store
// ============================================================================

/// Result of one [`ContentStore::reload`].
#[derive(Debug, Clone, Default)]
pub struct ReloadOutcome {
    /// A new index was published by this call.
    pub changed: bool,
    /// Files parsed because they were new or modified.
    pub loaded: usize,
    /// Files dropped because they disappeared.
    pub removed: usize,
    /// Documents in the index now being served.
    pub documents: usize,
    pub elapsed: Duration,
    /// The reload exceeded the configured bound.
    pub slow: bool,
}

/// A document to be created by [`ContentStore::create`].
#[derive(Debug, Clone)]
pub struct Draft {
    /// Content directory the file goes into, e.g. `posts`.
    pub dir: PathBuf,
    pub title: String,
    /// Posts carry a date; pages don't.
    pub date: Option<NaiveDate>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    /// Document type, i.e. the file extension.
    pub kind: String,
    pub body: String,
}

impl Draft {
    /// Source path: `dir/year/month/slug.kind` for posts, `dir/slug.kind` for pages.
    pub fn source(&self) -> PathBuf {
        let file = format!("{}.{}", file_slug(&self.title), self.kind);
        match self.date {
            Some(date) => self
                .dir
                .join(date.year().to_string())
                .join(date.month().to_string())
                .join(file),
            None => self.dir.join(file),
        }
    }

    fn text(&self, markup: &dyn Markup) -> String {
        let meta = Metadata {
            date: self.date,
            category: self.category.clone(),
            tags: self.tags.clone(),
            ..Metadata::default()
        };

        let mut out = String::new();
        let yaml = meta.to_yaml();
        if !yaml.is_empty() {
            out.push_str("---\n");
            out.push_str(&yaml);
            out.push_str("---\n\n");
        }
        out.push_str(&markup.heading(&self.kind, &self.title));
        out.push_str("\n\n");
        out.push_str(self.body.trim_end());
        out.push('\n');
        out
    }
}

/// File-backed document store with an atomically swapped index.
pub struct ContentStore {
    storage: Arc<dyn Storage>,
    loader: DocumentLoader,
    patterns: Vec<String>,
    reload_timeout: Duration,
    index: ArcSwap<Index>,
    cache: Mutex<MtimeCache<Arc<Document>>>,
    /// Sequence number of the scan whose index is published.
    published: Mutex<u64>,
    scans: AtomicU64,
    locks: PathLocks,
}

impl ContentStore {
    /// Create an empty store; call [`reload`](Self::reload) to populate it.
    pub fn new(storage: Arc<dyn Storage>, markup: Arc<dyn Markup>, config: &ContentConfig) -> Self {
        let patterns = config
            .dirs
            .iter()
            .flat_map(|dir| {
                config
                    .extensions
                    .iter()
                    .map(move |ext| format!("{}/**/*.{ext}", dir.display()))
            })
            .collect();

        Self {
            loader: DocumentLoader {
                storage: Arc::clone(&storage),
                markup,
                dirs: config.dirs.clone(),
            },
            storage,
            patterns,
            reload_timeout: config.reload_timeout(),
            index: ArcSwap::from_pointee(Index::default()),
            cache: Mutex::new(MtimeCache::new()),
            published: Mutex::new(0),
            scans: AtomicU64::new(0),
            locks: PathLocks::new(),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// List content files with their current mtimes, sorted by path.
    fn scan(&self) -> Result<Fingerprint, ContentError> {
        let mut files = FxHashSet::default();
        for pattern in &self.patterns {
            files.extend(self.storage.list(pattern)?);
        }

        let mut fingerprint = Vec::with_capacity(files.len());
        for file in files {
            match self.storage.mtime(&file) {
                Ok(mtime) => fingerprint.push((file, mtime)),
                // Deleted between listing and stat: treat as gone.
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(ContentError::Read {
                        path: file,
                        source: err,
                    });
                }
            }
        }
        fingerprint.sort();
        Ok(fingerprint)
    }

    /// Bring the index up to date with storage.
    ///
    /// Cheap when nothing changed: only listing and mtimes are read, and
    /// the published `Arc<Index>` stays the same.
    pub fn reload(&self) -> Result<ReloadOutcome, ContentError> {
        let started = Instant::now();
        let seq = self.scans.fetch_add(1, Ordering::SeqCst) + 1;

        let fingerprint = self.scan()?;
        let current = self.index.load_full();
        if current.fingerprint() == &fingerprint {
            return Ok(self.finish(started, ReloadOutcome {
                documents: current.len(),
                ..ReloadOutcome::default()
            }));
        }

        let mut cache = self.cache.lock().clone();

        let loaded: Vec<(PathBuf, Arc<Document>, SystemTime)> = fingerprint
            .par_iter()
            .filter(|(path, mtime)| !cache.is_fresh(path, *mtime))
            .map(|(path, mtime)| {
                self.loader
                    .load(path)
                    .map(|doc| (path.clone(), doc, *mtime))
            })
            .collect::<Result<_, _>>()?;

        let removed = {
            let live: FxHashSet<&Path> = fingerprint.iter().map(|(p, _)| p.as_path()).collect();
            cache.retain(|path| live.contains(path))
        };
        let loaded_count = loaded.len();
        for (path, doc, mtime) in loaded {
            cache.insert(path, doc, mtime);
        }

        let documents: Vec<Arc<Document>> = fingerprint
            .iter()
            .filter_map(|(path, _)| cache.get(path).map(|c| Arc::clone(&c.item)))
            .collect();
        let index = Index::build(documents, fingerprint)?;
        let count = index.len();

        let changed = {
            let mut published = self.published.lock();
            // A later scan may have published while this one was parsing.
            if seq > *published && self.index.load().fingerprint() != index.fingerprint() {
                self.index.store(Arc::new(index));
                *self.cache.lock() = cache;
                *published = seq;
                true
            } else {
                false
            }
        };

        if changed {
            log!("reload"; "{count} documents ({loaded_count} parsed, {removed} removed)");
        }

        Ok(self.finish(started, ReloadOutcome {
            changed,
            loaded: loaded_count,
            removed,
            documents: self.index.load().len(),
            ..ReloadOutcome::default()
        }))
    }

    fn finish(&self, started: Instant, mut outcome: ReloadOutcome) -> ReloadOutcome {
        outcome.elapsed = started.elapsed();
        if outcome.elapsed > self.reload_timeout {
            outcome.slow = true;
            log!("reload"; "scan took {:?}, over the {:?} bound", outcome.elapsed, self.reload_timeout);
        }
        outcome
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// The published snapshot. Hold it to get consistent views across calls.
    pub fn index(&self) -> Arc<Index> {
        self.index.load_full()
    }

    pub fn find_by_path(&self, path: &str) -> Option<Arc<Document>> {
        self.index.load().find_by_path(path).cloned()
    }

    pub fn posts(&self) -> Vec<Arc<Document>> {
        self.index.load().posts().to_vec()
    }

    pub fn pages(&self) -> Vec<Arc<Document>> {
        self.index.load().pages().to_vec()
    }

    pub fn recent_posts(&self, n: usize) -> Vec<Arc<Document>> {
        self.index.load().recent_posts(n).to_vec()
    }

    pub fn posts_for_month(&self, year: i32, month: u32) -> Vec<Arc<Document>> {
        self.index.load().posts_for_month(year, month).to_vec()
    }

    pub fn posts_for_category(&self, name: &str) -> Vec<Arc<Document>> {
        self.index.load().posts_for_category(name).to_vec()
    }

    pub fn posts_with_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<Arc<Document>> {
        self.index.load().posts_with_tags(tags)
    }

    pub fn archives(&self) -> Vec<Archive> {
        self.index.load().archives()
    }

    pub fn categories(&self) -> Vec<CategorySummary> {
        self.index.load().categories()
    }

    pub fn tags(&self) -> Vec<(String, usize)> {
        self.index.load().tags()
    }

    pub fn find_category(&self, slug: &str) -> Option<String> {
        self.index.load().find_category(slug).map(str::to_owned)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Write a new document and publish it.
    ///
    /// Fails with `WriteConflict` if the file or its identity already exists.
    pub fn create(&self, draft: &Draft) -> Result<Arc<Document>, ContentError> {
        let source = draft.source();
        let key = source.to_string_lossy().into_owned();
        let _guard = self
            .locks
            .try_acquire(key.clone())
            .ok_or_else(|| ContentError::conflict(&key, "another write is in progress"))?;

        if self.storage.exists(&source) {
            return Err(ContentError::conflict(&key, "file already exists"));
        }

        let text = draft.text(self.loader.markup.as_ref());
        let dir = self
            .loader
            .dir_of(&source)
            .ok_or_else(|| ContentError::parse(&source, "not inside a content directory"))?;
        let doc = Document::parse(
            dir,
            &source,
            &text,
            SystemTime::now(),
            Arc::clone(&self.loader.markup),
        )?;
        if let Some(existing) = self.index.load().find_by_path(doc.path()) {
            return Err(ContentError::conflict(
                doc.path(),
                format!("already defined by `{}`", existing.source().display()),
            ));
        }

        let message = format!("create {}", doc.path());
        self.storage
            .transaction(&message, &mut |s: &dyn Storage| s.write(&source, &text))?;

        self.reload()?;
        self.find_by_path(doc.path())
            .ok_or_else(|| ContentError::NotFound(doc.path().to_owned()))
    }

    /// Replace the source text of the document at `path`.
    ///
    /// With `expected_mtime`, the write only proceeds if the file has not
    /// changed since the caller read it. The new text must parse.
    pub fn update(
        &self,
        path: &str,
        text: &str,
        expected_mtime: Option<SystemTime>,
    ) -> Result<Arc<Document>, ContentError> {
        let doc = self
            .find_by_path(path)
            .ok_or_else(|| ContentError::NotFound(path.to_owned()))?;
        let source = doc.source().to_path_buf();
        let _guard = self
            .locks
            .try_acquire(source.to_string_lossy().into_owned())
            .ok_or_else(|| ContentError::conflict(path, "another write is in progress"))?;

        if let Some(expected) = expected_mtime {
            let current = self.storage.mtime(&source)?;
            if current != expected {
                return Err(ContentError::conflict(path, "document changed since it was read"));
            }
        }

        let dir = self
            .loader
            .dir_of(&source)
            .ok_or_else(|| ContentError::parse(&source, "not inside a content directory"))?;
        let updated = Document::parse(
            dir,
            &source,
            text,
            SystemTime::now(),
            Arc::clone(&self.loader.markup),
        )?;
        if updated.path() != doc.path()
            && let Some(existing) = self.index.load().find_by_path(updated.path())
        {
            return Err(ContentError::conflict(
                updated.path(),
                format!("already defined by `{}`", existing.source().display()),
            ));
        }

        let message = format!("update {path}");
        self.storage
            .transaction(&message, &mut |s: &dyn Storage| s.write(&source, text))?;

        self.reload()?;
        self.find_by_path(updated.path())
            .ok_or_else(|| ContentError::NotFound(updated.path().to_owned()))
    }

    /// Remove the document at `path`.
    pub fn delete(&self, path: &str) -> Result<(), ContentError> {
        let doc = self
            .find_by_path(path)
            .ok_or_else(|| ContentError::NotFound(path.to_owned()))?;
        let source = doc.source().to_path_buf();
        let _guard = self
            .locks
            .try_acquire(source.to_string_lossy().into_owned())
            .ok_or_else(|| ContentError::conflict(path, "another write is in progress"))?;

        let message = format!("delete {path}");
        self.storage
            .transaction(&message, &mut |s: &dyn Storage| s.remove(&source))?;

        self.reload()?;
        Ok(())
    }

    /// Whether a writer currently holds the source file of `path`.
    pub fn is_locked(&self, path: &str) -> bool {
        self.find_by_path(path)
            .is_some_and(|doc| self.locks.is_held(&doc.source().to_string_lossy()))
    }

    /// Counts per document type, for reporting.
    pub fn kinds(&self) -> BTreeMap<String, usize> {
        let mut kinds = BTreeMap::new();
        for doc in self.index.load().documents() {
            *kinds.entry(doc.kind().to_owned()).or_insert(0) += 1;
        }
        kinds
    }
}
