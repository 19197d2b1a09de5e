//! Immutable content index.
//!
//! An [`Index`] is built once per reload and never mutated afterwards, so
//! readers holding an `Arc<Index>` always see one consistent snapshot.
//!
//! # Views
//!
//! | View          | Order                                       |
//! |---------------|---------------------------------------------|
//! | posts         | date descending, ties by source path        |
//! | pages         | source path                                 |
//! | by category   | posts order, keyed by category name         |
//! | by tag        | posts order, keyed by tag                   |
//! | by month      | posts order, keyed by `(year, month)`       |
//! | by path       | identity path lookup                        |

use super::{document::Document, error::ContentError};
use crate::utils::{date::month_name, slug::urlify};
use chrono::Datelike;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Arc,
    time::SystemTime,
};

/// Sorted `(source path, mtime)` pairs the index was built from.
pub type Fingerprint = Vec<(PathBuf, SystemTime)>;

/// A category with its post count, for sidebars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySummary {
    pub name: String,
    pub slug: String,
    pub count: usize,
}

/// A month that has posts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Archive {
    pub year: i32,
    pub month: u32,
    pub month_name: &'static str,
    pub count: usize,
}

/// Derived views over one snapshot of the content.
#[derive(Debug, Default)]
pub struct Index {
    documents: Vec<Arc<Document>>,
    by_path: FxHashMap<String, Arc<Document>>,
    posts: Vec<Arc<Document>>,
    pages: Vec<Arc<Document>>,
    by_category: BTreeMap<String, Vec<Arc<Document>>>,
    by_tag: BTreeMap<String, Vec<Arc<Document>>>,
    by_month: BTreeMap<(i32, u32), Vec<Arc<Document>>>,
    fingerprint: Fingerprint,
}

impl Index {
    /// Build all views from documents in source path order.
    ///
    /// Fails if two documents share an identity path.
    pub fn build(
        documents: Vec<Arc<Document>>,
        fingerprint: Fingerprint,
    ) -> Result<Self, ContentError> {
        let mut by_path: FxHashMap<String, Arc<Document>> = FxHashMap::default();
        for doc in &documents {
            if let Some(first) = by_path.insert(doc.path().to_owned(), Arc::clone(doc)) {
                return Err(ContentError::DuplicatePath {
                    path: doc.path().to_owned(),
                    first: first.source().to_path_buf(),
                    second: doc.source().to_path_buf(),
                });
            }
        }

        // Stable sort keeps source path order among equal dates.
        let mut posts: Vec<_> = documents.iter().filter(|d| d.is_post()).cloned().collect();
        posts.sort_by(|a, b| b.date().cmp(&a.date()));

        let pages: Vec<_> = documents.iter().filter(|d| d.is_page()).cloned().collect();

        let mut by_category: BTreeMap<String, Vec<Arc<Document>>> = BTreeMap::new();
        let mut by_tag: BTreeMap<String, Vec<Arc<Document>>> = BTreeMap::new();
        let mut by_month: BTreeMap<(i32, u32), Vec<Arc<Document>>> = BTreeMap::new();

        for post in &posts {
            if let Some(category) = post.category() {
                by_category
                    .entry(category.to_owned())
                    .or_default()
                    .push(Arc::clone(post));
            }
            for tag in post.tags() {
                by_tag.entry(tag.clone()).or_default().push(Arc::clone(post));
            }
            if let Some(date) = post.date() {
                by_month
                    .entry((date.year(), date.month()))
                    .or_default()
                    .push(Arc::clone(post));
            }
        }

        Ok(Self {
            documents,
            by_path,
            posts,
            pages,
            by_category,
            by_tag,
            by_month,
            fingerprint,
        })
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// All documents in source path order.
    pub fn documents(&self) -> &[Arc<Document>] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Dated documents, newest first.
    pub fn posts(&self) -> &[Arc<Document>] {
        &self.posts
    }

    pub fn pages(&self) -> &[Arc<Document>] {
        &self.pages
    }

    pub fn find_by_path(&self, path: &str) -> Option<&Arc<Document>> {
        self.by_path.get(path.trim_matches('/'))
    }

    /// The newest `n` posts.
    pub fn recent_posts(&self, n: usize) -> &[Arc<Document>] {
        &self.posts[..n.min(self.posts.len())]
    }

    pub fn posts_for_category(&self, name: &str) -> &[Arc<Document>] {
        self.by_category.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Posts carrying any of `tags`, newest first, each post once.
    pub fn posts_with_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<Arc<Document>> {
        if let [tag] = tags {
            let tag: &str = tag.as_ref();
            return self.by_tag.get(tag).cloned().unwrap_or_default();
        }
        let wanted: FxHashSet<&str> = tags.iter().map(AsRef::as_ref).collect();
        self.posts
            .iter()
            .filter(|post| post.tags().iter().any(|t| wanted.contains(t.as_str())))
            .cloned()
            .collect()
    }

    pub fn posts_for_month(&self, year: i32, month: u32) -> &[Arc<Document>] {
        self.by_month.get(&(year, month)).map(Vec::as_slice).unwrap_or_default()
    }

    /// Category name whose slug is `slug`.
    pub fn find_category(&self, slug: &str) -> Option<&str> {
        self.by_category
            .keys()
            .find(|name| urlify(name) == slug || name.as_str() == slug)
            .map(String::as_str)
    }

    /// Categories with posts, alphabetical.
    pub fn categories(&self) -> Vec<CategorySummary> {
        self.by_category
            .iter()
            .map(|(name, posts)| CategorySummary {
                name: name.clone(),
                slug: urlify(name),
                count: posts.len(),
            })
            .collect()
    }

    /// Tags with their post counts, alphabetical.
    pub fn tags(&self) -> Vec<(String, usize)> {
        self.by_tag
            .iter()
            .map(|(tag, posts)| (tag.clone(), posts.len()))
            .collect()
    }

    /// Months with posts, newest first.
    pub fn archives(&self) -> Vec<Archive> {
        self.by_month
            .iter()
            .rev()
            .map(|(&(year, month), posts)| Archive {
                year,
                month,
                month_name: month_name(month).unwrap_or_default(),
                count: posts.len(),
            })
            .collect()
    }
}

/// Two indexes are equal when built from the same files with equal content.
impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
            && self.documents.len() == other.documents.len()
            && self
                .documents
                .iter()
                .zip(&other.documents)
                .all(|(a, b)| a == b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::markup::StandardMarkup;
    use std::{path::Path, time::UNIX_EPOCH};

    fn doc(source: &str, front: &str) -> Arc<Document> {
        let dir = source.split('/').next().unwrap();
        let text = format!("---\n{front}\n---\n\nBody of {source}\n");
        Arc::new(
            Document::parse(
                Path::new(dir),
                Path::new(source),
                &text,
                UNIX_EPOCH,
                Arc::new(StandardMarkup),
            )
            .unwrap(),
        )
    }

    fn paths(docs: &[Arc<Document>]) -> Vec<&str> {
        docs.iter().map(|d| d.path()).collect()
    }

    fn sample() -> Index {
        Index::build(
            vec![
                doc("pages/about.md", "title: About"),
                doc("posts/a.md", "date: 2008-09-01\ncategory: Ruby\ntags: ruby"),
                doc("posts/b.md", "date: 2008-10-10\ncategory: Ruby\ntags: ruby, rails"),
                doc("posts/c.md", "date: 2008-10-10\ncategory: Javascript\ntags: js"),
                doc("posts/d.md", "date: 2007-01-05\ncategory: Ruby Tips"),
            ],
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_posts_sorted_newest_first_stable() {
        let index = sample();
        assert_eq!(
            paths(index.posts()),
            ["2008/10/b", "2008/10/c", "2008/9/a", "2007/1/d"]
        );
    }

    #[test]
    fn test_pages_excluded_from_post_views() {
        let index = sample();
        assert_eq!(paths(index.pages()), ["about"]);
        assert!(index.posts().iter().all(|p| p.path() != "about"));
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_recent_posts() {
        let index = sample();
        assert_eq!(paths(index.recent_posts(2)), ["2008/10/b", "2008/10/c"]);
        assert_eq!(index.recent_posts(100).len(), 4);
    }

    #[test]
    fn test_posts_for_category() {
        let index = sample();
        assert_eq!(
            paths(index.posts_for_category("Ruby")),
            ["2008/10/b", "2008/9/a"]
        );
        assert!(index.posts_for_category("Haskell").is_empty());
    }

    #[test]
    fn test_posts_with_tags_any_of() {
        let index = sample();
        assert_eq!(paths(&index.posts_with_tags(&["rails"])), ["2008/10/b"]);
        assert_eq!(
            paths(&index.posts_with_tags(&["rails", "js", "ruby"])),
            ["2008/10/b", "2008/10/c", "2008/9/a"]
        );
        assert!(index.posts_with_tags::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_posts_for_month() {
        let index = sample();
        assert_eq!(
            paths(index.posts_for_month(2008, 10)),
            ["2008/10/b", "2008/10/c"]
        );
        assert!(index.posts_for_month(2008, 11).is_empty());
    }

    #[test]
    fn test_find_by_path() {
        let index = sample();
        assert_eq!(index.find_by_path("2008/9/a").unwrap().source(), Path::new("posts/a.md"));
        assert_eq!(index.find_by_path("/about/").unwrap().title(), "About");
        assert!(index.find_by_path("2008/09/a").is_none());
    }

    #[test]
    fn test_find_category_by_slug() {
        let index = sample();
        assert_eq!(index.find_category("ruby-tips"), Some("Ruby Tips"));
        assert_eq!(index.find_category("javascript"), Some("Javascript"));
        assert_eq!(index.find_category("Ruby"), Some("Ruby"));
        assert_eq!(index.find_category("perl"), None);
    }

    #[test]
    fn test_categories_and_tags() {
        let index = sample();
        let categories = index.categories();
        assert_eq!(categories.len(), 3);
        assert_eq!(categories[1].name, "Ruby");
        assert_eq!(categories[1].count, 2);
        assert_eq!(categories[2].slug, "ruby-tips");

        let tags = index.tags();
        assert_eq!(
            tags,
            vec![
                ("js".to_owned(), 1),
                ("rails".to_owned(), 1),
                ("ruby".to_owned(), 2)
            ]
        );
    }

    #[test]
    fn test_archives_newest_first() {
        let index = sample();
        let archives = index.archives();
        let months: Vec<_> = archives.iter().map(|a| (a.year, a.month, a.count)).collect();
        assert_eq!(months, [(2008, 10, 2), (2008, 9, 1), (2007, 1, 1)]);
        assert_eq!(archives[0].month_name, "October");
    }

    #[test]
    fn test_duplicate_identity_rejected() {
        let err = Index::build(
            vec![
                doc("posts/a.md", "date: 2008-10-10"),
                doc("posts/2008/a.md", "date: 2008-10-12"),
            ],
            Vec::new(),
        )
        .unwrap_err();
        match err {
            ContentError::DuplicatePath { path, first, second } => {
                assert_eq!(path, "2008/10/a");
                assert_eq!(first, PathBuf::from("posts/a.md"));
                assert_eq!(second, PathBuf::from("posts/2008/a.md"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
