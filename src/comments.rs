//! Post comments.
//!
//! Comments of one post live in `{comments.dir}/{post path}.jsonl`, one
//! JSON object per line in posting order, written through [`Storage`].

use crate::{
    content::{Storage, StorageError},
    utils::locks::PathLocks,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommentError {
    #[error("comment field `{0}` is required")]
    Missing(&'static str),

    #[error("comment file `{path}` has a bad line {line}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("comments of `{0}` are being written by another request")]
    Busy(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("cannot encode comment")]
    Encode(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub time: DateTime<Utc>,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website: String,
    pub text: String,
}

impl Comment {
    /// Build a comment from submitted form fields.
    ///
    /// `name` and `text` are required; a website without scheme gets
    /// `http://` prepended.
    pub fn from_params(params: &BTreeMap<String, String>, time: DateTime<Utc>) -> Result<Self, CommentError> {
        let field = |key: &str| params.get(key).map(|v| v.trim().to_owned()).unwrap_or_default();

        let name = field("name");
        if name.is_empty() {
            return Err(CommentError::Missing("name"));
        }
        let text = field("text");
        if text.is_empty() {
            return Err(CommentError::Missing("text"));
        }

        let mut website = field("website");
        if !website.is_empty() && !website.starts_with("http://") && !website.starts_with("https://") {
            website.insert_str(0, "http://");
        }

        Ok(Self {
            time,
            name,
            email: field("email"),
            website,
            text,
        })
    }
}

/// Where comments are kept.
pub trait CommentStore: Send + Sync {
    /// Comments of the post at `path`, oldest first. Empty if none.
    fn list(&self, path: &str) -> Result<Vec<Comment>, CommentError>;

    fn add(&self, path: &str, comment: &Comment) -> Result<(), CommentError>;
}

/// JSON-lines comment files.
pub struct FileComments {
    storage: Arc<dyn Storage>,
    dir: PathBuf,
    locks: PathLocks,
}

impl FileComments {
    pub fn new(storage: Arc<dyn Storage>, dir: impl Into<PathBuf>) -> Self {
        Self {
            storage,
            dir: dir.into(),
            locks: PathLocks::new(),
        }
    }

    fn file(&self, path: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", path.trim_matches('/')))
    }

    fn read(&self, file: &Path) -> Result<Vec<Comment>, CommentError> {
        let text = match self.storage.read(file) {
            Ok(text) => text,
            Err(err) if err.is_not_found() => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| CommentError::Corrupt {
                    path: file.to_path_buf(),
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }
}

impl CommentStore for FileComments {
    fn list(&self, path: &str) -> Result<Vec<Comment>, CommentError> {
        self.read(&self.file(path))
    }

    fn add(&self, path: &str, comment: &Comment) -> Result<(), CommentError> {
        let file = self.file(path);
        let _guard = self
            .locks
            .try_acquire(file.to_string_lossy().into_owned())
            .ok_or_else(|| CommentError::Busy(path.to_owned()))?;

        let mut text = match self.storage.read(&file) {
            Ok(text) => text,
            Err(err) if err.is_not_found() => String::new(),
            Err(err) => return Err(err.into()),
        };
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&serde_json::to_string(comment).map_err(CommentError::Encode)?);
        text.push('\n');

        let message = format!("comment on {path}");
        self.storage
            .transaction(&message, &mut |s: &dyn Storage| s.write(&file, &text))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryStorage;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    #[test]
    fn test_from_params() {
        let comment = Comment::from_params(
            &params(&[("name", " Ann "), ("text", "Nice post"), ("website", "example.com")]),
            at(0),
        )
        .unwrap();
        assert_eq!(comment.name, "Ann");
        assert_eq!(comment.website, "http://example.com");
        assert_eq!(comment.email, "");

        assert!(matches!(
            Comment::from_params(&params(&[("name", "Ann")]), at(0)),
            Err(CommentError::Missing("text"))
        ));
        assert!(matches!(
            Comment::from_params(&params(&[("text", "hi")]), at(0)),
            Err(CommentError::Missing("name"))
        ));
    }

    #[test]
    fn test_add_and_list_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let comments = FileComments::new(storage.clone(), "comments");
        assert!(comments.list("2008/10/new-post").unwrap().is_empty());

        for (i, name) in ["Ann", "Bob"].into_iter().enumerate() {
            let comment = Comment::from_params(&params(&[("name", name), ("text", "hi")]), at(i as i64)).unwrap();
            comments.add("2008/10/new-post", &comment).unwrap();
        }

        let listed = comments.list("2008/10/new-post").unwrap();
        let names: Vec<_> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Ann", "Bob"]);
        assert!(storage.exists(Path::new("comments/2008/10/new-post.jsonl")));
        assert!(comments.list("2008/10/other").unwrap().is_empty());
    }

    #[test]
    fn test_corrupt_line_reported() {
        let storage = Arc::new(MemoryStorage::new());
        storage.insert("comments/about.jsonl", "not json\n");
        let comments = FileComments::new(storage, "comments");
        let err = comments.list("about").unwrap_err();
        assert!(matches!(err, CommentError::Corrupt { line: 1, .. }));
    }
}
