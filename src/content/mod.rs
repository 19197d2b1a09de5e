//! Content layer: documents, their index and the store that keeps it fresh.
//!
//! # Modules
//!
//! | Module        | Purpose                                           |
//! |---------------|---------------------------------------------------|
//! | `storage`     | `Storage` trait, filesystem and in-memory backends |
//! | `markup`      | `Markup` trait, Markdown / HTML / Textile          |
//! | `frontmatter` | YAML front matter and `Metadata`                   |
//! | `document`    | `Document`: identity, title, lazy HTML             |
//! | `loader`      | `Loader` trait and mtime-validated cache           |
//! | `index`       | immutable `Index` snapshot and its views           |
//! | `store`       | `ContentStore`: reload, reads, mutations           |

mod document;
mod error;
pub mod frontmatter;
mod index;
pub mod loader;
pub mod markup;
pub mod storage;
mod store;

pub use document::Document;
pub use error::ContentError;
pub use frontmatter::Metadata;
pub use index::{Archive, CategorySummary, Fingerprint, Index};
pub use markup::{Markup, StandardMarkup};
pub use storage::{FsStorage, MemoryStorage, Storage, StorageError};
pub use store::{ContentStore, DocumentLoader, Draft, ReloadOutcome};
