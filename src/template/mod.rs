//! Template cache and layout-aware rendering.
//!
//! Templates are ERB-flavoured text files under `[templates].dir`, named by
//! their relative path (`post.html`, `_comments.html`).
//!
//! # Render Flow
//!
//! ```text
//! render("post.html", vars)
//!     │
//!     ├── handle("post.html")       compile or reuse (TemplateMode)
//!     ├── Renderer::render          vars + helpers + include()
//!     │
//!     └── not a partial, layout on?
//!             └── render(layout, vars + { content })
//! ```
//!
//! # Staleness
//!
//! | Mode          | Recompiles when                    |
//! |---------------|------------------------------------|
//! | `Development` | the source mtime differs           |
//! | `Production`  | never, after the first compile     |

mod error;
pub mod helpers;
mod parser;
mod render;

pub use error::TemplateError;
pub use helpers::{Builtins, HelperSet, Val};
pub use render::{Renderer, Scope, Template};

use crate::{
    config::{TemplateMode, TemplatesConfig},
    content::{
        Storage, StorageError,
        loader::{Cached, Loader, MtimeCache},
    },
    log,
};
use educe::Educe;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

/// Variables passed to a render.
pub type Vars = Map<String, Value>;

/// A compiled template with the source mtime it was compiled from.
pub type TemplateHandle = Cached<Arc<Template>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Educe)]
#[educe(Default)]
pub struct RenderOptions {
    /// Wrap the output in the configured layout.
    #[educe(Default = true)]
    pub layout: bool,
}

impl RenderOptions {
    pub fn without_layout() -> Self {
        Self { layout: false }
    }
}

fn storage_error(name: &str, err: StorageError) -> TemplateError {
    if err.is_not_found() {
        return TemplateError::NotFound {
            name: name.to_owned(),
            origin: None,
        };
    }
    TemplateError::Io {
        name: name.to_owned(),
        source: err,
    }
}

/// Reads and compiles templates from storage.
pub struct TemplateLoader {
    storage: Arc<dyn Storage>,
}

impl Loader for TemplateLoader {
    type Item = Arc<Template>;
    type Error = TemplateError;

    fn load(&self, key: &Path) -> Result<Arc<Template>, TemplateError> {
        let name = key.to_string_lossy();
        let source = self.storage.read(key).map_err(|err| storage_error(&name, err))?;
        Template::compile(&name, &source).map(Arc::new)
    }
}

pub struct TemplateCache {
    loader: TemplateLoader,
    handles: RwLock<MtimeCache<Arc<Template>>>,
    mode: TemplateMode,
    layout: String,
    helpers: Vec<Arc<dyn HelperSet>>,
    compiles: AtomicUsize,
}

impl TemplateCache {
    /// `storage` is rooted at the template directory.
    pub fn new(storage: Arc<dyn Storage>, config: &TemplatesConfig) -> Self {
        Self {
            loader: TemplateLoader { storage },
            handles: RwLock::new(MtimeCache::new()),
            mode: config.mode,
            layout: config.layout.clone(),
            helpers: Vec::new(),
            compiles: AtomicUsize::new(0),
        }
    }

    /// Install a helper set; earlier sets shadow later ones and the builtins.
    pub fn with_helpers(mut self, set: impl HelperSet + 'static) -> Self {
        self.helpers.push(Arc::new(set));
        self
    }

    pub fn mode(&self) -> TemplateMode {
        self.mode
    }

    pub fn layout(&self) -> &str {
        &self.layout
    }

    /// Number of compiles performed so far.
    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    pub(crate) fn helper_sets(&self) -> impl Iterator<Item = &Arc<dyn HelperSet>> {
        self.helpers.iter()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.loader.storage.exists(Path::new(name))
    }

    /// The compiled template `name`, compiling it if missing or stale.
    ///
    /// Fresh handles are served under the read lock. A failed compile
    /// leaves the previous handle in place.
    pub fn handle(&self, name: &str) -> Result<TemplateHandle, TemplateError> {
        let key = Path::new(name);

        if self.mode == TemplateMode::Production
            && let Some(cached) = self.handles.read().get(key)
        {
            return Ok(cached.clone());
        }

        let mtime = self
            .loader
            .storage
            .mtime(key)
            .map_err(|err| storage_error(name, err))?;
        if let Some(cached) = self.handles.read().get(key)
            && cached.mtime == mtime
        {
            return Ok(cached.clone());
        }

        let mut handles = self.handles.write();
        // Another thread won the first compile; production keeps one handle.
        if self.mode == TemplateMode::Production
            && let Some(cached) = handles.get(key)
        {
            return Ok(cached.clone());
        }
        let recompiled = handles.get(key).is_some();
        let (item, compiled) = handles.load_if_stale(&self.loader, key, mtime)?;
        drop(handles);

        if compiled {
            self.compiles.fetch_add(1, Ordering::Relaxed);
            if recompiled {
                log!("render"; "recompiled {name}");
            }
        }
        Ok(Cached { item, mtime })
    }

    /// Render `name` with `vars`, wrapped in the layout unless `name` is a
    /// partial or `options.layout` is off.
    pub fn render(&self, name: &str, vars: &Vars, options: RenderOptions) -> Result<String, TemplateError> {
        let template = self.handle(name)?.item;
        let mut renderer = Renderer::new(self, vars.clone());
        let content = renderer.render(&template)?;

        if !options.layout || template.is_partial() {
            return Ok(content);
        }

        let layout = self.handle(&self.layout)?.item;
        let mut frame = Map::new();
        frame.insert("content".into(), Value::String(content));
        renderer.scope_mut().push(frame);
        renderer.render(&layout)
    }
}
