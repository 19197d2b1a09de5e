//! Per-request pipeline: refresh content, route, handle, render.
//!
//! # Phases
//!
//! ```text
//! Idle ─► Reloading ─► Routing ─► Handling ─► Rendering ─► Responding ─► Idle
//!             │            │          │            │
//!             │            │          │            └─ TemplateError  → 500
//!             │            │          └─ Outcome::NotFound           → 404
//!             │            └─ no route                               → 404
//!             └─ ContentError → logged, stale index keeps serving
//! ```
//!
//! Every failure is logged with the phase it happened in.

mod handlers;

use crate::{
    comments::{CommentError, CommentStore, FileComments},
    config::{SiteConfig, cfg},
    content::{ContentError, ContentStore, FsStorage, Index, StandardMarkup, Storage},
    log,
    router::{Constraints, Method, Params, Router, RouterError},
    template::{HelperSet, RenderOptions, TemplateCache, TemplateError, Val, Vars},
};
use serde_json::{Value, json};
use std::{collections::BTreeMap, fmt, sync::Arc};
use thiserror::Error;

// ============================================================================
// Request / Response
// ============================================================================

/// An HTTP request as the dispatcher sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    /// Decoded path, starting with `/`.
    pub path: String,
    /// Query and form parameters.
    pub params: BTreeMap<String, String>,
}

impl Request {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Trailing `.ext` of the last path segment, e.g. `rss` for `/index.rss`.
    pub fn format(&self) -> Option<&str> {
        let last = self.path.rsplit('/').next()?;
        last.rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, content_type: &str, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), content_type.into())],
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, "text/plain; charset=utf-8", body)
    }

    pub fn redirect(location: &str) -> Self {
        let mut response = Self::text(302, format!("Redirecting to {location}"));
        response.headers.push(("Location".into(), location.into()));
        response
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Content type for a request format.
pub fn content_type(format: Option<&str>) -> &'static str {
    match format {
        Some("rss") => "application/rss+xml; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("json") => "application/json",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "text/html; charset=utf-8",
    }
}

// ============================================================================
// Phases and Errors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Reloading,
    Routing,
    Handling,
    Rendering,
    Responding,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Reloading => "reloading",
            Self::Routing => "routing",
            Self::Handling => "handling",
            Self::Rendering => "rendering",
            Self::Responding => "responding",
        })
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("content reload failed")]
    Reload(#[source] ContentError),

    #[error("comment failed")]
    Comment(#[from] CommentError),

    #[error("{0}")]
    Handler(String),

    #[error("render failed")]
    Render(#[from] TemplateError),
}

impl DispatchError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Reload(_) => Phase::Reloading,
            Self::Comment(_) | Self::Handler(_) => Phase::Handling,
            Self::Render(_) => Phase::Rendering,
        }
    }
}

/// What a handler decided.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Render {
        template: String,
        vars: Vars,
        options: RenderOptions,
    },
    Redirect(String),
    NotFound,
    /// The request itself is wrong (400).
    Invalid(String),
}

impl Outcome {
    pub fn render(template: &str, vars: Value) -> Self {
        Self::Render {
            template: template.to_owned(),
            vars: into_vars(vars),
            options: RenderOptions::default(),
        }
    }

    pub fn partial(template: &str, vars: Value) -> Self {
        Self::Render {
            template: template.to_owned(),
            vars: into_vars(vars),
            options: RenderOptions::without_layout(),
        }
    }
}

fn into_vars(value: Value) -> Vars {
    match value {
        Value::Object(map) => map,
        _ => Vars::new(),
    }
}

/// What a handler sees of the world.
pub struct Context<'a> {
    /// The snapshot this whole request reads from.
    pub index: &'a Index,
    pub comments: &'a dyn CommentStore,
    pub config: &'a SiteConfig,
    pub request: &'a Request,
}

pub type Handler = fn(&Context<'_>, &Params) -> Result<Outcome, DispatchError>;

// ============================================================================
// Reverse Routing Helper
// ============================================================================

/// `path(name, args...)` in templates.
struct PathHelper {
    router: Arc<Router<Handler>>,
}

impl HelperSet for PathHelper {
    fn call(&self, name: &str, args: &[Val]) -> Option<Result<Val, String>> {
        if name != "path" {
            return None;
        }
        let Some((route, rest)) = args.split_first() else {
            return Some(Err("`path` needs a route name".into()));
        };
        let rest: Vec<String> = rest.iter().map(Val::display).collect();
        Some(
            self.router
                .generate(&route.display(), &rest)
                .map(Val::text)
                .map_err(|err| err.to_string()),
        )
    }
}

/// The blog's routing table, in match order.
pub fn routes() -> Result<Router<Handler>, RouterError> {
    let mut router: Router<Handler> = Router::new();
    router
        .route(
            "index_feed",
            "/index.rss",
            Constraints::new().method(Method::Get).format("rss"),
            handlers::index_feed,
        )?
        .get("index", "/", handlers::index)?
        .get("post", r"/(\d+)/(\d+)/:slug", handlers::post)?
        .get("archive", r"/(\d+)/(\d+)", handlers::archive)?
        .route(
            "category_feed",
            "/categories/:name",
            Constraints::new().method(Method::Get).format("rss"),
            handlers::category_feed,
        )?
        .get("category", "/categories/:name", handlers::category)?
        .get("tag", "/tags/:name", handlers::tag)?
        .post("comments", "/comments", handlers::comments)?
        .get("page", "/*path", handlers::page)?;
    Ok(router)
}

// ============================================================================
// Dispatcher
// ============================================================================

pub struct Dispatcher {
    store: Arc<ContentStore>,
    templates: TemplateCache,
    router: Arc<Router<Handler>>,
    comments: Arc<dyn CommentStore>,
    config: fn() -> Arc<SiteConfig>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<ContentStore>,
        templates: TemplateCache,
        comments: Arc<dyn CommentStore>,
    ) -> Result<Self, RouterError> {
        let router = Arc::new(routes()?);
        let templates = templates.with_helpers(PathHelper {
            router: Arc::clone(&router),
        });
        Ok(Self {
            store,
            templates,
            router,
            comments,
            config: cfg,
        })
    }

    /// Wire storage, markup, templates and comments from `config`.
    pub fn from_config(config: &SiteConfig) -> anyhow::Result<Self> {
        let root = config.get_root();
        let content: Arc<dyn Storage> = Arc::new(FsStorage::new(root));
        let templates: Arc<dyn Storage> = Arc::new(FsStorage::new(root.join(&config.templates.dir)));

        let store = Arc::new(ContentStore::new(
            Arc::clone(&content),
            Arc::new(StandardMarkup),
            &config.content,
        ));
        let templates = TemplateCache::new(templates, &config.templates);
        let comments = Arc::new(FileComments::new(content, &config.comments.dir));
        Ok(Self::new(store, templates, comments)?)
    }

    /// Read the site config through `source` instead of the global handle.
    pub fn with_config(mut self, source: fn() -> Arc<SiteConfig>) -> Self {
        self.config = source;
        self
    }

    pub fn store(&self) -> &Arc<ContentStore> {
        &self.store
    }

    pub fn templates(&self) -> &TemplateCache {
        &self.templates
    }

    pub fn router(&self) -> &Router<Handler> {
        &self.router
    }

    pub fn dispatch(&self, request: &Request) -> Response {
        let config = (self.config)();

        // Reloading
        if let Err(err) = self.store.reload() {
            self.fail(request, &DispatchError::Reload(err));
        }

        let index = self.store.index();

        // Routing
        let format = request.format();
        let Some(found) = self.router.find(request.method, &request.path, format) else {
            return self.not_found(request, &index, &config);
        };
        // Only routes that declare their formats answer in them.
        let format = format.filter(|_| !found.constraints.formats().is_empty());

        // Handling
        let ctx = Context {
            index: &index,
            comments: self.comments.as_ref(),
            config: &config,
            request,
        };
        let outcome = match (found.handler)(&ctx, &found.params) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.fail(request, &err);
                return Response::text(500, "Internal Server Error");
            }
        };

        // Rendering
        let response = match outcome {
            Outcome::Render { template, vars, options } => {
                let mut all = self.base_vars(request, &index, &config);
                all.extend(vars);
                match self.templates.render(&template, &all, options) {
                    Ok(body) => Response::new(200, content_type(format), body),
                    Err(err) => {
                        self.fail(request, &DispatchError::Render(err));
                        Response::text(500, "Internal Server Error")
                    }
                }
            }
            Outcome::Redirect(location) => Response::redirect(&location),
            Outcome::NotFound => self.not_found(request, &index, &config),
            Outcome::Invalid(reason) => Response::text(400, reason),
        };

        // Responding
        self.finish(request, response)
    }

    fn finish(&self, request: &Request, mut response: Response) -> Response {
        if request.method == Method::Head {
            response.body.clear();
        }
        response
    }

    fn fail(&self, request: &Request, err: &DispatchError) {
        let mut message = err.to_string();
        let mut source = std::error::Error::source(err);
        while let Some(cause) = source {
            message.push_str(&format!(": {cause}"));
            source = cause.source();
        }
        log!("error"; "{} {} [{}] {message}", request.method, request.path, err.phase());
    }

    /// 404 from `404.html` when the site has one, plain text otherwise.
    fn not_found(&self, request: &Request, index: &Index, config: &SiteConfig) -> Response {
        if self.templates.exists("404.html") {
            let mut vars = self.base_vars(request, index, config);
            vars.insert("path".into(), json!(request.path));
            match self.templates.render("404.html", &vars, RenderOptions::default()) {
                Ok(body) => return self.finish(request, Response::new(404, content_type(None), body)),
                Err(err) => self.fail(request, &DispatchError::Render(err)),
            }
        }
        self.finish(request, Response::text(404, format!("Not found: {}", request.path)))
    }

    /// Variables every template sees.
    fn base_vars(&self, request: &Request, index: &Index, config: &SiteConfig) -> Vars {
        let base = &config.base;
        let extra = serde_json::to_value(&config.extra).unwrap_or(Value::Null);
        let recent: Vec<Value> = index
            .recent_posts(config.content.recent)
            .iter()
            .map(|doc| doc.to_value())
            .collect();

        into_vars(json!({
            "site": {
                "title": base.title,
                "description": base.description,
                "author": base.author,
                "url": base.url.as_deref().unwrap_or_default(),
                "language": base.language,
                "categories": base.categories,
                "extra": extra,
            },
            "categories": index.categories(),
            "archives": index.archives(),
            "recent": recent,
            "request_path": request.path,
            "format": request.format(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::MemoryStorage;

    fn site() -> Arc<SiteConfig> {
        Arc::new(SiteConfig::from_str("[base]\ntitle = \"Test Blog\"").unwrap())
    }

    fn site_without_comments() -> Arc<SiteConfig> {
        let mut config = SiteConfig::from_str("[base]\ntitle = \"Test Blog\"").unwrap();
        config.comments.enable = false;
        Arc::new(config)
    }

    fn post(date: &str, category: &str, tags: &str, title: &str) -> String {
        format!("---\ndate: {date}\ncategory: {category}\ntags: {tags}\n---\n\n# {title}\n\nBody of {title}.\n")
    }

    fn content() -> Arc<MemoryStorage> {
        Arc::new(
            MemoryStorage::new()
                .with_file("posts/2008/10/first.md", post("2008-10-10", "Ruby", "ruby", "First"))
                .with_file("posts/2008/10/second.md", post("2008-10-11", "Ruby", "ruby, rails", "Second"))
                .with_file("posts/2008/11/third.md", post("2008-11-10", "Javascript", "js", "Third"))
                .with_file("pages/about.md", "# About\n\nWho I am.\n"),
        )
    }

    fn templates() -> Arc<MemoryStorage> {
        Arc::new(
            MemoryStorage::new()
                .with_file("layout.html", "<title><%= site.title %></title><%== content %>")
                .with_file("index.html", "<% for post in posts %><%= post_link(post) %>;<% end %>")
                .with_file(
                    "post.html",
                    "<h1><%= post.title %></h1><%= len(comments) %> comments <%= path('category', urlify(post.category)) %>",
                )
                .with_file("archive.html", "<%= month_name %> <%= year %>: <%= len(posts) %>")
                .with_file(
                    "category.html",
                    "<%= name %>: <% for post in posts %><%= post.title %>,<% end %>",
                )
                .with_file(
                    "feed.xml",
                    "<rss><% for post in posts %><item><%= post.title %>|<%= rfc822(post.date) %></item><% end %></rss>",
                )
                .with_file("page.html", "<%= page.title %>")
                .with_file(
                    "_comments.html",
                    "<% for c in comments %><p><%= c.name %>: <%= c.text %></p><% end %>",
                ),
        )
    }

    struct Fixture {
        content: Arc<MemoryStorage>,
        templates: Arc<MemoryStorage>,
        dispatcher: Dispatcher,
    }

    fn fixture_with(config: fn() -> Arc<SiteConfig>) -> Fixture {
        let content = content();
        let templates = templates();
        let store = Arc::new(ContentStore::new(
            content.clone(),
            Arc::new(StandardMarkup),
            &config().content,
        ));
        let cache = TemplateCache::new(templates.clone(), &config().templates);
        let comments = Arc::new(FileComments::new(content.clone(), "comments"));
        let dispatcher = Dispatcher::new(store, cache, comments)
            .unwrap()
            .with_config(config);
        Fixture {
            content,
            templates,
            dispatcher,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(site)
    }

    fn get(fixture: &Fixture, path: &str) -> Response {
        fixture.dispatcher.dispatch(&Request::get(path))
    }

    #[test]
    fn test_index_with_layout() {
        let fixture = fixture();
        let response = get(&fixture, "/");
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(
            response.body,
            concat!(
                "<title>Test Blog</title>",
                r#"<a href="/2008/11/third">Third</a>;"#,
                r#"<a href="/2008/10/second">Second</a>;"#,
                r#"<a href="/2008/10/first">First</a>;"#,
            )
        );
    }

    #[test]
    fn test_index_feed_without_layout() {
        let fixture = fixture();
        let response = get(&fixture, "/index.rss");
        assert_eq!(response.status, 200);
        assert_eq!(response.header("Content-Type"), Some("application/rss+xml; charset=utf-8"));
        assert!(response.body.starts_with("<rss><item>Third|Mon, 10 Nov 2008 00:00:00 +0000</item>"));
        assert!(!response.body.contains("<title>"));
    }

    #[test]
    fn test_post_with_reverse_route() {
        let fixture = fixture();
        let response = get(&fixture, "/2008/10/first");
        assert_eq!(response.status, 200);
        assert_eq!(
            response.body,
            "<title>Test Blog</title><h1>First</h1>0 comments /categories/ruby"
        );

        // zero-padded month and a format suffix resolve to the same post
        assert_eq!(get(&fixture, "/2008/010/first.html").status, 200);
    }

    #[test]
    fn test_unknown_post_is_404() {
        let fixture = fixture();
        let response = get(&fixture, "/2008/10/missing");
        assert_eq!(response.status, 404);
        assert!(response.body.contains("/2008/10/missing"));
    }

    #[test]
    fn test_not_found_template() {
        let fixture = fixture();
        fixture.templates.insert("404.html", "gone: <%= path %>");
        let response = get(&fixture, "/nowhere");
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "<title>Test Blog</title>gone: /nowhere");
    }

    #[test]
    fn test_archive() {
        let fixture = fixture();
        assert_eq!(get(&fixture, "/2008/10").body, "<title>Test Blog</title>October 2008: 2");
        assert_eq!(get(&fixture, "/2008/13").status, 404);
    }

    #[test]
    fn test_category_and_feed() {
        let fixture = fixture();
        assert_eq!(
            get(&fixture, "/categories/ruby").body,
            "<title>Test Blog</title>Ruby: Second,First,"
        );

        let feed = get(&fixture, "/categories/ruby.rss");
        assert_eq!(feed.header("content-type"), Some("application/rss+xml; charset=utf-8"));
        assert!(feed.body.starts_with("<rss><item>Second|"));

        assert_eq!(get(&fixture, "/categories/cobol").status, 404);
    }

    #[test]
    fn test_tag() {
        let fixture = fixture();
        assert_eq!(
            get(&fixture, "/tags/rails").body,
            "<title>Test Blog</title>Tag: rails: Second,"
        );
        assert_eq!(get(&fixture, "/tags/none").status, 404);
    }

    #[test]
    fn test_page() {
        let fixture = fixture();
        assert_eq!(get(&fixture, "/about").body, "<title>Test Blog</title>About");
    }

    #[test]
    fn test_head_has_no_body() {
        let fixture = fixture();
        let response = fixture.dispatcher.dispatch(&Request::new(Method::Head, "/about"));
        assert_eq!(response.status, 200);
        assert!(response.body.is_empty());
    }

    #[test]
    fn test_render_failure_is_500() {
        let fixture = fixture();
        fixture.templates.insert("page.html", "<% if page %>unclosed");
        assert_eq!(get(&fixture, "/about").status, 500);
        // other routes keep working
        assert_eq!(get(&fixture, "/2008/10").status, 200);
    }

    #[test]
    fn test_reload_failure_serves_stale_index() {
        let fixture = fixture();
        assert_eq!(get(&fixture, "/about").status, 200);

        fixture
            .content
            .insert("pages/broken.md", "---\ndate: not-a-date\n---\n\nOops\n");
        fixture.content.insert("pages/about.md", "# About me\n\nUpdated.\n");

        let response = get(&fixture, "/about");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "<title>Test Blog</title>About");
    }

    #[test]
    fn test_content_changes_picked_up_per_request() {
        let fixture = fixture();
        assert_eq!(get(&fixture, "/contact").status, 404);
        fixture.content.insert("pages/contact.md", "# Contact\n\nMail me.\n");
        assert_eq!(get(&fixture, "/contact").body, "<title>Test Blog</title>Contact");
    }

    #[test]
    fn test_post_comment_and_preview() {
        let fixture = fixture();
        let comment = |preview: &str| {
            Request::new(Method::Post, "/comments")
                .with_param("path", "2008/10/first")
                .with_param("name", "Ann")
                .with_param("text", "<b>Nice</b>")
                .with_param("preview", preview)
        };

        let preview = fixture.dispatcher.dispatch(&comment("1"));
        assert_eq!(preview.status, 200);
        assert_eq!(preview.body, "<p>Ann: &lt;b&gt;Nice&lt;/b&gt;</p>");
        assert!(get(&fixture, "/2008/10/first").body.contains("0 comments"));

        let stored = fixture.dispatcher.dispatch(&comment(""));
        assert_eq!(stored.status, 200);
        assert!(get(&fixture, "/2008/10/first").body.contains("1 comments"));

        let invalid = fixture.dispatcher.dispatch(
            &Request::new(Method::Post, "/comments").with_param("path", "2008/10/first"),
        );
        assert_eq!(invalid.status, 400);

        let unknown = fixture.dispatcher.dispatch(
            &Request::new(Method::Post, "/comments")
                .with_param("path", "2008/10/missing")
                .with_param("name", "Ann")
                .with_param("text", "hi"),
        );
        assert_eq!(unknown.status, 404);
    }

    #[test]
    fn test_comments_disabled() {
        let fixture = fixture_with(site_without_comments);
        let response = fixture.dispatcher.dispatch(
            &Request::new(Method::Post, "/comments")
                .with_param("path", "2008/10/first")
                .with_param("name", "Ann")
                .with_param("text", "hi"),
        );
        assert_eq!(response.status, 404);
    }

    #[test]
    fn test_unconstrained_route_ignores_suffix_format() {
        let fixture = fixture();
        let response = get(&fixture, "/about.json");
        assert_eq!(response.status, 200);
        assert_eq!(response.header("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(response.body, "<title>Test Blog</title>About");
    }

    #[test]
    fn test_request_reads_one_snapshot_across_reloads() {
        let fixture = fixture();
        let store = Arc::clone(fixture.dispatcher.store());
        store.reload().unwrap();

        let config = site();
        let request = Request::get("/categories/javascript");
        let index = store.index();
        let found = fixture
            .dispatcher
            .router()
            .find(Method::Get, &request.path, None)
            .unwrap();
        let ctx = Context {
            index: &index,
            comments: fixture.dispatcher.comments.as_ref(),
            config: &config,
            request: &request,
        };

        // Another thread publishes an index without the category mid-request.
        let writer = {
            let content = Arc::clone(&fixture.content);
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                content
                    .remove(std::path::Path::new("posts/2008/11/third.md"))
                    .unwrap();
                store.reload().unwrap();
            })
        };
        writer.join().unwrap();
        assert!(store.find_category("javascript").is_none());

        let Outcome::Render { vars, .. } = (found.handler)(&ctx, &found.params).unwrap() else {
            panic!("category should render from the snapshot");
        };
        assert_eq!(vars["name"], "Javascript");
        assert_eq!(vars["posts"].as_array().unwrap().len(), 1);

        let base = fixture.dispatcher.base_vars(&request, &index, &config);
        assert_eq!(base["categories"].as_array().unwrap().len(), 2);
        assert_eq!(base["recent"].as_array().unwrap().len(), 3);

        // The next request sees the new index throughout.
        assert_eq!(get(&fixture, "/categories/javascript").status, 404);
    }

    #[test]
    fn test_request_format() {
        assert_eq!(Request::get("/index.rss").format(), Some("rss"));
        assert_eq!(Request::get("/categories/ruby").format(), None);
        assert_eq!(Request::get("/a.b/c").format(), None);
        assert_eq!(Request::get("/trailing.").format(), None);
    }

    #[test]
    fn test_error_phases() {
        assert_eq!(
            DispatchError::Handler("boom".into()).phase(),
            Phase::Handling
        );
        let err = DispatchError::Render(TemplateError::NotFound {
            name: "x".into(),
            origin: None,
        });
        assert_eq!(err.phase(), Phase::Rendering);
        assert_eq!(Phase::Reloading.to_string(), "reloading");
    }
}
