//! Bidirectional URL routing.
//!
//! A [`Router`] is an ordered list of named routes. The same table serves
//! both directions:
//!
//! - [`Router::find`]: request → route, first match in registration order
//! - [`Router::generate`]: route name + arguments → URL
//!
//! Routes can mount a child router under a prefix; the child's routes are
//! then addressed as `mount.child` for generation.
//!
//! ```ignore
//! let mut router = Router::new();
//! router
//!     .get("post", r"/(\d+)/(\d+)/:slug", handler)?
//!     .get("page", "/*path", handler)?;
//!
//! let m = router.find(Method::Get, "/2008/10/new-post", None).unwrap();
//! assert_eq!(m.params.get("slug"), Some("new-post"));
//! assert_eq!(router.generate("post", &["2008", "10", "new-post"])?, "/2008/10/new-post");
//! ```

mod pattern;

pub use pattern::{Anchor, Pattern};

use rustc_hash::FxHashMap;
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Routing table errors. A request that matches nothing is `None` from
/// [`Router::find`], not an error.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouterError {
    #[error("route `{0}` is already registered")]
    DuplicateName(String),

    #[error("invalid route pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("no route named `{0}`")]
    UnknownRoute(String),

    #[error("route `{name}` takes {expected} arguments, got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
}

// ============================================================================
// Request Attributes
// ============================================================================

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "HEAD" => Ok(Self::Head),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "PATCH" => Ok(Self::Patch),
            "DELETE" => Ok(Self::Delete),
            "OPTIONS" => Ok(Self::Options),
            other => Err(format!("unsupported method `{other}`")),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Options => "OPTIONS",
        })
    }
}

/// Extra conditions a structurally matching request must meet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Constraints {
    method: Option<Method>,
    formats: Vec<String>,
}

impl Constraints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require this method. `Get` also admits `Head`.
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Require this format suffix; may be given several times.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.formats.push(format.into());
        self
    }

    /// Formats this route answers in; empty when any format is accepted.
    pub fn formats(&self) -> &[String] {
        &self.formats
    }

    pub fn accepts(&self, method: Method, format: Option<&str>) -> bool {
        let method_ok = match self.method {
            None => true,
            Some(Method::Get) => matches!(method, Method::Get | Method::Head),
            Some(required) => required == method,
        };
        let format_ok = self.formats.is_empty()
            || format.is_some_and(|f| self.formats.iter().any(|allowed| allowed == f));
        method_ok && format_ok
    }
}

/// Captured parameters in capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(String, String)>);

impl Params {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Value by capture position.
    pub fn at(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(|(_, value)| value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn push(&mut self, name: String, value: String) {
        self.0.push((name, value));
    }

    fn extend(&mut self, other: Self) {
        self.0.extend(other.0);
    }
}

// ============================================================================
// Routes
// ============================================================================

/// What a route leads to.
#[derive(Debug)]
pub enum Target<H> {
    Endpoint(H),
    Mount(Router<H>),
}

/// One immutable routing table entry.
#[derive(Debug)]
pub struct Route<H> {
    name: String,
    pattern: Pattern,
    constraints: Constraints,
    target: Target<H>,
}

impl<H> Route<H> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn target(&self) -> &Target<H> {
        &self.target
    }
}

/// A successful [`Router::find`].
#[derive(Debug)]
pub struct RouteMatch<'r, H> {
    /// Route name; dotted for routes inside mounts.
    pub name: String,
    pub handler: &'r H,
    pub params: Params,
    /// Constraints of the endpoint route that matched.
    pub constraints: &'r Constraints,
}

/// Ordered, named routing table.
#[derive(Debug)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
    names: FxHashMap<String, usize>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            names: FxHashMap::default(),
        }
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(
        &mut self,
        name: String,
        pattern: Pattern,
        constraints: Constraints,
        target: Target<H>,
    ) -> Result<&mut Self, RouterError> {
        if self.names.contains_key(&name) {
            return Err(RouterError::DuplicateName(name));
        }
        self.names.insert(name.clone(), self.routes.len());
        self.routes.push(Route {
            name,
            pattern,
            constraints,
            target,
        });
        Ok(self)
    }

    /// Append an endpoint route.
    pub fn route(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        constraints: Constraints,
        handler: H,
    ) -> Result<&mut Self, RouterError> {
        let pattern = Pattern::compile(pattern, Anchor::Full)?;
        self.push(name.into(), pattern, constraints, Target::Endpoint(handler))
    }

    pub fn get(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, RouterError> {
        self.route(name, pattern, Constraints::new().method(Method::Get), handler)
    }

    pub fn post(
        &mut self,
        name: impl Into<String>,
        pattern: &str,
        handler: H,
    ) -> Result<&mut Self, RouterError> {
        self.route(name, pattern, Constraints::new().method(Method::Post), handler)
    }

    /// Delegate every path under `prefix` to `router`.
    pub fn mount(
        &mut self,
        name: impl Into<String>,
        prefix: &str,
        router: Router<H>,
    ) -> Result<&mut Self, RouterError> {
        let pattern = Pattern::compile(prefix, Anchor::Prefix)?;
        self.push(name.into(), pattern, Constraints::new(), Target::Mount(router))
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route<H>> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// First route, in registration order, that matches `path` and whose
    /// constraints accept `method` and `format`.
    pub fn find(&self, method: Method, path: &str, format: Option<&str>) -> Option<RouteMatch<'_, H>> {
        for route in &self.routes {
            let Some((params, end)) = route.pattern.captures(path) else {
                continue;
            };
            if !route.constraints.accepts(method, format) {
                continue;
            }

            match &route.target {
                Target::Endpoint(handler) => {
                    return Some(RouteMatch {
                        name: route.name.clone(),
                        handler,
                        params,
                        constraints: &route.constraints,
                    });
                }
                Target::Mount(child) => {
                    let Some(rest) = remainder(path, end) else {
                        continue;
                    };
                    if let Some(found) = child.find(method, rest, format) {
                        let mut merged = params;
                        merged.extend(found.params);
                        return Some(RouteMatch {
                            name: format!("{}.{}", route.name, found.name),
                            handler: found.handler,
                            params: merged,
                            constraints: found.constraints,
                        });
                    }
                }
            }
        }
        None
    }

    /// Build the URL of route `name` from positional `args`.
    ///
    /// `mount.child` names address routes inside mounted routers; the
    /// mount's own parameters come first in `args`.
    pub fn generate<S: AsRef<str>>(&self, name: &str, args: &[S]) -> Result<String, RouterError> {
        // A mount addressed by its own name resolves to its prefix.
        if let Some(&i) = self.names.get(name) {
            return self.routes[i].pattern.fill(name, args);
        }

        let (mount, rest) = name
            .split_once('.')
            .ok_or_else(|| RouterError::UnknownRoute(name.to_owned()))?;
        let route = self
            .names
            .get(mount)
            .map(|&i| &self.routes[i])
            .ok_or_else(|| RouterError::UnknownRoute(name.to_owned()))?;
        let Target::Mount(child) = &route.target else {
            return Err(RouterError::UnknownRoute(name.to_owned()));
        };

        let own = route.pattern.params().len();
        if args.len() < own {
            return Err(RouterError::Arity {
                name: name.to_owned(),
                expected: own,
                got: args.len(),
            });
        }
        let prefix = route.pattern.fill(mount, &args[..own])?;
        let tail = child.generate(rest, &args[own..]).map_err(|err| match err {
            RouterError::UnknownRoute(_) => RouterError::UnknownRoute(name.to_owned()),
            other => other,
        })?;
        Ok(format!("{}{tail}", prefix.trim_end_matches('/')))
    }
}

/// The part of `path` after a mount prefix ending at `end`, as a path
/// starting with `/`. `None` if the prefix ended mid-segment.
fn remainder(path: &str, end: usize) -> Option<&str> {
    let rest = &path[end..];
    if rest.is_empty() {
        return Some("/");
    }
    if rest.starts_with('/') {
        return Some(rest);
    }
    path[..end].ends_with('/').then(|| &path[end - 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blog() -> Router<&'static str> {
        let mut router = Router::new();
        router
            .get("index_feed", "/index.rss", "index_feed")
            .unwrap()
            .get("index", "/", "index")
            .unwrap()
            .get("post", r"/(\d+)/(\d+)/:slug", "post")
            .unwrap()
            .get("archive", r"/(\d+)/(\d+)", "archive")
            .unwrap()
            .route(
                "category_feed",
                "/categories/:name",
                Constraints::new().method(Method::Get).format("rss"),
                "category_feed",
            )
            .unwrap()
            .get("category", "/categories/:name", "category")
            .unwrap()
            .post("comments", "/comments", "comments")
            .unwrap()
            .get("page", "/*path", "page")
            .unwrap();
        router
    }

    fn handler<'r>(router: &'r Router<&'static str>, method: Method, path: &str, format: Option<&str>) -> Option<&'r str> {
        router.find(method, path, format).map(|m| *m.handler)
    }

    #[test]
    fn test_blog_table() {
        let router = blog();
        let get = |path, format| handler(&router, Method::Get, path, format);

        assert_eq!(get("/", None), Some("index"));
        assert_eq!(get("/index.rss", Some("rss")), Some("index_feed"));
        assert_eq!(get("/2008/10/new-post", None), Some("post"));
        assert_eq!(get("/2008/10", None), Some("archive"));
        assert_eq!(get("/categories/ruby.rss", Some("rss")), Some("category_feed"));
        assert_eq!(get("/categories/ruby", None), Some("category"));
        assert_eq!(get("/about", None), Some("page"));
        assert_eq!(handler(&router, Method::Post, "/comments", None), Some("comments"));
    }

    #[test]
    fn test_match_carries_route_formats() {
        let router = blog();
        let feed = router.find(Method::Get, "/categories/ruby.rss", Some("rss")).unwrap();
        assert_eq!(feed.constraints.formats(), ["rss"]);

        let page = router.find(Method::Get, "/about.json", Some("json")).unwrap();
        assert_eq!(page.name, "page");
        assert!(page.constraints.formats().is_empty());
    }

    #[test]
    fn test_constraint_failure_falls_through() {
        let router = blog();
        // GET /comments fails the POST constraint and lands on the page catch-all.
        let m = router.find(Method::Get, "/comments", None).unwrap();
        assert_eq!(m.name, "page");
        assert_eq!(m.params.get("path"), Some("comments"));

        // No POST route but comments matches structurally.
        assert!(router.find(Method::Post, "/about", None).is_none());
    }

    #[test]
    fn test_head_admitted_by_get() {
        let router = blog();
        assert_eq!(handler(&router, Method::Head, "/", None), Some("index"));
    }

    #[test]
    fn test_registration_order_decides() {
        let mut specific_first: Router<&str> = Router::new();
        specific_first
            .get("about", "/about", "about")
            .unwrap()
            .get("page", "/*path", "page")
            .unwrap();
        assert_eq!(handler(&specific_first, Method::Get, "/about", None), Some("about"));

        let mut catch_all_first: Router<&str> = Router::new();
        catch_all_first
            .get("page", "/*path", "page")
            .unwrap()
            .get("about", "/about", "about")
            .unwrap();
        assert_eq!(handler(&catch_all_first, Method::Get, "/about", None), Some("page"));
    }

    #[test]
    fn test_generate_and_match_roundtrip() {
        let router = blog();
        let cases: [(&str, &[&str]); 5] = [
            ("post", &["2008", "10", "new-post"]),
            ("archive", &["2008", "10"]),
            ("category", &["ruby"]),
            ("page", &["projects/blotter"]),
            ("index", &[]),
        ];

        for (name, args) in cases {
            let url = router.generate(name, args).unwrap();
            let found = router.find(Method::Get, &url, None).unwrap();
            assert_eq!(found.name, name, "{url}");
            let values: Vec<&str> = found.params.iter().map(|(_, v)| v).collect();
            assert_eq!(values, args, "{url}");
        }
    }

    #[test]
    fn test_generate_errors() {
        let router = blog();
        assert_eq!(
            router.generate("missing", &["x"]),
            Err(RouterError::UnknownRoute("missing".into()))
        );
        assert_eq!(
            router.generate("post", &["2008"]),
            Err(RouterError::Arity {
                name: "post".into(),
                expected: 3,
                got: 1
            })
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut router: Router<()> = Router::new();
        router.get("index", "/", ()).unwrap();
        assert_eq!(
            router.get("index", "/home", ()).err(),
            Some(RouterError::DuplicateName("index".into()))
        );
        assert_eq!(router.len(), 1);
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let mut router: Router<()> = Router::new();
        assert!(matches!(
            router.get("bad", "/(oops", ()),
            Err(RouterError::InvalidPattern { .. })
        ));
        assert!(router.is_empty());
    }

    fn admin() -> Router<&'static str> {
        let mut child = Router::new();
        child
            .get("list", "/", "list")
            .unwrap()
            .get("edit", "/edit/*path", "edit")
            .unwrap();

        let mut root = Router::new();
        root.mount("admin", "/admin/:user", child)
            .unwrap()
            .get("page", "/*path", "page")
            .unwrap();
        root
    }

    #[test]
    fn test_mount_find_merges_params() {
        let router = admin();
        let m = router.find(Method::Get, "/admin/alice/edit/2008/10/x", None).unwrap();
        assert_eq!(m.name, "admin.edit");
        assert_eq!(*m.handler, "edit");
        assert_eq!(m.params.get("user"), Some("alice"));
        assert_eq!(m.params.get("path"), Some("2008/10/x"));

        let m = router.find(Method::Get, "/admin/alice", None).unwrap();
        assert_eq!(m.name, "admin.list");
    }

    #[test]
    fn test_mount_miss_falls_through() {
        let router = admin();
        let m = router.find(Method::Get, "/admin/alice/unknown", None).unwrap();
        assert_eq!(m.name, "page");
    }

    #[test]
    fn test_mount_generate() {
        let router = admin();
        assert_eq!(
            router.generate("admin.edit", &["alice", "about"]).unwrap(),
            "/admin/alice/edit/about"
        );
        assert_eq!(router.generate("admin.list", &["bob"]).unwrap(), "/admin/bob/");
        assert_eq!(
            router.generate("admin.nope", &["bob"]),
            Err(RouterError::UnknownRoute("admin.nope".into()))
        );
        assert!(matches!(
            router.generate("admin.edit", &[] as &[&str]),
            Err(RouterError::Arity { .. })
        ));
    }

    #[test]
    fn test_remainder() {
        assert_eq!(remainder("/admin", 6), Some("/"));
        assert_eq!(remainder("/admin/x", 6), Some("/x"));
        assert_eq!(remainder("/adminx", 6), None);
        assert_eq!(remainder("/admin/x", 7), Some("/x"));
    }

    #[test]
    fn test_method_parse() {
        assert_eq!("get".parse::<Method>(), Ok(Method::Get));
        assert_eq!("POST".parse::<Method>(), Ok(Method::Post));
        assert!("BREW".parse::<Method>().is_err());
        assert_eq!(Method::Delete.to_string(), "DELETE");
    }
}
