//! HTTP boundary of the blog.
//!
//! Built on `tiny_http`:
//!
//! - Static files from `serve.public` are answered before routing
//! - Everything else goes through the [`Dispatcher`]
//! - Query strings and urlencoded form bodies become request params
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌────────────────┐
//! │  Worker 1  │   │  Worker 2  │   │  Worker N  │   │ Refresh Thread │
//! └─────┬──────┘   └─────┬──────┘   └─────┬──────┘   └───────┬────────┘
//!       │                │                │                  │
//!       └────────────────┼────────────────┘                  ▼
//!                        ▼                            reload blog.toml
//!             public/ file?  ── yes ──▶ file
//!                        │ no
//!                        ▼
//!             Dispatcher::dispatch
//! ```

use crate::{
    config::{SiteConfig, cfg},
    dispatch::{self, Dispatcher},
    log,
    logger::log_request,
    refresh::spawn_config_refresh,
    router::Method,
};
use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs,
    io::Read,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::Arc,
    thread,
    time::Instant,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

// ============================================================================
// Constants
// ============================================================================

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Upper bound on request worker threads.
const MAX_WORKERS: usize = 8;

/// Larger form bodies are cut off.
const MAX_BODY_BYTES: u64 = 64 * 1024;

// ============================================================================
// Server Entry Point
// ============================================================================

/// Serve the blog until Ctrl+C.
///
/// 1. Builds the dispatcher and loads all content once
/// 2. Binds to the configured interface and port (with auto-retry)
/// 3. Starts the background config refresh
/// 4. Answers requests on a pool of worker threads
pub fn serve_blog() -> Result<()> {
    let c = cfg();
    let dispatcher = Arc::new(Dispatcher::from_config(&c)?);
    let loaded = dispatcher
        .store()
        .reload()
        .context("Failed to load content")?;
    log!("reload"; "{} documents in {:?}", loaded.documents, loaded.elapsed);

    let interface: IpAddr = c.serve.interface.parse()?;
    let (server, addr) = try_bind_port(interface, c.serve.port, MAX_PORT_RETRIES)?;
    let server = Arc::new(server);
    let workers = thread::available_parallelism().map_or(4, |n| n.get()).min(MAX_WORKERS);

    let server_for_signal = Arc::clone(&server);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        for _ in 0..workers {
            server_for_signal.unblock();
        }
    })
    .context("Failed to set Ctrl+C handler")?;

    let _refresher = spawn_config_refresh(c.serve.refresh_secs);
    log!("serve"; "http://{} ({:?} templates, {workers} workers)", addr, c.templates.mode);

    thread::scope(|scope| {
        for _ in 0..workers {
            let server = Arc::clone(&server);
            let dispatcher = Arc::clone(&dispatcher);
            scope.spawn(move || {
                for request in server.incoming_requests() {
                    // Re-read config per request to pick up refreshed values
                    if let Err(err) = handle_request(request, &dispatcher, &cfg()) {
                        log!("serve"; "request error: {err:#}");
                    }
                }
            });
        }
    });

    Ok(())
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Resolution order:
/// 1. `GET`/`HEAD` of an existing file under `serve.public` → file
/// 2. Anything else → dispatcher
fn handle_request(mut request: Request, dispatcher: &Dispatcher, config: &SiteConfig) -> Result<()> {
    let started = Instant::now();
    let Ok(method) = request.method().as_str().parse::<Method>() else {
        return respond_text(request, 405, "Method Not Allowed");
    };

    let (path, query) = split_url(request.url());
    let mut params = parse_query(query);

    if matches!(method, Method::Get | Method::Head) {
        let public = config.get_root().join(&config.serve.public);
        if let Some(file) = static_file(&public, &path) {
            return serve_file(request, &file);
        }
    }

    if is_form(&request) {
        let mut body = Vec::new();
        request
            .as_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .context("Failed to read request body")?;
        let Some(form) = form_params(&body) else {
            log_request(&method.to_string(), &path, 400, started.elapsed());
            return respond_text(request, 400, "Bad Request: form body is not UTF-8");
        };
        params.extend(form);
    }

    let dispatched = dispatch::Request {
        method,
        path,
        params,
    };
    let response = dispatcher.dispatch(&dispatched);
    log_request(&method.to_string(), &dispatched.path, response.status, started.elapsed());

    let mut reply = Response::from_string(response.body).with_status_code(StatusCode(response.status));
    for (name, value) in &response.headers {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            reply.add_header(header);
        }
    }
    request.respond(reply)?;
    Ok(())
}

fn is_form(request: &Request) -> bool {
    request.headers().iter().any(|h| {
        h.field.equiv("Content-Type")
            && h.value
                .as_str()
                .starts_with("application/x-www-form-urlencoded")
    })
}

/// Split a raw request URL into its decoded path and raw query string.
fn split_url(url: &str) -> (String, &str) {
    let (path, query) = url.split_once('?').unwrap_or((url, ""));
    let path = urlencoding::decode(path)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_else(|_| path.to_owned());
    let path = if path.starts_with('/') { path } else { format!("/{path}") };
    (path, query)
}

/// Parse `a=1&b=two+words` into params. Later keys win.
fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect()
}

/// Params of an urlencoded form body; `None` when it is not UTF-8.
fn form_params(body: &[u8]) -> Option<BTreeMap<String, String>> {
    std::str::from_utf8(body).ok().map(parse_query)
}

fn decode_component(s: &str) -> String {
    let s = s.replace('+', " ");
    urlencoding::decode(&s)
        .map(std::borrow::Cow::into_owned)
        .unwrap_or(s)
}

/// The file under `public` that `path` names, if it exists.
///
/// Paths with `..` never resolve.
fn static_file(public: &Path, path: &str) -> Option<PathBuf> {
    let relative = Path::new(path.trim_start_matches('/'));
    if relative.as_os_str().is_empty()
        || relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
    {
        return None;
    }
    let file = public.join(relative);
    file.is_file().then_some(file)
}

// ============================================================================
// Response Helpers
// ============================================================================

/// Serve a file with appropriate content type.
fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut response = Response::from_data(content);
    if let Ok(header) = Header::from_bytes("Content-Type", guess_content_type(path)) {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}

fn respond_text(request: Request, status: u16, body: &str) -> Result<()> {
    let mut response = Response::from_string(body).with_status_code(StatusCode(status));
    if let Ok(header) = Header::from_bytes("Content-Type", "text/plain; charset=utf-8") {
        response.add_header(header);
    }
    request.respond(response)?;
    Ok(())
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("rss") => "application/rss+xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",

        Some("txt") => "text/plain; charset=utf-8",

        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_url() {
        assert_eq!(split_url("/2008/10/new-post"), (String::from("/2008/10/new-post"), ""));
        assert_eq!(split_url("/tags/a%20b?x=1"), (String::from("/tags/a b"), "x=1"));
        assert_eq!(split_url("about"), (String::from("/about"), ""));
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query("name=Ann+Lee&text=hi%21&flag&&name2=");
        assert_eq!(params.get("name").map(String::as_str), Some("Ann Lee"));
        assert_eq!(params.get("text").map(String::as_str), Some("hi!"));
        assert_eq!(params.get("flag").map(String::as_str), Some(""));
        assert_eq!(params.get("name2").map(String::as_str), Some(""));
        assert_eq!(params.len(), 4);
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_form_params() {
        let form = form_params(b"path=2008%2F10%2Ffirst&name=Ann").unwrap();
        assert_eq!(form.get("path").map(String::as_str), Some("2008/10/first"));
        assert_eq!(form.get("name").map(String::as_str), Some("Ann"));

        assert!(form_params(b"text=caf\xc3").is_none());
        assert!(form_params(&[0xff, 0xfe]).is_none());
        assert!(form_params(b"").unwrap().is_empty());
    }

    #[test]
    fn test_static_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("css")).unwrap();
        fs::write(dir.path().join("css/site.css"), "body {}").unwrap();
        fs::write(dir.path().join("robots.txt"), "").unwrap();

        assert_eq!(
            static_file(dir.path(), "/css/site.css"),
            Some(dir.path().join("css/site.css"))
        );
        assert!(static_file(dir.path(), "/robots.txt").is_some());
        assert!(static_file(dir.path(), "/css").is_none());
        assert!(static_file(dir.path(), "/").is_none());
        assert!(static_file(dir.path(), "/missing.css").is_none());
        assert!(static_file(dir.path(), "/css/../robots.txt").is_none());
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a/site.css")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("logo.png")), "image/png");
        assert_eq!(guess_content_type(Path::new("blob")), "application/octet-stream");
    }
}
