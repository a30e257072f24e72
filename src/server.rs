//! Development server with live reload.
//!
//! Serves the assembled `devserver/` directory over local HTTP. Live
//! reload is a long-poll: injected pages ask `/__livereload?since=<n>` and
//! the request is held until the reload generation moves past `n`, at
//! which point the page refreshes itself.

use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::TaskError;

/// Endpoint polled by the injected live-reload client
pub const LIVERELOAD_PATH: &str = "/__livereload";

/// How long a live-reload poll is held before answering unchanged
pub const LIVERELOAD_POLL: Duration = Duration::from_secs(25);

const LIVERELOAD_SCRIPT: &str = r#"<script>(function(){var gen=null;function poll(){var x=new XMLHttpRequest();x.open("GET","/__livereload?since="+(gen===null?"":gen));x.onload=function(){var n=parseInt(x.responseText,10);if(gen!==null&&n!==gen){location.reload();return;}gen=n;poll();};x.onerror=function(){setTimeout(poll,1000);};x.send();}poll();})();</script>"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    pub livereload: bool,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            livereload: true,
        }
    }
}

impl ServeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Reload generation shared between the watch on the served root and the
/// waiting live-reload requests
#[derive(Debug, Default)]
pub struct ReloadHub {
    generation: Mutex<u64>,
    changed: Condvar,
}

impl ReloadHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.lock().map(|g| *g).unwrap_or_else(|e| *e.into_inner())
    }

    /// Signal every waiting client to reload
    pub fn notify(&self) -> u64 {
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        *generation += 1;
        self.changed.notify_all();
        *generation
    }

    /// Block until the generation differs from `since` or `timeout` passes,
    /// returning the current generation
    pub fn wait_newer(&self, since: u64, timeout: Duration) -> u64 {
        let deadline = Instant::now() + timeout;
        let mut generation = self.generation.lock().unwrap_or_else(|e| e.into_inner());
        while *generation == since {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            generation = match self.changed.wait_timeout(generation, deadline - now) {
                Ok((g, _)) => g,
                Err(e) => e.into_inner().0,
            };
        }
        *generation
    }
}

/// A response ready to hand to the HTTP layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HttpResponse {
    fn text(status_code: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status_code,
            content_type: "text/plain; charset=utf-8",
            body: body.into(),
        }
    }
}

/// Content type by file extension
pub fn content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json" | "map") => "application/json",
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("vtt") => "text/vtt",
        Some("txt") => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

/// Map a request path onto a file under `root`.
///
/// Returns `None` for paths escaping the root or that do not decode to UTF-8.
/// Directories (and the bare root) map to their index.html.
pub fn resolve_path(root: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(url_path).ok()?;
    let relative = Path::new(decoded.trim_start_matches('/'));

    let mut resolved = root.to_path_buf();
    for component in relative.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    if decoded.ends_with('/') || resolved.is_dir() {
        resolved.push("index.html");
    }
    Some(resolved)
}

/// Insert the live-reload client into an HTML page, before `</body>` when
/// present and at the end otherwise
pub fn inject_livereload(html: &[u8]) -> Vec<u8> {
    let text = String::from_utf8_lossy(html);
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len() + LIVERELOAD_SCRIPT.len());
    match lower.rfind("</body>") {
        Some(idx) => {
            out.push_str(&text[..idx]);
            out.push_str(LIVERELOAD_SCRIPT);
            out.push_str(&text[idx..]);
        }
        None => {
            out.push_str(&text);
            out.push_str(LIVERELOAD_SCRIPT);
        }
    }
    out.into_bytes()
}

fn split_query(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}

fn query_param(query: Option<&str>, key: &str) -> Option<String> {
    query?
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .and_then(|(_, v)| urlencoding::decode(v).ok())
        .map(|v| v.into_owned())
}

/// Static file server over a root directory
#[derive(Debug, Clone)]
pub struct DevServer {
    root: PathBuf,
    config: ServeConfig,
    hub: Arc<ReloadHub>,
}

impl DevServer {
    pub fn new(root: impl Into<PathBuf>, config: ServeConfig, hub: Arc<ReloadHub>) -> Self {
        Self {
            root: root.into(),
            config,
            hub,
        }
    }

    pub fn hub(&self) -> &Arc<ReloadHub> {
        &self.hub
    }

    /// Answer a GET for `url` (path plus optional query)
    pub fn handle(&self, url: &str) -> HttpResponse {
        let (path, query) = split_query(url);

        if path == LIVERELOAD_PATH {
            if !self.config.livereload {
                return HttpResponse::text(404, "live reload disabled");
            }
            let generation = match query_param(query, "since").and_then(|s| s.parse::<u64>().ok()) {
                Some(since) => self.hub.wait_newer(since, LIVERELOAD_POLL),
                None => self.hub.generation(),
            };
            return HttpResponse::text(200, generation.to_string());
        }

        let Some(file) = resolve_path(&self.root, path) else {
            return HttpResponse::text(403, "forbidden");
        };

        match fs::read(&file) {
            Ok(body) => {
                let content_type = content_type(&file);
                let body = if self.config.livereload && content_type.starts_with("text/html") {
                    inject_livereload(&body)
                } else {
                    body
                };
                HttpResponse {
                    status_code: 200,
                    content_type,
                    body,
                }
            }
            Err(_) => HttpResponse::text(404, "not found"),
        }
    }

    /// Serve until the process exits
    pub fn run(self) -> Result<(), TaskError> {
        let addr = self.config.addr();
        let server = tiny_http::Server::http(&addr).map_err(|e| TaskError::ServerBind {
            addr: addr.clone(),
            message: e.to_string(),
        })?;

        info!(root = %self.root.display(), livereload = self.config.livereload, "serving on http://{addr}");

        let this = Arc::new(self);
        for request in server.incoming_requests() {
            let this = Arc::clone(&this);
            let spawned = thread::Builder::new()
                .name("devserver-request".to_string())
                .spawn(move || this.respond(request));
            if let Err(e) = spawned {
                warn!(error = %e, "failed to spawn request handler");
            }
        }
        Ok(())
    }

    fn respond(&self, request: tiny_http::Request) {
        let response = match request.method() {
            tiny_http::Method::Get | tiny_http::Method::Head => self.handle(request.url()),
            _ => HttpResponse::text(405, "method not allowed"),
        };
        debug!(url = request.url(), status = response.status_code, "request");

        let mut tiny = tiny_http::Response::from_data(response.body).with_status_code(response.status_code);
        if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], response.content_type.as_bytes()) {
            tiny = tiny.with_header(header);
        }
        if let Ok(header) = tiny_http::Header::from_bytes(&b"Cache-Control"[..], &b"no-cache"[..]) {
            tiny = tiny.with_header(header);
        }
        if let Err(e) = request.respond(tiny) {
            debug!(error = %e, "client went away");
        }
    }
}
