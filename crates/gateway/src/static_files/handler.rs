//! Answers requests that no proxy rule claimed from the document root.

use std::iter;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use bytes::Bytes;
use http::{HeaderValue, Method, Request, Response, StatusCode, header};
use tracing::{debug, error};

use crate::SERVER_NAME;
use crate::response::{bad_request, not_found, server_error};
use crate::static_files::cache::{Resolved, StaticFileCache};
use crate::static_files::date::{fmt_http_date, parse_http_date};
use crate::static_files::mime::mime_type;

/// Target every unknown path falls back to, the SPA router takes it from there
const INDEX_TARGET: &str = "/index.html";

/// How long browsers may keep scripts and stylesheets
const ASSET_EXPIRES: Duration = Duration::from_secs(12 * 60 * 60);

const CACHE_PUBLIC: HeaderValue = HeaderValue::from_static("public");

#[derive(Debug)]
pub struct StaticFileHandler {
    doc_root: PathBuf,
    cache: StaticFileCache,
}

impl StaticFileHandler {
    pub fn new(doc_root: impl Into<PathBuf>) -> Self {
        Self::with_cache(doc_root, StaticFileCache::new())
    }

    pub fn with_cache(doc_root: impl Into<PathBuf>, cache: StaticFileCache) -> Self {
        Self { doc_root: doc_root.into(), cache }
    }

    pub fn cache(&self) -> &StaticFileCache {
        &self.cache
    }

    /// Serves `request` from the document root.
    ///
    /// Unknown targets are retried once as `/index.html` so client-side routes of the
    /// single-page application resolve to the application itself.
    pub async fn handle<B>(&self, request: &Request<B>) -> Response<Bytes> {
        if request.method() != Method::GET && request.method() != Method::HEAD {
            return bad_request(request, "Unknown HTTP-method");
        }

        let target = request.uri().path();
        if target.is_empty() || !target.starts_with('/') || target.split('/').any(|segment| segment == "..") {
            return bad_request(request, "Illegal request-target");
        }

        let if_modified_since = request.headers().get(header::IF_MODIFIED_SINCE).and_then(parse_http_date);

        let fallback = (target != INDEX_TARGET).then_some(INDEX_TARGET);
        for candidate in iter::once(target).chain(fallback) {
            let path = self.map_target(candidate).await;
            match self.cache.resolve(&path, if_modified_since).await {
                Ok(Resolved::NotFound) => debug!(target = candidate, "static file not found"),
                Ok(Resolved::NotModified { modified }) => return not_modified(request, &path, modified),
                Ok(Resolved::Served { content, modified }) => return served(request, &path, content, modified),
                Err(e) => {
                    error!(path = %path.display(), cause = %e, "failed to read static file");
                    return server_error(request, &e.to_string());
                }
            }
        }

        not_found(request, target)
    }

    /// File system path for a request target, directories map to their `index.html`.
    async fn map_target(&self, target: &str) -> PathBuf {
        let mut path = self.doc_root.join(target.trim_start_matches('/'));
        if tokio::fs::metadata(&path).await.is_ok_and(|metadata| metadata.is_dir()) {
            path.push("index.html");
        }
        path
    }
}

fn not_modified<B>(request: &Request<B>, path: &Path, modified: SystemTime) -> Response<Bytes> {
    let mut response = base_response(request, StatusCode::NOT_MODIFIED, path, modified, Bytes::new());
    response.headers_mut().insert(header::CACHE_CONTROL, CACHE_PUBLIC);
    response
}

fn served<B>(request: &Request<B>, path: &Path, content: Bytes, modified: SystemTime) -> Response<Bytes> {
    let length = HeaderValue::from(content.len());

    let mut response = if request.method() == Method::HEAD {
        base_response(request, StatusCode::OK, path, modified, Bytes::new())
    } else {
        let mut response = base_response(request, StatusCode::OK, path, modified, content);
        response.headers_mut().insert(header::CACHE_CONTROL, CACHE_PUBLIC);
        response
    };

    let headers = response.headers_mut();
    headers.insert(header::CONTENT_LENGTH, length);
    if is_long_lived_asset(path) {
        headers.insert(header::EXPIRES, fmt_http_date(SystemTime::now() + ASSET_EXPIRES));
    }
    response
}

fn base_response<B>(request: &Request<B>, status: StatusCode, path: &Path, modified: SystemTime, body: Bytes) -> Response<Bytes> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.version_mut() = request.version();

    let headers = response.headers_mut();
    headers.insert(header::SERVER, HeaderValue::from_static(SERVER_NAME));
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(mime_type(path)));
    headers.insert(header::LAST_MODIFIED, fmt_http_date(modified));
    response
}

fn is_long_lived_asset(path: &Path) -> bool {
    path.extension().is_some_and(|extension| extension == "js" || extension == "css")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::num::NonZeroUsize;
    use tempfile::TempDir;

    const MTIME_MILLIS: u64 = 1_445_412_480_750;
    const LAST_MODIFIED: &str = "Wed, 21 Oct 2015 07:28:00 GMT";

    fn doc_root() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("index.html"), b"<div id=app></div>").unwrap();
        fs::write(dir.path().join("app.js"), b"console.log('forum')").unwrap();
        fs::write(dir.path().join("app.css"), b"body{margin:0}").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), b"docs").unwrap();
        for name in ["index.html", "app.js", "app.css", "docs/index.html"] {
            let file = File::options().write(true).open(dir.path().join(name)).unwrap();
            file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_millis(MTIME_MILLIS)).unwrap();
        }
        dir
    }

    fn get(target: &str) -> Request<Bytes> {
        Request::builder().uri(target).body(Bytes::new()).unwrap()
    }

    #[tokio::test]
    async fn serves_index() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());

        let response = handler.handle(&get("/index.html")).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "<div id=app></div>");
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_TYPE], "text/html");
        assert_eq!(headers[header::CACHE_CONTROL], "public");
        assert_eq!(headers[header::LAST_MODIFIED], LAST_MODIFIED);
        assert_eq!(headers[header::CONTENT_LENGTH], "18");
        assert_eq!(headers[header::SERVER], SERVER_NAME);
        assert!(headers.get(header::EXPIRES).is_none());
    }

    #[tokio::test]
    async fn conditional_get_on_exact_mtime() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());
        let request = Request::builder().uri("/app.js").header(header::IF_MODIFIED_SINCE, LAST_MODIFIED).body(Bytes::new()).unwrap();

        let response = handler.handle(&request).await;

        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert!(response.body().is_empty());
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public");
        assert_eq!(response.headers()[header::LAST_MODIFIED], LAST_MODIFIED);
        assert!(handler.cache().is_empty());
    }

    #[tokio::test]
    async fn stale_if_modified_since_serves() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());
        let request = Request::builder()
            .uri("/app.js")
            .header(header::IF_MODIFIED_SINCE, "Wed, 21 Oct 2015 07:27:59 GMT")
            .body(Bytes::new())
            .unwrap();

        let response = handler.handle(&request).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "console.log('forum')");
    }

    #[tokio::test]
    async fn head_of_stylesheet() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());
        let request = Request::builder().method(Method::HEAD).uri("/app.css").body(Bytes::new()).unwrap();

        let response = handler.handle(&request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body().is_empty());
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "14");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());

        let expires = parse_http_date(&response.headers()[header::EXPIRES]).unwrap();
        let ahead = expires.duration_since(SystemTime::now()).unwrap();
        assert!(ahead > ASSET_EXPIRES - Duration::from_secs(60) && ahead <= ASSET_EXPIRES);
    }

    #[tokio::test]
    async fn directory_maps_to_its_index() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());

        assert_eq!(handler.handle(&get("/docs")).await.body(), "docs");
        assert_eq!(handler.handle(&get("/")).await.body(), "<div id=app></div>");
    }

    #[tokio::test]
    async fn history_fallback_to_index() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());

        let response = handler.handle(&get("/thread/42?page=2")).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "<div id=app></div>");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
    }

    #[tokio::test]
    async fn fallback_happens_once() {
        let dir = TempDir::new().unwrap();
        let handler = StaticFileHandler::new(dir.path());

        let response = handler.handle(&get("/thread/42")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), "The resource '/thread/42' was not found");

        let response = handler.handle(&get("/index.html")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.body(), "The resource '/index.html' was not found");
    }

    #[tokio::test]
    async fn rejects_other_methods_and_targets() {
        let dir = doc_root();
        let handler = StaticFileHandler::new(dir.path());

        let post = Request::builder().method(Method::POST).uri("/index.html").body(Bytes::new()).unwrap();
        let response = handler.handle(&post).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "Unknown HTTP-method");

        let response = handler.handle(&get("/../etc/passwd")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body(), "Illegal request-target");

        let response = handler.handle(&get("*")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn read_errors_are_server_errors() {
        let dir = doc_root();
        fs::create_dir(dir.path().join("broken.html")).unwrap();
        fs::create_dir(dir.path().join("broken.html/index.html")).unwrap();
        let handler = StaticFileHandler::with_cache(dir.path(), StaticFileCache::with_limits(NonZeroUsize::MIN, 1024));

        let response = handler.handle(&get("/broken.html")).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.body().starts_with(b"An error occured: '"));
    }
}
