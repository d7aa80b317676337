//! Static asset resolution.
//!
//! Maps request paths onto files below a fixed root directory. Resolution
//! never escapes the root: parent components are rejected up front and the
//! canonical path of whatever was found must still live under the canonical
//! root (symlinks are followed, then checked).
//!
//! A failed resolution is not an error response. The router treats
//! [`StaticFileError::is_fallthrough`] errors as "not mine" and hands the
//! request to the next stage.
//!
//! Unity and Unreal builds are content-addressed, so the large payloads
//! (`.wasm`, `.data`, `.unityweb`) are marked immutable for a year. Everything
//! else is revalidated on each load through `ETag`/`Last-Modified`.

use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use std::io::SeekFrom;

use http::{header, HeaderMap, Method, Response, StatusCode};
use thiserror::Error;
use tokio::io::AsyncSeekExt;

use crate::body::{self, HttpResponse, ResponseBody};

/// `Cache-Control` for content-addressed build artifacts.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// `Cache-Control` for every other file.
pub const REVALIDATE_CACHE_CONTROL: &str = "public, max-age=0";

/// Errors that can occur when serving static files.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// The requested file was not found.
    #[error("File not found: {0}")]
    NotFound(String),

    /// The path is forbidden (traversal, hidden file, malformed encoding).
    #[error("Forbidden path: {0}")]
    Forbidden(String),

    /// Only GET and HEAD read files.
    #[error("Method not allowed")]
    MethodNotAllowed,

    /// The requested byte range lies outside the file.
    #[error("Range not satisfiable for file of {size} bytes")]
    RangeNotSatisfiable {
        /// Size of the file in bytes.
        size: u64,
    },

    /// I/O error while reading file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl StaticFileError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Self::IoError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether the request should continue to the next handler.
    #[must_use]
    pub fn is_fallthrough(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::Forbidden(_) | Self::MethodNotAllowed
        )
    }
}

/// Returns the `Content-Type` for a file path.
///
/// The WebAssembly build artifacts have fixed types; other extensions go
/// through a general table and default to `application/octet-stream`.
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match extension.as_str() {
        "css" => "text/css",
        "js" => "application/javascript",
        "wasm" => "application/wasm",
        "ico" => "image/x-icon",
        "data" | "unityweb" => "application/octet-stream",

        "html" | "htm" => "text/html; charset=utf-8",
        "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "webmanifest" => "application/manifest+json",

        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "avif" => "image/avif",

        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",

        "mp3" => "audio/mpeg",
        "ogg" => "audio/ogg",
        "wav" => "audio/wav",
        "mp4" => "video/mp4",
        "webm" => "video/webm",

        "gz" => "application/gzip",
        "br" => "application/x-brotli",
        "zip" => "application/zip",

        _ => "application/octet-stream",
    }
}

/// Returns the `Cache-Control` directive for a file path.
#[must_use]
pub fn cache_control_for(path: &Path) -> &'static str {
    let immutable = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            ["wasm", "data", "unityweb"]
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        });

    if immutable {
        IMMUTABLE_CACHE_CONTROL
    } else {
        REVALIDATE_CACHE_CONTROL
    }
}

/// Static asset resolver rooted at one directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    /// Root directory for static files
    root: PathBuf,

    /// Index file name served for directory requests
    index_file: Option<String>,

    /// Whether to serve hidden files (starting with .)
    serve_hidden: bool,

    /// Whether to include `ETag` headers
    etag_enabled: bool,

    /// Whether to include `Last-Modified` headers
    last_modified_enabled: bool,
}

impl StaticFiles {
    /// Creates a resolver for the given root directory.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_file: None,
            serve_hidden: false,
            etag_enabled: true,
            last_modified_enabled: true,
        }
    }

    /// Sets the index file to serve for directory requests.
    #[must_use]
    pub fn index<S: Into<String>>(mut self, index: S) -> Self {
        self.index_file = Some(index.into());
        self
    }

    /// Enables or disables serving hidden files.
    #[must_use]
    pub fn serve_hidden(mut self, enabled: bool) -> Self {
        self.serve_hidden = enabled;
        self
    }

    /// Enables or disables `ETag` headers.
    #[must_use]
    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag_enabled = enabled;
        self
    }

    /// Enables or disables `Last-Modified` headers.
    #[must_use]
    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified_enabled = enabled;
        self
    }

    /// Resolves and serves `request_path` (still percent-encoded).
    ///
    /// # Errors
    ///
    /// Fallthrough errors ([`StaticFileError::is_fallthrough`]) mean the path
    /// does not name a servable file. `RangeNotSatisfiable` and `IoError`
    /// describe a file that exists but could not be served as asked.
    pub async fn serve(
        &self,
        request_path: &str,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<HttpResponse, StaticFileError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed);
        }

        let decoded = urlencoding::decode(request_path)
            .map_err(|_| StaticFileError::Forbidden("Path is not valid UTF-8".to_string()))?;

        let file_path = self.resolve_path(&decoded).await?;
        let metadata = tokio::fs::metadata(&file_path).await?;

        if metadata.is_dir() {
            if !request_path.ends_with('/') {
                return Ok(redirect_response(&directory_location(request_path)));
            }
            if let Some(ref index) = self.index_file {
                let index_path = file_path.join(index);
                if let Ok(index_metadata) = tokio::fs::metadata(&index_path).await {
                    if index_metadata.is_file() {
                        return self
                            .serve_file(&index_path, &index_metadata, headers, method)
                            .await;
                    }
                }
            }
            return Err(StaticFileError::NotFound(request_path.to_string()));
        }

        if !metadata.is_file() {
            return Err(StaticFileError::NotFound(request_path.to_string()));
        }

        self.serve_file(&file_path, &metadata, headers, method).await
    }

    /// Resolves a decoded request path to a canonical path under the root.
    async fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        if request_path.contains('\0') {
            return Err(StaticFileError::Forbidden("NUL byte in path".to_string()));
        }

        let path = request_path.trim_start_matches('/');

        for component in Path::new(path).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden(
                        "Directory traversal not allowed".to_string(),
                    ));
                }
                Component::Prefix(_) | Component::RootDir => {
                    return Err(StaticFileError::Forbidden(
                        "Absolute paths not allowed".to_string(),
                    ));
                }
                Component::Normal(name) => {
                    if !self.serve_hidden
                        && name.to_str().is_some_and(|name| name.starts_with('.'))
                    {
                        return Err(StaticFileError::Forbidden(
                            "Hidden files not allowed".to_string(),
                        ));
                    }
                }
                Component::CurDir => {}
            }
        }

        let canonical = tokio::fs::canonicalize(self.root.join(path))
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;

        let canonical_root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;

        if !canonical.starts_with(&canonical_root) {
            return Err(StaticFileError::Forbidden(
                "Path escapes root directory".to_string(),
            ));
        }

        Ok(canonical)
    }

    async fn serve_file(
        &self,
        path: &Path,
        metadata: &std::fs::Metadata,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<HttpResponse, StaticFileError> {
        let file_size = metadata.len();
        let modified = metadata.modified().ok();
        let etag = if self.etag_enabled {
            generate_etag(file_size, modified)
        } else {
            None
        };
        let validators = Validators {
            content_type: content_type_for(path),
            cache_control: cache_control_for(path),
            etag,
            last_modified: modified.filter(|_| self.last_modified_enabled),
        };

        if is_not_modified(headers, &validators) {
            return Ok(validators.not_modified());
        }

        let range = parse_range_header(headers, file_size)?;

        if method == Method::HEAD {
            let length = range.map_or(file_size, |(start, end)| end - start + 1);
            return validators.response(body::empty(), length, range.map(|r| (r, file_size)));
        }

        let mut file = tokio::fs::File::open(path).await?;
        match range {
            Some((start, end)) => {
                file.seek(SeekFrom::Start(start)).await?;
                let length = end - start + 1;
                validators.response(
                    body::stream(file, length),
                    length,
                    Some(((start, end), file_size)),
                )
            }
            None => validators.response(body::stream(file, file_size), file_size, None),
        }
    }
}

/// Per-file response headers shared by 200, 206 and 304 responses.
struct Validators {
    content_type: &'static str,
    cache_control: &'static str,
    etag: Option<String>,
    last_modified: Option<SystemTime>,
}

impl Validators {
    fn apply(&self, mut builder: http::response::Builder) -> http::response::Builder {
        builder = builder.header(header::CACHE_CONTROL, self.cache_control);
        if let Some(ref etag) = self.etag {
            builder = builder.header(header::ETAG, etag.as_str());
        }
        if let Some(modified) = self.last_modified {
            builder = builder.header(header::LAST_MODIFIED, httpdate::fmt_http_date(modified));
        }
        builder
    }

    fn response(
        &self,
        body: ResponseBody,
        content_length: u64,
        range: Option<((u64, u64), u64)>,
    ) -> Result<HttpResponse, StaticFileError> {
        let status = if range.is_some() {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_TYPE, self.content_type)
            .header(header::CONTENT_LENGTH, content_length)
            .header(header::ACCEPT_RANGES, "bytes");
        builder = self.apply(builder);

        if let Some(((start, end), total)) = range {
            builder = builder.header(header::CONTENT_RANGE, format!("bytes {start}-{end}/{total}"));
        }

        builder
            .body(body)
            .map_err(|e| StaticFileError::IoError(std::io::Error::other(e.to_string())))
    }

    fn not_modified(&self) -> HttpResponse {
        self.apply(Response::builder().status(StatusCode::NOT_MODIFIED))
            .body(body::empty())
            .unwrap_or_else(|_| Response::new(body::empty()))
    }
}

/// Builds a weak `ETag` from size and modification time.
fn generate_etag(size: u64, modified: Option<SystemTime>) -> Option<String> {
    let millis = modified?.duration_since(UNIX_EPOCH).ok()?.as_millis();
    Some(format!("W/\"{size:x}-{millis:x}\""))
}

/// `If-None-Match` wins over `If-Modified-Since` when both are present.
fn is_not_modified(headers: &HeaderMap, validators: &Validators) -> bool {
    if let Some(if_none_match) = headers.get(header::IF_NONE_MATCH) {
        let Some(ref etag) = validators.etag else {
            return false;
        };
        return if_none_match.to_str().is_ok_and(|value| {
            value
                .split(',')
                .map(str::trim)
                .any(|candidate| candidate == "*" || weak_eq(candidate, etag))
        });
    }

    let Some(modified) = validators.last_modified else {
        return false;
    };
    headers
        .get(header::IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| httpdate::parse_http_date(v).ok())
        .is_some_and(|since| {
            let secs = |t: SystemTime| t.duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs());
            secs(modified) <= secs(since)
        })
}

fn weak_eq(a: &str, b: &str) -> bool {
    a.trim_start_matches("W/") == b.trim_start_matches("W/")
}

/// Parses a single `bytes=` range.
///
/// Malformed or multi-range headers are ignored (`Ok(None)`), which serves
/// the whole file. A well-formed range outside the file is an error.
fn parse_range_header(
    headers: &HeaderMap,
    file_size: u64,
) -> Result<Option<(u64, u64)>, StaticFileError> {
    let Some(ranges) = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().strip_prefix("bytes="))
    else {
        return Ok(None);
    };

    if ranges.contains(',') {
        return Ok(None);
    }

    let Some((start, end)) = ranges.split_once('-') else {
        return Ok(None);
    };
    let (start, end) = (start.trim(), end.trim());
    let unsatisfiable = StaticFileError::RangeNotSatisfiable { size: file_size };

    if start.is_empty() {
        let Ok(suffix_len) = end.parse::<u64>() else {
            return Ok(None);
        };
        if suffix_len == 0 || file_size == 0 {
            return Err(unsatisfiable);
        }
        return Ok(Some((file_size.saturating_sub(suffix_len), file_size - 1)));
    }

    let Ok(start) = start.parse::<u64>() else {
        return Ok(None);
    };
    let end = if end.is_empty() {
        file_size.saturating_sub(1)
    } else {
        match end.parse::<u64>() {
            Ok(end) => end,
            Err(_) => return Ok(None),
        }
    };

    if start > end || start >= file_size {
        return Err(unsatisfiable);
    }

    Ok(Some((start, end.min(file_size - 1))))
}

/// `Location` for a directory requested without its trailing slash.
///
/// Leading slashes collapse to one and backslashes are escaped, so the value
/// never parses as a scheme-relative URL.
fn directory_location(request_path: &str) -> String {
    let path = request_path.trim_start_matches('/').replace('\\', "%5C");
    format!("/{path}/")
}

fn redirect_response(location: &str) -> HttpResponse {
    Response::builder()
        .status(StatusCode::MOVED_PERMANENTLY)
        .header(header::LOCATION, location)
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(body::full(format!("Redirecting to {location}")))
        .unwrap_or_else(|_| Response::new(body::empty()))
}
