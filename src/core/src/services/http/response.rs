use std::path::{Component, Path, PathBuf};

use log::{debug, warn};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::request::HttpRequest;
use crate::configuration::config::absolute_path;
use crate::configuration::service_config::HttpConfig;
use crate::configuration::types::{RequestSimulator, ResponseKind};

pub const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";
pub const CONTENT_TYPE_HTML: &str = "text/html; charset=utf-8";
pub const CONTENT_TYPE_OCTET_STREAM: &str = "application/octet-stream";
const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

const FAKE_FILE_BODY_LEN: usize = 1024;
const ALPHANUMERIC: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Magic header used for synthesized downloads, by extension.
const FILE_HEADERS: &[(&str, &[u8])] = &[
    ("exe", b"MZ"),
    ("dll", b"MZ"),
    ("png", b"\x89PNG\r\n\x1a\n"),
    ("jpg", b"\xff\xd8\xff\xe0"),
    ("jpeg", b"\xff\xd8\xff\xe0"),
    ("gif", b"GIF89a"),
    ("pdf", b"%PDF"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: Some(content_type.into()),
            body,
        }
    }

    pub fn not_found() -> Self {
        Self {
            status: 404,
            content_type: None,
            body: Vec::new(),
        }
    }
}

/// Picks the response for `request`: a simulated URI first, then a static asset for GET
/// requests, otherwise 404.
pub async fn resolve(request: &HttpRequest, config: &HttpConfig) -> HttpResponse {
    let path = request.path();
    if let Some(response) = simulated(path, &config.request_simulator).await {
        debug!("simulated response for {}", path);
        return response;
    }
    if request.method == "GET" {
        if let Some(response) = asset(path, config).await {
            debug!("asset response for {}", path);
            return response;
        }
    }
    debug!("404 for {}", path);
    HttpResponse::not_found()
}

/// Response configured for exactly `path`, if any. A later entry for the same URI
/// overrides an earlier one.
pub async fn simulated(path: &str, table: &[RequestSimulator]) -> Option<HttpResponse> {
    let entry = table.iter().rev().find(|entry| entry.uri == path)?;
    let value = entry.response.value_text();
    match entry.response.kind {
        ResponseKind::Json => Some(HttpResponse::ok(
            CONTENT_TYPE_JSON,
            value.unwrap_or_default().into_bytes(),
        )),
        ResponseKind::String => Some(HttpResponse::ok(
            CONTENT_TYPE_HTML,
            value.unwrap_or_default().into_bytes(),
        )),
        ResponseKind::File => {
            let target = value.filter(|v| !v.is_empty()).map(PathBuf::from);
            match target {
                Some(file) if file.exists() => load_file(&absolute_path(&file)).await,
                _ => fake_file(path).map(|body| HttpResponse::ok(CONTENT_TYPE_OCTET_STREAM, body)),
            }
        }
    }
}

/// Static file under `assets_dir`; `/` maps to the index. Paths with `..` are refused.
pub async fn asset(path: &str, config: &HttpConfig) -> Option<HttpResponse> {
    let root = absolute_path(&config.assets_dir);
    let relative = if path == "/" {
        PathBuf::from(&config.index)
    } else {
        PathBuf::from(path.trim_start_matches('/'))
    };
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        warn!("refusing asset path {}", path);
        return None;
    }
    load_file(&root.join(relative)).await
}

async fn load_file(path: &Path) -> Option<HttpResponse> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) => {
            debug!("cannot read {}: {}", path.display(), e);
            return None;
        }
    };
    let content_type = content_type_for(path, &data);
    Some(HttpResponse::ok(content_type, data))
}

/// Magic header for the extension of `path` followed by 1 KiB of random alphanumerics.
/// `None` for extensions without a known header.
pub fn fake_file(path: &str) -> Option<Vec<u8>> {
    let extension = Path::new(path).extension()?.to_str()?;
    let (_, header) = FILE_HEADERS.iter().find(|(ext, _)| *ext == extension)?;
    let mut body = header.to_vec();
    body.extend((0..FAKE_FILE_BODY_LEN).map(|_| ALPHANUMERIC[rand::random_range(0..ALPHANUMERIC.len())]));
    Some(body)
}

/// Content type from the file suffix where browsers care, from the content otherwise.
pub fn content_type_for(path: &Path, data: &[u8]) -> String {
    let name = path.to_string_lossy();
    if name.ends_with("i18n.jsp") {
        return "text/x-json;charset=UTF-8".to_string();
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") => CONTENT_TYPE_HTML.to_string(),
        Some("js" | "css" | "svg" | "json") => mime_guess::from_path(path)
            .first_raw()
            .map(str::to_string)
            .unwrap_or_else(|| sniff(data).to_string()),
        _ => sniff(data).to_string(),
    }
}

/// Small content sniffer covering the formats a decoy site serves.
pub fn sniff(data: &[u8]) -> &'static str {
    const SIGNATURES: &[(&[u8], &str)] = &[
        (b"%PDF-", "application/pdf"),
        (b"\x89PNG\r\n\x1a\n", "image/png"),
        (b"\xff\xd8\xff", "image/jpeg"),
        (b"GIF87a", "image/gif"),
        (b"GIF89a", "image/gif"),
        (b"PK\x03\x04", "application/zip"),
    ];
    const HTML_TAGS: &[&str] = &[
        "<!doctype html", "<html", "<head", "<script", "<iframe", "<h1", "<div", "<font",
        "<table", "<a", "<style", "<title", "<b", "<body", "<br", "<p", "<!--",
    ];

    let trimmed = {
        let start = data
            .iter()
            .position(|b| !b" \t\n\r\x0c".contains(b))
            .unwrap_or(data.len());
        &data[start..]
    };
    for tag in HTML_TAGS {
        let tag = tag.as_bytes();
        if trimmed.len() > tag.len()
            && trimmed[..tag.len()].eq_ignore_ascii_case(tag)
            && (tag == b"<!--" || matches!(trimmed[tag.len()], b' ' | b'>'))
        {
            return CONTENT_TYPE_HTML;
        }
    }
    if trimmed.starts_with(b"<?xml") {
        return "text/xml; charset=utf-8";
    }
    for (signature, content_type) in SIGNATURES {
        if data.starts_with(signature) {
            return content_type;
        }
    }

    let sample = &data[..data.len().min(512)];
    let binary = sample
        .iter()
        .any(|b| matches!(b, 0x00..=0x08 | 0x0b | 0x0e..=0x1a | 0x1c..=0x1f));
    if binary {
        CONTENT_TYPE_OCTET_STREAM
    } else {
        CONTENT_TYPE_TEXT
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        _ => "Unknown",
    }
}

/// Writes the status line, `content-type`, `content-length` and body, then flushes.
pub async fn write_response<W>(writer: &mut W, response: &HttpResponse, version: u8) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut head = format!(
        "HTTP/1.{} {} {}\r\n",
        version,
        response.status,
        reason_phrase(response.status)
    );
    if let Some(content_type) = &response.content_type {
        head.push_str(&format!("Content-Type: {}\r\n", content_type));
    }
    head.push_str(&format!("Content-Length: {}\r\n", response.body.len()));
    head.push_str("Connection: close\r\n\r\n");

    writer.write_all(head.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await
}
