use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error_handling::types::SessionError;
use crate::event::Details;

/// Largest body prefix kept for the access event.
pub const MAX_BODY_CAPTURE: usize = 1024;
/// Largest accepted request line plus header block.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;
pub const MAX_HEADERS: usize = 64;

/// One parsed request. The body holds at most [`MAX_BODY_CAPTURE`] bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub target: String,
    /// Minor version: `0` for HTTP/1.0, `1` for HTTP/1.1.
    pub version: u8,
    pub host: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Path component of the request target, without query or fragment.
    pub fn path(&self) -> &str {
        let mut target = self.target.as_str();
        if let Some(scheme_end) = target.find("://") {
            let rest = &target[scheme_end + 3..];
            target = rest.find('/').map(|i| &rest[i..]).unwrap_or("/");
        }
        let end = target.find(['?', '#']).unwrap_or(target.len());
        &target[..end]
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Headers grouped by canonical name, values in arrival order. `Host` is reported
    /// separately and left out.
    pub fn headers_detail(&self) -> Details {
        let mut grouped: Vec<(String, Vec<String>)> = Vec::new();
        for (name, value) in &self.headers {
            let name = canonical_header_name(name);
            if name == "Host" {
                continue;
            }
            match grouped.iter_mut().find(|(k, _)| *k == name) {
                Some((_, values)) => values.push(value.clone()),
                None => grouped.push((name, vec![value.clone()])),
            }
        }
        let mut details = Details::new();
        for (name, values) in grouped {
            details.insert(name, values);
        }
        details
    }
}

/// `content-type` → `Content-Type`.
pub fn canonical_header_name(name: &str) -> String {
    let mut upper = true;
    name.chars()
        .map(|c| {
            let mapped = if upper {
                c.to_ascii_uppercase()
            } else {
                c.to_ascii_lowercase()
            };
            upper = c == '-';
            mapped
        })
        .collect()
}

/// Reads one request head and up to [`MAX_BODY_CAPTURE`] bytes of its body.
///
/// # Errors
///
/// * `SessionError::Protocol` for malformed or oversized heads, or a stream closed early
/// * `SessionError::Io` if reading fails
pub async fn read_request<R>(reader: &mut R) -> Result<HttpRequest, SessionError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    let (mut request, consumed) = loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(SessionError::Protocol(
                "connection closed before request head".to_string(),
            ));
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut parsed = httparse::Request::new(&mut headers);
        match parsed.parse(&buf) {
            Ok(httparse::Status::Complete(consumed)) => break (from_parsed(&parsed), consumed),
            Ok(httparse::Status::Partial) => {
                if buf.len() > MAX_HEADER_BYTES {
                    return Err(SessionError::Protocol("request head too large".to_string()));
                }
            }
            Err(e) => return Err(SessionError::Protocol(format!("malformed request: {}", e))),
        }
    };

    let mut body: Vec<u8> = buf[consumed..].to_vec();
    let declared = request
        .header("content-length")
        .and_then(|v| v.trim().parse::<usize>().ok());
    match declared {
        Some(length) => {
            let wanted = length.min(MAX_BODY_CAPTURE);
            while body.len() < wanted {
                let n = reader.read(&mut chunk).await?;
                if n == 0 {
                    break;
                }
                body.extend_from_slice(&chunk[..n]);
            }
            body.truncate(wanted);
        }
        None => {
            // without a length only what already arrived with the head is kept
            let chunked = request
                .header("transfer-encoding")
                .is_some_and(|v| v.to_ascii_lowercase().contains("chunked"));
            if !chunked {
                body.clear();
            }
            body.truncate(MAX_BODY_CAPTURE);
        }
    }
    request.body = body;
    Ok(request)
}

fn from_parsed(parsed: &httparse::Request<'_, '_>) -> HttpRequest {
    let headers: Vec<(String, String)> = parsed
        .headers
        .iter()
        .map(|h| {
            (
                h.name.to_string(),
                String::from_utf8_lossy(h.value).into_owned(),
            )
        })
        .collect();
    let target = parsed.path.unwrap_or("/").to_string();
    let host = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("host"))
        .map(|(_, v)| v.clone())
        .unwrap_or_default();

    HttpRequest {
        method: parsed.method.unwrap_or_default().to_string(),
        target,
        version: parsed.version.unwrap_or(1),
        host,
        headers,
        body: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    #[tokio::test]
    async fn test_reads_head_and_body() {
        let mut mock = Builder::new()
            .read(b"POST /login?next=/ HTTP/1.1\r\nHost: example.com\r\nuser-agent: curl\r\n")
            .read(b"Content-Length: 5\r\n\r\nab")
            .read(b"cde")
            .build();
        let request = read_request(&mut mock).await.unwrap();
        assert_eq!(request.method, "POST");
        assert_eq!(request.target, "/login?next=/");
        assert_eq!(request.path(), "/login");
        assert_eq!(request.host, "example.com");
        assert_eq!(request.version, 1);
        assert_eq!(request.body, b"abcde");
    }

    #[tokio::test]
    async fn test_body_is_capped() {
        let mut input = b"PUT / HTTP/1.0\r\nContent-Length: 4096\r\n\r\n".to_vec();
        input.extend(std::iter::repeat(b'x').take(4096));
        let mut mock = Builder::new().read(&input).build();
        let request = read_request(&mut mock).await.unwrap();
        assert_eq!(request.version, 0);
        assert_eq!(request.body.len(), MAX_BODY_CAPTURE);
    }

    #[tokio::test]
    async fn test_garbage_is_rejected() {
        let mut mock = Builder::new().read(b"\x16\x03\x01\x02\x00\x01\x00\x01\xfc\r\n\r\n").build();
        assert!(matches!(
            read_request(&mut mock).await,
            Err(SessionError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_early_close_is_rejected() {
        let mut mock = Builder::new().read(b"GET / HTTP/1.1\r\nHost: a").build();
        assert!(read_request(&mut mock).await.is_err());
    }

    #[test]
    fn test_headers_detail_groups_canonical_names() {
        let request = HttpRequest {
            method: "GET".to_string(),
            target: "http://example.com/a/b?x".to_string(),
            version: 1,
            host: "example.com".to_string(),
            headers: vec![
                ("host".to_string(), "example.com".to_string()),
                ("accept".to_string(), "*/*".to_string()),
                ("x-forwarded-for".to_string(), "1.1.1.1".to_string()),
                ("Accept".to_string(), "text/html".to_string()),
            ],
            body: Vec::new(),
        };
        assert_eq!(request.path(), "/a/b");
        let json = serde_json::to_string(&request.headers_detail()).unwrap();
        assert_eq!(
            json,
            r#"{"Accept":["*/*","text/html"],"X-Forwarded-For":["1.1.1.1"]}"#
        );
    }
}
