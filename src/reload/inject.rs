//! Bootstrap script injection for HTML responses.
//!
//! Adds `<script src="//{host}/livereload.js"></script>` right before the
//! first `</head>`. Compressed bodies (`gzip`, `deflate`) are decoded,
//! rewritten and encoded again with the same codec. Anything that cannot
//! be handled safely passes through untouched:
//!
//! - non-HTML content types
//! - unknown content encodings
//! - bodies that fail to decode
//! - documents without `</head>` (logged once)

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::HeaderMap;
use axum::http::header::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HOST};
use axum::middleware::Next;
use axum::response::Response;
use flate2::Compression;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};

use super::server::SCRIPT_PATH;
use crate::{debug, log};

const HEAD_CLOSE: &[u8] = b"</head>";

static NO_HEAD_LOGGED: AtomicBool = AtomicBool::new(false);

/// Body codec named by `Content-Encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Identity,
    Gzip,
    /// HTTP `deflate`: zlib framing (RFC 9110)
    Zlib,
    /// HTTP `deflate` sent as a raw stream by some servers
    RawDeflate,
}

impl Codec {
    /// `None` for encodings the injector does not handle.
    fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let value = match headers.get(CONTENT_ENCODING) {
            None => return Some(Self::Identity),
            Some(v) => v.to_str().ok()?.trim().to_ascii_lowercase(),
        };
        match value.as_str() {
            "" | "identity" => Some(Self::Identity),
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Zlib),
            _ => None,
        }
    }

    /// Decode the body, settling the deflate framing on the way.
    fn decode(self, body: &[u8]) -> std::io::Result<(Self, Vec<u8>)> {
        let mut out = Vec::with_capacity(body.len() * 4);
        match self {
            Self::Identity => out.extend_from_slice(body),
            Self::Gzip => {
                GzDecoder::new(body).read_to_end(&mut out)?;
            }
            Self::Zlib | Self::RawDeflate => {
                if ZlibDecoder::new(body).read_to_end(&mut out).is_ok() {
                    return Ok((Self::Zlib, out));
                }
                out.clear();
                DeflateDecoder::new(body).read_to_end(&mut out)?;
                return Ok((Self::RawDeflate, out));
            }
        }
        Ok((self, out))
    }

    fn encode(self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let level = Compression::default();
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Gzip => {
                let mut enc = GzEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
            Self::Zlib => {
                let mut enc = ZlibEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
            Self::RawDeflate => {
                let mut enc = DeflateEncoder::new(Vec::new(), level);
                enc.write_all(data)?;
                enc.finish()
            }
        }
    }
}

/// Whether the response carries HTML.
pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("html"))
}

/// The tag inserted before `</head>`.
pub fn script_tag(host: Option<&str>) -> String {
    match host {
        Some(host) if !host.is_empty() => format!(r#"<script src="//{host}{SCRIPT_PATH}"></script>"#),
        _ => format!(r#"<script src="{SCRIPT_PATH}"></script>"#),
    }
}

/// Insert `tag` before the first `</head>` (ASCII case-insensitive).
pub fn inject_html(html: &[u8], tag: &str) -> Option<Vec<u8>> {
    let pos = html
        .windows(HEAD_CLOSE.len())
        .position(|w| w.eq_ignore_ascii_case(HEAD_CLOSE))?;
    let mut out = Vec::with_capacity(html.len() + tag.len());
    out.extend_from_slice(&html[..pos]);
    out.extend_from_slice(tag.as_bytes());
    out.extend_from_slice(&html[pos..]);
    Some(out)
}

/// Rewrite a complete response body.
///
/// Returns the body to send; `headers` lose `Content-Length` whenever the
/// body changed.
pub fn rewrite(headers: &mut HeaderMap, body: Bytes, host: Option<&str>) -> Bytes {
    if !is_html(headers) {
        return body;
    }
    let Some(codec) = Codec::from_headers(headers) else {
        return body;
    };

    let (codec, html) = match codec.decode(&body) {
        Ok(decoded) => decoded,
        Err(e) => {
            debug!("inject"; "cannot decode {:?} body: {}", codec, e);
            return body;
        }
    };

    let Some(injected) = inject_html(&html, &script_tag(host)) else {
        if !NO_HEAD_LOGGED.swap(true, Ordering::Relaxed) {
            log!("inject"; "html response without </head>, live reload script not injected");
        }
        return body;
    };

    match codec.encode(&injected) {
        Ok(encoded) => {
            headers.remove(CONTENT_LENGTH);
            Bytes::from(encoded)
        }
        Err(e) => {
            debug!("inject"; "cannot encode {:?} body: {}", codec, e);
            body
        }
    }
}

/// `axum` middleware wrapping every non-reserved response.
pub async fn layer(request: Request, next: Next) -> Response {
    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);

    let response = next.run(request).await;
    if !is_html(response.headers()) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log!("inject"; "failed to read response body: {}", e);
            parts.headers.remove(CONTENT_LENGTH);
            return Response::from_parts(parts, Body::empty());
        }
    };

    let bytes = rewrite(&mut parts.headers, bytes, host.as_deref());
    Response::from_parts(parts, Body::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const PAGE: &str = "<html><head><title>X</title></head><body>Y</body></html>";
    const INJECTED: &str = r#"<html><head><title>X</title><script src="//h/livereload.js"></script></head><body>Y</body></html>"#;

    fn headers(content_type: &str, encoding: Option<&str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        h.insert(CONTENT_LENGTH, HeaderValue::from_static("999"));
        if let Some(enc) = encoding {
            h.insert(CONTENT_ENCODING, HeaderValue::from_str(enc).unwrap());
        }
        h
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    #[test]
    fn test_plain_html() {
        let mut h = headers("text/html; charset=utf-8", None);
        let out = rewrite(&mut h, Bytes::from_static(PAGE.as_bytes()), Some("h"));
        assert_eq!(out, INJECTED.as_bytes());
        assert!(h.get(CONTENT_LENGTH).is_none());
    }

    #[test]
    fn test_gzip_html() {
        let mut h = headers("text/html", Some("gzip"));
        let body = Codec::Gzip.encode(PAGE.as_bytes()).unwrap();
        let out = rewrite(&mut h, Bytes::from(body), Some("h"));

        assert_eq!(gunzip(&out), INJECTED);
        assert!(h.get(CONTENT_LENGTH).is_none());
        assert_eq!(h.get(CONTENT_ENCODING).unwrap(), "gzip");
    }

    #[test]
    fn test_deflate_keeps_framing() {
        for codec in [Codec::Zlib, Codec::RawDeflate] {
            let mut h = headers("text/html", Some("deflate"));
            let body = codec.encode(PAGE.as_bytes()).unwrap();
            let out = rewrite(&mut h, Bytes::from(body), Some("h"));

            let (framing, decoded) = Codec::Zlib.decode(&out).unwrap();
            assert_eq!(framing, codec);
            assert_eq!(decoded, INJECTED.as_bytes());
            assert_eq!(h.get(CONTENT_ENCODING).unwrap(), "deflate");
        }
    }

    #[test]
    fn test_non_html_passthrough() {
        let mut h = headers("application/json", None);
        let body = Bytes::from_static(b"{\"head\":\"</head>\"}");
        let out = rewrite(&mut h, body.clone(), Some("h"));
        assert_eq!(out, body);
        assert_eq!(h.get(CONTENT_LENGTH).unwrap(), "999");
    }

    #[test]
    fn test_missing_head_passthrough() {
        let mut h = headers("text/html", None);
        let body = Bytes::from_static(b"<p>fragment</p>");
        let out = rewrite(&mut h, body.clone(), Some("h"));
        assert_eq!(out, body);
        assert!(h.get(CONTENT_LENGTH).is_some());
    }

    #[test]
    fn test_corrupt_gzip_passthrough() {
        let mut h = headers("text/html", Some("gzip"));
        let body = Bytes::from_static(b"definitely not gzip");
        let out = rewrite(&mut h, body.clone(), Some("h"));
        assert_eq!(out, body);
    }

    #[test]
    fn test_unknown_encoding_passthrough() {
        let mut h = headers("text/html", Some("br"));
        let body = Bytes::from_static(b"\x1b\x00brotli");
        assert_eq!(rewrite(&mut h, body.clone(), Some("h")), body);
    }

    #[test]
    fn test_first_head_only_and_case() {
        let out = inject_html(b"<HEAD></HEAD><x></head>", "<s>").unwrap();
        assert_eq!(out, b"<HEAD><s></HEAD><x></head>");
    }

    #[test]
    fn test_script_tag_without_host() {
        assert_eq!(script_tag(None), r#"<script src="/livereload.js"></script>"#);
        assert_eq!(script_tag(Some("localhost:5000")), r#"<script src="//localhost:5000/livereload.js"></script>"#);
    }
}
