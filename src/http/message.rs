//! HTTP message model: first line, headers, and content framing (spec §3.2,
//! §4.3). Grounded on `original_source/pcomn_http/http_message.cpp` for the
//! header/flag cross-update rules.

use std::fmt;
use std::str::FromStr;

use super::error::HttpError;
use super::status::reason_phrase;

/// HTTP protocol version; spec requires exactly 1.0 or 1.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_1_0: HttpVersion = HttpVersion { major: 1, minor: 0 };
    pub const HTTP_1_1: HttpVersion = HttpVersion { major: 1, minor: 1 };

    fn parse(s: &str) -> Result<Self, HttpError> {
        let rest = s
            .strip_prefix("HTTP/")
            .ok_or_else(|| HttpError::UnsupportedVersion(s.to_string()))?;
        let (major_s, minor_s) = rest
            .split_once('.')
            .ok_or_else(|| HttpError::UnsupportedVersion(s.to_string()))?;
        let major: u8 = major_s
            .parse()
            .map_err(|_| HttpError::UnsupportedVersion(s.to_string()))?;
        let minor: u8 = minor_s
            .parse()
            .map_err(|_| HttpError::UnsupportedVersion(s.to_string()))?;
        let version = HttpVersion { major, minor };
        if version != HttpVersion::HTTP_1_0 && version != HttpVersion::HTTP_1_1 {
            return Err(HttpError::UnsupportedVersion(s.to_string()));
        }
        Ok(version)
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/{}.{}", self.major, self.minor)
    }
}

/// Request method (spec §3.2); unrecognised tokens fall into `Extension`
/// when the connection's allow-extension-methods flag permits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Trace,
    Connect,
    Extension(String),
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Extension(s) => s,
        };
        write!(f, "{s}")
    }
}

impl FromStr for Method {
    type Err = HttpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "GET" => Method::Get,
            "HEAD" => Method::Head,
            "POST" => Method::Post,
            "PUT" => Method::Put,
            "DELETE" => Method::Delete,
            "TRACE" => Method::Trace,
            "CONNECT" => Method::Connect,
            "" => return Err(HttpError::InvalidMethod("empty method token".to_string())),
            other => Method::Extension(other.to_string()),
        })
    }
}

/// How a message's body boundary is determined (spec §4.3, Glossary
/// "Content framing").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFraming {
    /// `Content-Length: N` — exactly N body bytes follow.
    Length(u64),
    /// `Transfer-Encoding: chunked`.
    Chunked,
    /// Neither header present, but `Content-Type` is: body runs until the
    /// peer closes the connection.
    Unbound,
    /// Neither header present, no `Content-Type`: zero-length body.
    Empty,
}

/// Per-message behaviour flags (spec §3.2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFlags {
    pub chunked: bool,
    pub close_connection: bool,
    pub keep_alive: bool,
    pub use_relative_uri: bool,
    pub allow_extension_methods: bool,
    pub allow_arbitrary_headers: bool,
}

/// Case-insensitive header multimap preserving insertion order (spec
/// §3.2). Names are stored lowercase; emission capitalises the first
/// letter and every letter following a dash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Headers::default()
    }

    /// Replaces every existing value for `name` with a single `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        self.entries.retain(|(k, _)| k != &key);
        self.entries.push((key, value.into()));
    }

    /// Appends `value` for `name`, keeping any existing values.
    pub fn append(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        self.entries.push((key, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        let key = name.to_ascii_lowercase();
        self.entries
            .iter()
            .find(|(k, _)| k == &key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> {
        let key = name.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn remove(&mut self, name: &str) {
        let key = name.to_ascii_lowercase();
        self.entries.retain(|(k, _)| k != &key);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Capitalises the first letter and every letter following a dash, per
/// spec §3.2 emission rule (`content-length` -> `Content-Length`).
fn capitalize_header_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut capitalize_next = true;
    for c in name.chars() {
        if capitalize_next {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        capitalize_next = c == '-';
    }
    out
}

/// Attributes shared by requests and responses (spec §3.2).
#[derive(Debug, Clone)]
pub struct MessageCore {
    pub version: HttpVersion,
    pub headers: Headers,
    pub flags: MessageFlags,
}

impl MessageCore {
    fn new(version: HttpVersion) -> Self {
        MessageCore {
            version,
            headers: Headers::new(),
            flags: MessageFlags::default(),
        }
    }

    /// Cross-updates per spec §3.2: `content-length` and chunked transfer
    /// are mutually exclusive, last write wins.
    pub fn set_content_length(&mut self, n: u64) {
        self.flags.chunked = false;
        self.headers.remove("transfer-encoding");
        self.headers.set("content-length", n.to_string());
    }

    pub fn set_chunked(&mut self) {
        self.headers.remove("content-length");
        self.flags.chunked = true;
        self.headers.set("transfer-encoding", "chunked");
    }

    pub fn set_connection(&mut self, value: &str) {
        match value.to_ascii_lowercase().as_str() {
            "close" => {
                self.flags.close_connection = true;
                self.flags.keep_alive = false;
            }
            "keep-alive" => {
                self.flags.keep_alive = true;
                self.flags.close_connection = false;
            }
            _ => {}
        }
        self.headers.set("connection", value);
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }

    pub fn set_content_type(&mut self, value: impl Into<String>) {
        self.headers.set("content-type", value);
    }

    pub fn host(&self) -> Option<&str> {
        self.headers.get("host")
    }

    /// Whether the connection should stay open after this message,
    /// derived from version and the explicit `Connection` flags rather
    /// than the raw header text (spec §4.4: 1.1 defaults to keep-alive
    /// unless `Connection: close` was seen; 1.0 defaults to close unless
    /// `Connection: keep-alive` was seen).
    pub fn wants_keep_alive(&self) -> bool {
        if self.flags.close_connection {
            return false;
        }
        if self.flags.keep_alive {
            return true;
        }
        self.version == HttpVersion::HTTP_1_1
    }

    /// Re-derives `flags.chunked`/`close_connection`/`keep_alive` from
    /// already-stored headers, for messages just populated by [`HttpRequest::parse`]
    /// / [`HttpResponse::parse`] rather than built through the setters.
    fn derive_flags_from_headers(&mut self) {
        self.flags.chunked = self
            .headers
            .get("transfer-encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false);
        match self.headers.get("connection").map(str::to_ascii_lowercase) {
            Some(ref v) if v == "close" => self.flags.close_connection = true,
            Some(ref v) if v == "keep-alive" => self.flags.keep_alive = true,
            _ => {}
        }
    }

    /// Determines the content framing mode from the currently-stored
    /// headers (spec §4.3).
    pub fn content_framing(&self) -> ContentFraming {
        if let Some(len) = self.headers.get("content-length") {
            if let Ok(n) = len.trim().parse::<u64>() {
                return ContentFraming::Length(n);
            }
        }
        if self
            .headers
            .get("transfer-encoding")
            .map(|v| v.eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
        {
            return ContentFraming::Chunked;
        }
        if self.content_type().is_some() {
            return ContentFraming::Unbound;
        }
        ContentFraming::Empty
    }

    fn write_headers(&self, out: &mut String, line_terminator: &str) {
        for (name, value) in self.headers.iter() {
            out.push_str(&capitalize_header_name(name));
            out.push_str(": ");
            out.push_str(value);
            out.push_str(line_terminator);
        }
        out.push_str(line_terminator);
    }
}

fn parse_header_lines<'a>(lines: &mut impl Iterator<Item = &'a str>) -> Result<Headers, HttpError> {
    let mut headers = Headers::new();
    let mut last_name: Option<String> = None;
    for line in lines {
        if line.is_empty() {
            break;
        }
        if line.starts_with(' ') || line.starts_with('\t') {
            let name = last_name
                .clone()
                .ok_or_else(|| HttpError::InvalidHeader("continuation with no header".into()))?;
            let trimmed = line.trim();
            let key = name.to_ascii_lowercase();
            if let Some(entry) = headers.entries.iter_mut().rev().find(|(k, _)| k == &key) {
                entry.1.push(' ');
                entry.1.push_str(trimmed);
            }
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| HttpError::InvalidHeader(line.to_string()))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(HttpError::InvalidHeader(line.to_string()));
        }
        let value = value.trim();
        headers.append(name, value);
        last_name = Some(name.to_string());
    }
    Ok(headers)
}

/// An HTTP request: method, request target, and the shared message core
/// (spec §3.2).
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub core: MessageCore,
    pub method: Method,
    pub target: String,
    query: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn new(method: Method, target: impl Into<String>, version: HttpVersion) -> Self {
        let target = target.into();
        let query = parse_query(&target);
        HttpRequest {
            core: MessageCore::new(version),
            method,
            target,
            query,
        }
    }

    pub fn query(&self) -> &[(String, String)] {
        &self.query
    }

    /// Convenience combining `Content-Type` and `Content-Length` from a
    /// body buffer in one call, mirroring the original's `set_content`.
    /// The body itself is not retained on the message; callers still
    /// write it through [`super::connection::Connection::transmit`].
    pub fn with_body(mut self, content_type: impl Into<String>, body: &[u8]) -> Self {
        self.core.set_content_type(content_type);
        self.core.set_content_length(body.len() as u64);
        self
    }

    pub fn set_query_param(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        if let Some(entry) = self.query.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value.into();
        } else {
            self.query.push((key, value.into()));
        }
        self.resync_target();
    }

    fn resync_target(&mut self) {
        let path = self.target.split('?').next().unwrap_or("").to_string();
        if self.query.is_empty() {
            self.target = path;
            return;
        }
        let mut out = path;
        out.push('?');
        for (i, (k, v)) in self.query.iter().enumerate() {
            if i > 0 {
                out.push('&');
            }
            out.push_str(&percent_encode(k));
            out.push('=');
            out.push_str(&percent_encode(v));
        }
        self.target = out;
    }

    /// Parses a request line + header block (spec §4.3); the blank line
    /// terminating the header section must already be present in `text`.
    pub fn parse(text: &str) -> Result<Self, HttpError> {
        let mut lines = text.split("\r\n").flat_map(|l| {
            if l.contains('\n') {
                l.split('\n').collect::<Vec<_>>()
            } else {
                vec![l]
            }
        });
        let first_line = lines
            .next()
            .ok_or_else(|| HttpError::InvalidRequest("empty request".into()))?;
        let mut parts = first_line.splitn(3, ' ');
        let method_s = parts
            .next()
            .ok_or_else(|| HttpError::InvalidRequest(first_line.to_string()))?;
        let target = parts
            .next()
            .ok_or_else(|| HttpError::InvalidRequest(first_line.to_string()))?;
        let version_s = parts
            .next()
            .ok_or_else(|| HttpError::InvalidRequest(first_line.to_string()))?;
        let method = Method::from_str(method_s)?;
        let version = HttpVersion::parse(version_s)?;
        let headers = parse_header_lines(&mut lines)?;

        let mut request = HttpRequest::new(method, target, version);
        request.core.headers = headers;
        request.core.derive_flags_from_headers();
        Ok(request)
    }

    pub fn emit(&self, line_terminator: &str) -> String {
        let mut out = String::new();
        out.push_str(&self.method.to_string());
        out.push(' ');
        out.push_str(&self.target);
        out.push(' ');
        out.push_str(&self.core.version.to_string());
        out.push_str(line_terminator);
        self.core.write_headers(&mut out, line_terminator);
        out
    }
}

/// An HTTP response: numeric status plus reason phrase (spec §3.2).
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub core: MessageCore,
    status: u16,
    reason: String,
}

impl HttpResponse {
    pub fn new(version: HttpVersion, status: u16) -> Result<Self, HttpError> {
        if !(100..=599).contains(&status) {
            return Err(HttpError::ResponseError(format!(
                "status code {status} out of range 100..=599"
            )));
        }
        Ok(HttpResponse {
            core: MessageCore::new(version),
            status,
            reason: reason_phrase(status).to_string(),
        })
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }

    pub fn is_informational(&self) -> bool {
        (100..200).contains(&self.status)
    }

    /// Convenience combining `Content-Type` and `Content-Length` from a
    /// body buffer in one call, mirroring the original's `set_content`.
    /// The body itself is not retained on the message; callers still
    /// write it through [`super::connection::Connection::transmit`].
    pub fn with_body(mut self, content_type: impl Into<String>, body: &[u8]) -> Self {
        self.core.set_content_type(content_type);
        self.core.set_content_length(body.len() as u64);
        self
    }

    pub fn parse(text: &str) -> Result<Self, HttpError> {
        let mut lines = text.split("\r\n").flat_map(|l| {
            if l.contains('\n') {
                l.split('\n').collect::<Vec<_>>()
            } else {
                vec![l]
            }
        });
        let first_line = lines
            .next()
            .ok_or_else(|| HttpError::ResponseError("empty response".into()))?;
        let mut parts = first_line.splitn(3, ' ');
        let version_s = parts
            .next()
            .ok_or_else(|| HttpError::ResponseError(first_line.to_string()))?;
        let status_s = parts
            .next()
            .ok_or_else(|| HttpError::ResponseError(first_line.to_string()))?;
        let reason = parts.next().unwrap_or("").to_string();
        let version = HttpVersion::parse(version_s)?;
        let status: u16 = status_s
            .parse()
            .map_err(|_| HttpError::ResponseError(first_line.to_string()))?;
        let headers = parse_header_lines(&mut lines)?;

        let mut response = HttpResponse::new(version, status)?;
        response.reason = if reason.is_empty() {
            reason_phrase(status).to_string()
        } else {
            reason
        };
        response.core.headers = headers;
        response.core.derive_flags_from_headers();
        Ok(response)
    }

    pub fn emit(&self, line_terminator: &str) -> String {
        let mut out = String::new();
        out.push_str(&self.core.version.to_string());
        out.push(' ');
        out.push_str(&self.status.to_string());
        out.push(' ');
        out.push_str(&self.reason);
        out.push_str(line_terminator);
        self.core.write_headers(&mut out, line_terminator);
        out
    }
}

fn parse_query(target: &str) -> Vec<(String, String)> {
    let query = match target.split_once('?') {
        Some((_, q)) => q,
        None => return Vec::new(),
    };
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(k), percent_decode(v))
        })
        .collect()
}

fn percent_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                if let Ok(byte) = u8::from_str_radix(&s[i + 1..i + 3], 16) {
                    out.push(byte);
                    i += 3;
                } else {
                    out.push(bytes[i]);
                    i += 1;
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_case_insensitivity() {
        let mut headers = Headers::new();
        headers.set("Content-Length", "5");
        assert_eq!(headers.get("content-length"), Some("5"));
    }

    #[test]
    fn content_length_clears_chunked() {
        let mut core = MessageCore::new(HttpVersion::HTTP_1_1);
        core.set_chunked();
        core.set_content_length(10);
        assert!(!core.flags.chunked);
        assert_eq!(core.headers.get("transfer-encoding"), None);
        assert_eq!(core.content_framing(), ContentFraming::Length(10));
    }

    #[test]
    fn chunked_clears_content_length() {
        let mut core = MessageCore::new(HttpVersion::HTTP_1_1);
        core.set_content_length(10);
        core.set_chunked();
        assert_eq!(core.headers.get("content-length"), None);
        assert_eq!(core.content_framing(), ContentFraming::Chunked);
    }

    #[test]
    fn request_round_trip() {
        let text = "GET /index HTTP/1.1\r\nHost: example\r\n\r\n";
        let request = HttpRequest::parse(text).unwrap();
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.target, "/index");
        assert_eq!(request.core.host(), Some("example"));
        assert_eq!(request.emit("\r\n"), text);
    }

    #[test]
    fn response_round_trip() {
        let text = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n";
        let response = HttpResponse::parse(text).unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(response.core.content_framing(), ContentFraming::Length(5));
        assert_eq!(response.emit("\r\n"), text);
    }

    #[test]
    fn query_dict_round_trips() {
        let request = HttpRequest::new(Method::Get, "/search?q=rust+lang", HttpVersion::HTTP_1_1);
        assert_eq!(request.query(), &[("q".to_string(), "rust lang".to_string())]);
    }

    #[test]
    fn unknown_status_rejected_outside_range() {
        assert!(HttpResponse::new(HttpVersion::HTTP_1_1, 99).is_err());
        assert!(HttpResponse::new(HttpVersion::HTTP_1_1, 600).is_err());
    }

    #[test]
    fn with_body_sets_type_and_length() {
        let request = HttpRequest::new(Method::Post, "/", HttpVersion::HTTP_1_1)
            .with_body("text/plain", b"hello");
        assert_eq!(request.core.content_type(), Some("text/plain"));
        assert_eq!(request.core.content_framing(), ContentFraming::Length(5));

        let response = HttpResponse::new(HttpVersion::HTTP_1_1, 200)
            .unwrap()
            .with_body("application/json", b"{}");
        assert_eq!(response.core.content_type(), Some("application/json"));
        assert_eq!(response.core.content_framing(), ContentFraming::Length(2));
    }

    #[test]
    fn wants_keep_alive_defaults_by_version() {
        let http11 = MessageCore::new(HttpVersion::HTTP_1_1);
        assert!(http11.wants_keep_alive());
        let http10 = MessageCore::new(HttpVersion::HTTP_1_0);
        assert!(!http10.wants_keep_alive());
    }

    #[test]
    fn wants_keep_alive_honours_explicit_connection_header() {
        let mut closing = MessageCore::new(HttpVersion::HTTP_1_1);
        closing.set_connection("close");
        assert!(!closing.wants_keep_alive());

        let mut kept_alive = MessageCore::new(HttpVersion::HTTP_1_0);
        kept_alive.set_connection("keep-alive");
        assert!(kept_alive.wants_keep_alive());
    }
}
