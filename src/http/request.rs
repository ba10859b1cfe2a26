//! Request model.
//!
//! # Responsibilities
//! - Describe a request exactly as it should go on the wire
//! - Hold the cookie jar that responses write into
//! - Expose the body as a tagged union of content kinds
//!
//! # Design Decisions
//! - The caller owns the request; the engine borrows it mutably so redirect
//!   policy changes (method, URI, headers, cookies) stay visible afterwards
//! - Headers keep declaration order and spelling

use bytes::Bytes;
use http::Method;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

use crate::error::{EngineError, EngineResult};
use crate::http::cookies::CookieJar;
use crate::http::headers::HeaderList;

/// Protocol version written in the request line, e.g. `1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HttpVersion {
    pub major: u8,
    pub minor: u8,
}

impl HttpVersion {
    pub const HTTP_10: HttpVersion = HttpVersion::new(1, 0);
    pub const HTTP_11: HttpVersion = HttpVersion::new(1, 1);

    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }
}

impl Default for HttpVersion {
    fn default() -> Self {
        Self::HTTP_11
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for HttpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, minor),
            None => (s, "0"),
        };
        let major = major.trim().parse().map_err(|_| format!("invalid HTTP version {:?}", s))?;
        let minor = minor.trim().parse().map_err(|_| format!("invalid HTTP version {:?}", s))?;
        Ok(Self { major, minor })
    }
}

/// Request content, one case per content kind.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// UTF-8 text.
    Text { content: String, content_type: String },
    /// Raw bytes.
    Bytes { data: Bytes, content_type: Option<String> },
    /// `application/x-www-form-urlencoded` fields.
    Form { fields: Vec<(String, String)> },
    /// File contents read when the request is written.
    File { path: PathBuf, content_type: Option<String> },
}

impl RequestBody {
    pub fn text(content: impl Into<String>, content_type: impl Into<String>) -> Self {
        RequestBody::Text {
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    pub fn bytes(data: impl Into<Bytes>) -> Self {
        RequestBody::Bytes {
            data: data.into(),
            content_type: None,
        }
    }

    pub fn form<K: Into<String>, V: Into<String>>(fields: impl IntoIterator<Item = (K, V)>) -> Self {
        RequestBody::Form {
            fields: fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Headers describing this content, e.g. `Content-Type`.
    pub fn content_headers(&self) -> HeaderList {
        let mut headers = HeaderList::new();
        match self {
            RequestBody::Text { content_type, .. } => headers.push("Content-Type", content_type.clone()),
            RequestBody::Bytes { content_type, .. } | RequestBody::File { content_type, .. } => {
                if let Some(content_type) = content_type {
                    headers.push("Content-Type", content_type.clone());
                }
            }
            RequestBody::Form { .. } => headers.push("Content-Type", "application/x-www-form-urlencoded"),
        }
        headers
    }

    /// Produce the bytes to send.
    pub async fn to_bytes(&self) -> EngineResult<Bytes> {
        match self {
            RequestBody::Text { content, .. } => Ok(Bytes::copy_from_slice(content.as_bytes())),
            RequestBody::Bytes { data, .. } => Ok(data.clone()),
            RequestBody::Form { fields } => {
                let encoded = url::form_urlencoded::Serializer::new(String::new())
                    .extend_pairs(fields.iter())
                    .finish();
                Ok(Bytes::from(encoded))
            }
            RequestBody::File { path, .. } => Ok(Bytes::from(tokio::fs::read(path).await?)),
        }
    }
}

/// A body ready to be written: its bytes and its content headers.
#[derive(Debug, Clone)]
pub struct EncodedBody {
    pub data: Bytes,
    pub headers: HeaderList,
}

impl EncodedBody {
    pub async fn encode(body: &RequestBody) -> EngineResult<Self> {
        Ok(Self {
            data: body.to_bytes().await?,
            headers: body.content_headers(),
        })
    }
}

/// An HTTP request described exactly as it will be written.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Url,
    pub version: HttpVersion,
    pub headers: HeaderList,
    pub cookies: CookieJar,
    pub body: Option<RequestBody>,
    /// Write the absolute URI in the request line instead of the path.
    pub absolute_uri_in_first_line: bool,
}

impl HttpRequest {
    pub fn new(method: Method, uri: Url) -> Self {
        Self {
            method,
            uri,
            version: HttpVersion::HTTP_11,
            headers: HeaderList::new(),
            cookies: CookieJar::new(),
            body: None,
            absolute_uri_in_first_line: false,
        }
    }

    /// Build a GET request from a URL string.
    pub fn get(uri: &str) -> EngineResult<Self> {
        Ok(Self::new(Method::GET, parse_uri(uri)?))
    }

    /// Build a POST request from a URL string.
    pub fn post(uri: &str, body: RequestBody) -> EngineResult<Self> {
        Ok(Self::new(Method::POST, parse_uri(uri)?).with_body(body))
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.add_header(name, value);
        self
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    /// Set a header, replacing any previous header of the same name.
    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        if name.eq_ignore_ascii_case("host") {
            self.headers.set("Host", value);
        } else {
            self.headers.set(name, value);
        }
    }

    /// Add a cookie for the current request host.
    pub fn set_cookie(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let host = self.host().unwrap_or_default();
        self.cookies.insert(&host, name, value);
    }

    /// Host of the request URI, without brackets for IPv6.
    pub fn host(&self) -> Option<String> {
        host_of(&self.uri)
    }
}

pub(crate) fn parse_uri(uri: &str) -> EngineResult<Url> {
    Url::parse(uri).map_err(|e| EngineError::InvalidRequest(format!("invalid URI {:?}: {}", uri, e)))
}

pub(crate) fn host_of(uri: &Url) -> Option<String> {
    match uri.host()? {
        url::Host::Domain(domain) => Some(domain.to_ascii_lowercase()),
        url::Host::Ipv4(addr) => Some(addr.to_string()),
        url::Host::Ipv6(addr) => Some(addr.to_string()),
    }
}

/// Where a request must be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl Target {
    pub fn from_uri(uri: &Url) -> EngineResult<Self> {
        let tls = match uri.scheme() {
            "http" => false,
            "https" => true,
            other => {
                return Err(EngineError::InvalidRequest(format!("unsupported scheme {:?}", other)));
            }
        };
        let host = host_of(uri)
            .ok_or_else(|| EngineError::InvalidRequest(format!("URI {} has no host", uri)))?;
        let port = uri
            .port_or_known_default()
            .ok_or_else(|| EngineError::InvalidRequest(format!("URI {} has no port", uri)))?;
        Ok(Self { host, port, tls })
    }

    /// Pool key, `host:port`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
