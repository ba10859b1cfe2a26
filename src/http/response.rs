//! Response model.
//!
//! # Responsibilities
//! - Carry the status, both header lists and the body of the final response
//! - Point back at the request that produced it (final URI and method)
//! - Keep the exact bytes of the last request written
//!
//! # Design Decisions
//! - Eager bodies are already decompressed; lazy bodies are framing-decoded
//!   only and decompressed by `into_bytes`
//! - Dropping a response returns pooled buffers and, for an unfinished lazy
//!   body, destroys the connection

use bytes::Bytes;
use http::{Method, StatusCode};
use url::Url;

use crate::error::EngineResult;
use crate::http::buffer_pool::PooledBuffer;
use crate::http::compression::decode_body;
use crate::http::framing::BodyStream;
use crate::http::headers::HeaderList;
use crate::http::request::HttpVersion;

/// Body of a response.
#[derive(Debug)]
pub enum ResponseBody {
    /// No body on the wire.
    Empty,
    /// Body held in memory.
    Bytes(Bytes),
    /// Body held in a buffer borrowed from the engine's buffer pool.
    Pooled(PooledBuffer),
    /// Body still on the connection.
    Stream(BodyStream),
}

impl ResponseBody {
    /// In-memory content, `None` for a lazy body.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            ResponseBody::Empty => Some(&[]),
            ResponseBody::Bytes(bytes) => Some(bytes),
            ResponseBody::Pooled(buf) => Some(buf.as_slice()),
            ResponseBody::Stream(_) => None,
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, ResponseBody::Stream(_))
    }
}

/// The final response of an exchange.
#[derive(Debug)]
pub struct HttpResponse {
    pub version: HttpVersion,
    pub status: StatusCode,
    pub reason: String,
    /// General headers, duplicates joined with `", "`.
    pub headers: HeaderList,
    /// `Content-*`, `Last-Modified` and `Expires` headers.
    pub content_headers: HeaderList,
    pub body: ResponseBody,
    /// URI of the request that produced this response.
    pub uri: Url,
    /// Method of the request that produced this response.
    pub method: Method,
    /// Exact bytes of the last request written.
    pub raw_request: Bytes,
    /// A `Content-Encoding` could not be undone; the body holds raw bytes.
    pub decompression_failed: bool,
    /// Redirects followed before this response.
    pub redirects: u32,
}

impl HttpResponse {
    /// Look up a header in the general headers, then the content headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).or_else(|| self.content_headers.get(name))
    }

    /// In-memory body content, `None` for a lazy body.
    pub fn content_bytes(&self) -> Option<&[u8]> {
        self.body.as_bytes()
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> Option<String> {
        self.content_bytes()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    pub fn is_redirect(&self) -> bool {
        self.status.is_redirection()
    }

    /// Consume the response and return the decoded body, reading a lazy body
    /// to the end first.
    pub async fn into_bytes(self) -> EngineResult<Bytes> {
        match self.body {
            ResponseBody::Empty => Ok(Bytes::new()),
            ResponseBody::Bytes(bytes) => Ok(bytes),
            ResponseBody::Pooled(buf) => Ok(Bytes::copy_from_slice(&buf)),
            ResponseBody::Stream(mut stream) => {
                let raw = stream.read_to_end().await?;
                let encoding = self.content_headers.get("Content-Encoding");
                Ok(decode_body(encoding, raw).data)
            }
        }
    }

    /// Take the lazy body, if there is one.
    pub fn into_body_stream(self) -> Option<BodyStream> {
        match self.body {
            ResponseBody::Stream(stream) => Some(stream),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::buffer_pool::BufferPool;

    fn response(body: ResponseBody) -> HttpResponse {
        let mut headers = HeaderList::new();
        headers.push("Server", "test");
        let mut content_headers = HeaderList::new();
        content_headers.push("Content-Type", "text/plain");
        HttpResponse {
            version: HttpVersion::HTTP_11,
            status: StatusCode::OK,
            reason: "OK".into(),
            headers,
            content_headers,
            body,
            uri: Url::parse("http://example.com/").unwrap(),
            method: Method::GET,
            raw_request: Bytes::new(),
            decompression_failed: false,
            redirects: 0,
        }
    }

    #[test]
    fn header_lookup_falls_back_to_content_headers() {
        let response = response(ResponseBody::Empty);
        assert_eq!(response.header("server"), Some("test"));
        assert_eq!(response.header("content-type"), Some("text/plain"));
        assert_eq!(response.header("x-missing"), None);
    }

    #[tokio::test]
    async fn pooled_body_is_returned_after_into_bytes() {
        let pool = BufferPool::new(2, 0);
        let mut buf = pool.rent(8);
        buf.extend_from_slice(b"pooled");
        let response = response(ResponseBody::Pooled(buf));
        assert_eq!(response.text().as_deref(), Some("pooled"));
        assert_eq!(&response.into_bytes().await.unwrap()[..], b"pooled");
        assert_eq!(pool.available(), 1);
    }
}
