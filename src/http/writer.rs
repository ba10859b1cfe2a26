//! Request serialization.
//!
//! Writes the request line and header block into a `BytesMut` sink piece by
//! piece. Header synthesis rules:
//!
//! ```text
//! Host           ← URI host[:port]   only if no Host header is declared
//! Connection     ← Close             only if no Connection header is declared
//! declared headers, in order
//! Cookie         ← jar for the host  only if no Cookie header is declared
//! body headers                       only those not declared
//! Content-Length ← body length       only if non-zero and not present
//! ```
//!
//! Headers whose value is empty are never written, which lets a caller
//! suppress a synthesized header by declaring it empty.

use bytes::{BufMut, BytesMut};

use crate::error::{EngineError, EngineResult};
use crate::http::headers::HeaderList;
use crate::http::request::{host_of, EncodedBody, HttpRequest, HttpVersion};

const CRLF: &[u8] = b"\r\n";
const SPACE: &[u8] = b" ";
const COLON_SPACE: &[u8] = b": ";

/// Write the request line and headers of `request` into `sink`.
pub fn write_head(
    request: &HttpRequest,
    body: Option<&EncodedBody>,
    sink: &mut BytesMut,
) -> EngineResult<()> {
    write_first_line(request, sink)?;
    write_headers(request, body, sink)?;
    Ok(())
}

/// Write the whole request (head and body) into `sink`.
pub fn write_request(
    request: &HttpRequest,
    body: Option<&EncodedBody>,
    sink: &mut BytesMut,
) -> EngineResult<()> {
    write_head(request, body, sink)?;
    if let Some(body) = body {
        sink.put_slice(&body.data);
    }
    Ok(())
}

// GET /resource HTTP/1.1
fn write_first_line(request: &HttpRequest, sink: &mut BytesMut) -> EngineResult<()> {
    if request.version >= HttpVersion::new(2, 0) {
        return Err(EngineError::UnsupportedProtocolVersion(request.version));
    }

    sink.put_slice(request.method.as_str().as_bytes());
    sink.put_slice(SPACE);
    if request.absolute_uri_in_first_line {
        let mut uri = request.uri.clone();
        uri.set_fragment(None);
        sink.put_slice(uri.as_str().as_bytes());
    } else {
        sink.put_slice(request.uri.path().as_bytes());
        if let Some(query) = request.uri.query() {
            sink.put_u8(b'?');
            sink.put_slice(query.as_bytes());
        }
    }
    sink.put_slice(SPACE);
    sink.put_slice(format!("HTTP/{}", request.version).as_bytes());
    sink.put_slice(CRLF);
    Ok(())
}

fn write_headers(
    request: &HttpRequest,
    body: Option<&EncodedBody>,
    sink: &mut BytesMut,
) -> EngineResult<()> {
    let host = host_of(&request.uri)
        .ok_or_else(|| EngineError::InvalidRequest(format!("URI {} has no host", request.uri)))?;
    let mut written = HeaderList::new();

    if !request.headers.contains("Host") {
        written.push("Host", host_header(request));
    }

    if !request.headers.contains("Connection") {
        written.push("Connection", "Close");
    }

    for (name, value) in request.headers.iter() {
        written.push(name, value);
    }

    if !request.headers.contains("Cookie") {
        if let Some(cookie) = request.cookies.header_value(&host) {
            written.push("Cookie", cookie);
        }
    }

    if let Some(body) = body {
        for (name, value) in body.headers.iter() {
            if !request.headers.contains(name) {
                written.push(name, value);
            }
        }

        if !written.contains("Content-Length") && !body.data.is_empty() {
            written.push("Content-Length", body.data.len().to_string());
        }
    }

    for (name, value) in written.iter().filter(|(_, v)| !v.is_empty()) {
        sink.put_slice(name.as_bytes());
        sink.put_slice(COLON_SPACE);
        sink.put_slice(value.as_bytes());
        sink.put_slice(CRLF);
    }

    sink.put_slice(CRLF);
    Ok(())
}

fn host_header(request: &HttpRequest) -> String {
    let host = request.uri.host_str().unwrap_or_default();
    match request.uri.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::RequestBody;
    use http::Method;

    fn render(request: &HttpRequest, body: Option<&EncodedBody>) -> String {
        let mut sink = BytesMut::new();
        write_request(request, body, &mut sink).unwrap();
        String::from_utf8(sink.to_vec()).unwrap()
    }

    #[test]
    fn synthesizes_host_and_connection() {
        let request = HttpRequest::get("http://example.com/path?q=1#frag").unwrap();
        assert_eq!(
            render(&request, None),
            "GET /path?q=1 HTTP/1.1\r\nHost: example.com\r\nConnection: Close\r\n\r\n"
        );
    }

    #[test]
    fn host_includes_non_default_port() {
        let request = HttpRequest::get("http://127.0.0.1:8080/").unwrap();
        assert!(render(&request, None).contains("Host: 127.0.0.1:8080\r\n"));
    }

    #[test]
    fn declared_headers_keep_order_and_suppress_synthesis() {
        let request = HttpRequest::get("http://example.com/")
            .unwrap()
            .with_header("User-Agent", "ua")
            .with_header("connection", "keep-alive")
            .with_header("Accept", "*/*");
        assert_eq!(
            render(&request, None),
            "GET / HTTP/1.1\r\nHost: example.com\r\nUser-Agent: ua\r\nconnection: keep-alive\r\nAccept: */*\r\n\r\n"
        );
    }

    #[test]
    fn empty_values_are_omitted() {
        let request = HttpRequest::get("http://example.com/")
            .unwrap()
            .with_header("Host", "")
            .with_header("Connection", "")
            .with_header("X-Empty", "");
        assert_eq!(render(&request, None), "GET / HTTP/1.1\r\n\r\n");
    }

    #[test]
    fn absolute_uri_in_first_line() {
        let mut request = HttpRequest::get("http://example.com/a?b=c#d").unwrap();
        request.absolute_uri_in_first_line = true;
        assert!(render(&request, None).starts_with("GET http://example.com/a?b=c HTTP/1.1\r\n"));
    }

    #[test]
    fn cookie_header_from_jar_unless_declared() {
        let mut request = HttpRequest::get("http://example.com/").unwrap();
        request.set_cookie("a", "1");
        request.set_cookie("b", "2");
        request.cookies.insert("other.com", "c", "3");
        assert!(render(&request, None).ends_with("Connection: Close\r\nCookie: a=1; b=2\r\n\r\n"));

        request.add_header("Cookie", "manual=1");
        let text = render(&request, None);
        assert!(text.contains("Cookie: manual=1\r\n"));
        assert!(!text.contains("a=1"));
    }

    #[tokio::test]
    async fn body_headers_and_content_length() {
        let request = HttpRequest::post("http://example.com/login", RequestBody::text("a=b", "text/plain")).unwrap();
        let body = EncodedBody::encode(request.body.as_ref().unwrap()).await.unwrap();
        assert_eq!(
            render(&request, Some(&body)),
            "POST /login HTTP/1.1\r\nHost: example.com\r\nConnection: Close\r\nContent-Type: text/plain\r\nContent-Length: 3\r\n\r\na=b"
        );
    }

    #[tokio::test]
    async fn declared_content_headers_win() {
        let request = HttpRequest::post("http://example.com/", RequestBody::text("abc", "text/plain"))
            .unwrap()
            .with_header("Content-Type", "application/json")
            .with_header("Content-Length", "99");
        let body = EncodedBody::encode(request.body.as_ref().unwrap()).await.unwrap();
        let text = render(&request, Some(&body));
        assert_eq!(text.matches("Content-Type").count(), 1);
        assert!(text.contains("Content-Type: application/json\r\n"));
        assert!(text.contains("Content-Length: 99\r\n"));
        assert!(!text.contains("Content-Length: 3"));
    }

    #[tokio::test]
    async fn empty_body_has_no_content_length() {
        let request = HttpRequest::new(Method::PUT, url::Url::parse("http://example.com/").unwrap())
            .with_body(RequestBody::bytes(Vec::<u8>::new()));
        let body = EncodedBody::encode(request.body.as_ref().unwrap()).await.unwrap();
        assert!(!render(&request, Some(&body)).contains("Content-Length"));
    }

    #[test]
    fn rejects_http2() {
        let request = HttpRequest::get("http://example.com/")
            .unwrap()
            .with_version(HttpVersion::new(2, 0));
        let mut sink = BytesMut::new();
        let err = write_head(&request, None, &mut sink).unwrap_err();
        assert!(matches!(err, EngineError::UnsupportedProtocolVersion(v) if v.major == 2));
    }

    #[test]
    fn http10_request_line() {
        let request = HttpRequest::get("http://example.com/")
            .unwrap()
            .with_version(HttpVersion::HTTP_10);
        assert!(render(&request, None).starts_with("GET / HTTP/1.0\r\n"));
    }
}
