//! Response head parsing.
//!
//! # Data Flow
//! ```text
//! WireReader
//!     → status line   (CRLF-terminated, `HTTP/x.y CODE [reason]`)
//!     → header block  (terminated by CRLFCRLF, or a lone CRLF for none)
//!         Set-Cookie(2)    → request cookie jar
//!         content headers  → content_headers
//!         everything else  → headers
//!     → framing selection
//! ```
//!
//! Duplicate headers are joined with `", "` in arrival order.

use bytes::Bytes;
use http::{Method, StatusCode};

use crate::error::{EngineError, EngineResult};
use crate::http::buffer::WireReader;
use crate::http::cookies::CookieJar;
use crate::http::framing::Framing;
use crate::http::headers::HeaderList;
use crate::http::request::HttpVersion;
use tokio::io::AsyncRead;

const CRLF: &[u8] = b"\r\n";
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Headers stored apart from the general header list.
pub const CONTENT_HEADERS: [&str; 8] = [
    "Content-Type",
    "Content-Length",
    "Content-Encoding",
    "Content-Disposition",
    "Content-Location",
    "Content-Range",
    "Last-Modified",
    "Expires",
];

/// Status line and headers of a response.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    pub version: HttpVersion,
    pub status: StatusCode,
    pub reason: String,
    pub headers: HeaderList,
    pub content_headers: HeaderList,
}

impl ResponseHead {
    /// Look up a header in the general headers, then the content headers.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).or_else(|| self.content_headers.get(name))
    }

    /// How the body of this response is delimited.
    pub fn framing(&self, method: &Method) -> Framing {
        if *method == Method::HEAD
            || self.status.is_informational()
            || self.status == StatusCode::NO_CONTENT
            || self.status == StatusCode::NOT_MODIFIED
        {
            return Framing::Empty;
        }

        if let Some(te) = self.headers.get("Transfer-Encoding") {
            if te.trim().to_ascii_lowercase().ends_with("chunked") {
                return Framing::Chunked;
            }
        }

        let length = self
            .content_headers
            .get("Content-Length")
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse::<u64>().ok());
        match length {
            Some(length) => Framing::Length(length),
            None => Framing::UntilClose,
        }
    }

    /// True unless the server asked to close the connection.
    pub fn allows_keep_alive(&self) -> bool {
        match self.headers.get("Connection") {
            Some(value) if has_token(value, "close") => false,
            Some(value) if has_token(value, "keep-alive") => true,
            _ => self.version >= HttpVersion::HTTP_11,
        }
    }
}

pub(crate) fn has_token(value: &str, token: &str) -> bool {
    value.split(',').any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Read the status line and headers. `Set-Cookie` values are stored in
/// `cookies` under `host`.
pub async fn read_head<R: AsyncRead + Unpin>(
    reader: &mut WireReader<R>,
    cookies: &mut CookieJar,
    host: &str,
) -> EngineResult<ResponseHead> {
    let line = match reader.read_line().await? {
        Some(line) => line,
        None if reader.buffered() == 0 => return Err(EngineError::EmptyResponse),
        None => {
            let buffered = reader.buffered();
            let partial = reader.buffer_mut().split_to(buffered);
            return Err(EngineError::MalformedStatusLine(
                String::from_utf8_lossy(&partial).into_owned(),
            ));
        }
    };
    let (version, status, reason) = parse_status_line(&line)?;

    let mut head = ResponseHead {
        version,
        status,
        reason,
        headers: HeaderList::new(),
        content_headers: HeaderList::new(),
    };

    let block = read_header_block(reader).await?;
    for line in block.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        process_header_line(&mut head, line, cookies, host);
    }

    Ok(head)
}

/// Parse `HTTP/x.y CODE [reason]`.
pub fn parse_status_line(line: &[u8]) -> EngineResult<(HttpVersion, StatusCode, String)> {
    let text = String::from_utf8_lossy(line);
    let malformed = || EngineError::MalformedStatusLine(text.to_string());

    let mut fields = text.trim_start().splitn(3, ' ');
    let version = fields
        .next()
        .and_then(|v| v.trim().strip_prefix("HTTP/"))
        .and_then(|v| v.parse::<HttpVersion>().ok())
        .ok_or_else(malformed)?;
    let status = fields
        .next()
        .filter(|c| c.len() == 3)
        .and_then(|c| c.parse::<u16>().ok())
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(malformed)?;
    let reason = fields.next().unwrap_or("").trim().to_string();

    Ok((version, status, reason))
}

// Returns the header lines without the final blank line.
async fn read_header_block<R: AsyncRead + Unpin>(reader: &mut WireReader<R>) -> EngineResult<Bytes> {
    loop {
        if reader.buffered() >= CRLF.len() {
            if reader.buffer().starts_with(CRLF) {
                reader.buffer_mut().advance(CRLF.len());
                return Ok(Bytes::new());
            }
            if let Some(pos) = reader.buffer().find(HEADER_TERMINATOR) {
                let block = reader.buffer_mut().split_to(pos);
                reader.buffer_mut().advance(HEADER_TERMINATOR.len());
                return Ok(block);
            }
        }
        if !reader.fill().await? {
            return Err(EngineError::MalformedHeaders(
                "connection closed before the end of the header block".to_string(),
            ));
        }
    }
}

fn process_header_line(head: &mut ResponseHead, line: &[u8], cookies: &mut CookieJar, host: &str) {
    if line.is_empty() {
        return;
    }
    let Some(separator) = line.iter().position(|b| *b == b':') else {
        return;
    };

    let name = String::from_utf8_lossy(&line[..separator]);
    let value = String::from_utf8_lossy(&line[separator + 1..]);
    let name = name.trim_matches(' ');
    let value = value.trim_matches(' ');

    if name.eq_ignore_ascii_case("Set-Cookie") || name.eq_ignore_ascii_case("Set-Cookie2") {
        if !cookies.store_set_cookie(host, value) {
            tracing::trace!(value = %value, "Ignoring Set-Cookie without a name");
        }
    } else if CONTENT_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) {
        head.content_headers.append_joined(name, value);
    } else {
        head.headers.append_joined(name, value);
    }
}
