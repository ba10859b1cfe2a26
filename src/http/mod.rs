//! HTTP/1.1 wire protocol subsystem.
//!
//! # Data Flow
//! ```text
//! HttpRequest
//!     → writer.rs (request line, synthesized headers, body bytes)
//!     → [connection from pool or tunnel]
//!     → buffer.rs (segmented read buffer over the connection)
//!     → parser.rs (status line, headers, cookies into the jar)
//!     → framing.rs (chunked / content-length / until-close)
//!     → compression.rs (br, gzip, deflate)
//!     → response.rs (HttpResponse handed to the caller)
//! ```

pub mod buffer;
pub mod buffer_pool;
pub mod compression;
pub mod cookies;
pub mod framing;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

pub use buffer_pool::{BufferPool, PooledBuffer};
pub use cookies::CookieJar;
pub use framing::{BodyStream, Framing};
pub use headers::HeaderList;
pub use request::{HttpRequest, HttpVersion, RequestBody, Target};
pub use response::{HttpResponse, ResponseBody};
