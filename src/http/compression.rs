//! Content-Encoding decoding.
//!
//! Codings listed in `Content-Encoding` are undone in reverse order. Unknown
//! codings are passed through untouched. A coding that fails to decode is not
//! an error for the exchange: the raw bytes are returned and the caller is
//! told decoding failed.

use bytes::Bytes;
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use std::io::{self, Read};

use crate::observability::metrics;

const BROTLI_BUFFER_SIZE: usize = 4096;

/// Outcome of decoding a body.
#[derive(Debug, Clone)]
pub struct Decoded {
    pub data: Bytes,
    /// True when a coding was recognized but could not be decoded.
    pub failed: bool,
}

/// Undo every coding named in `content_encoding`.
pub fn decode_body(content_encoding: Option<&str>, data: Bytes) -> Decoded {
    let Some(content_encoding) = content_encoding else {
        return Decoded { data, failed: false };
    };

    let codings: Vec<String> = content_encoding
        .split(',')
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .collect();

    let mut current = data.clone();
    for coding in codings.iter().rev() {
        match decode_one(coding, &current) {
            Ok(Some(decoded)) => current = Bytes::from(decoded),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(encoding = %coding, error = %e, "Failed to decode response body, returning raw bytes");
                metrics::record_decompression_failure(coding);
                return Decoded { data, failed: true };
            }
        }
    }

    Decoded { data: current, failed: false }
}

/// Decode a single coding. `Ok(None)` means the coding is not handled.
fn decode_one(coding: &str, data: &[u8]) -> io::Result<Option<Vec<u8>>> {
    if data.is_empty() {
        return Ok(None);
    }
    let mut out = Vec::with_capacity(data.len().saturating_mul(4));
    match coding {
        "br" => {
            brotli::Decompressor::new(data, BROTLI_BUFFER_SIZE).read_to_end(&mut out)?;
        }
        "gzip" | "x-gzip" => {
            MultiGzDecoder::new(data).read_to_end(&mut out)?;
        }
        "deflate" => {
            if has_zlib_header(data) {
                ZlibDecoder::new(data).read_to_end(&mut out)?;
            } else {
                DeflateDecoder::new(data).read_to_end(&mut out)?;
            }
        }
        _ => return Ok(None),
    }
    Ok(Some(out))
}

// RFC 1950: CM = 8 and the first two bytes form a multiple of 31.
fn has_zlib_header(data: &[u8]) -> bool {
    data.len() >= 2 && (data[0] & 0x0f) == 8 && (u16::from(data[0]) << 8 | u16::from(data[1])) % 31 == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{DeflateEncoder, GzEncoder, ZlibEncoder};
    use flate2::Compression;
    use std::io::Write;

    const PLAIN: &[u8] = b"the quick brown fox jumps over the lazy dog, again and again and again";

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn brotli(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        out
    }

    #[test]
    fn gzip_and_x_gzip() {
        for coding in ["gzip", "x-gzip", " GZIP "] {
            let decoded = decode_body(Some(coding), Bytes::from(gzip(PLAIN)));
            assert!(!decoded.failed);
            assert_eq!(&decoded.data[..], PLAIN);
        }
    }

    #[test]
    fn deflate_with_and_without_zlib_header() {
        let mut zlib = ZlibEncoder::new(Vec::new(), Compression::default());
        zlib.write_all(PLAIN).unwrap();
        let decoded = decode_body(Some("deflate"), Bytes::from(zlib.finish().unwrap()));
        assert_eq!(&decoded.data[..], PLAIN);

        let mut raw = DeflateEncoder::new(Vec::new(), Compression::default());
        raw.write_all(PLAIN).unwrap();
        let decoded = decode_body(Some("deflate"), Bytes::from(raw.finish().unwrap()));
        assert!(!decoded.failed);
        assert_eq!(&decoded.data[..], PLAIN);
    }

    #[test]
    fn brotli_body() {
        let decoded = decode_body(Some("br"), Bytes::from(brotli(PLAIN)));
        assert!(!decoded.failed);
        assert_eq!(&decoded.data[..], PLAIN);
    }

    #[test]
    fn stacked_codings_decode_in_reverse() {
        // Encoded with gzip first, then brotli.
        let encoded = brotli(&gzip(PLAIN));
        let decoded = decode_body(Some("gzip, br"), Bytes::from(encoded));
        assert!(!decoded.failed);
        assert_eq!(&decoded.data[..], PLAIN);
    }

    #[test]
    fn unknown_and_identity_pass_through() {
        let decoded = decode_body(Some("identity, zstd-ish"), Bytes::from_static(PLAIN));
        assert!(!decoded.failed);
        assert_eq!(&decoded.data[..], PLAIN);

        let decoded = decode_body(None, Bytes::from_static(PLAIN));
        assert_eq!(&decoded.data[..], PLAIN);
    }

    #[test]
    fn corrupt_body_returns_raw_bytes() {
        let garbage = Bytes::from_static(b"\x1f\x8bdefinitely not gzip");
        let decoded = decode_body(Some("gzip"), garbage.clone());
        assert!(decoded.failed);
        assert_eq!(decoded.data, garbage);
    }
}
