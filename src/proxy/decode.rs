//! Turning a buffered upstream body into text for rewriting.
//!
//! Two layers are undone: the `Content-Encoding` (gzip, deflate, br) and
//! the character encoding declared by `Content-Type`, a byte order mark,
//! or for HTML a `<meta charset>` near the top of the document.

use std::io::Read;

use bytes::Bytes;
use encoding_rs::{Encoding, UTF_8};

use crate::error::ProxyError;
use crate::rewrite::ContentKind;

/// How far into an HTML document to look for a `<meta charset>`.
const META_SNIFF_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Identity,
    Gzip,
    Deflate,
    Brotli,
}

impl ContentCoding {
    /// Parse a `Content-Encoding` value. Returns `None` for codings this
    /// proxy cannot undo, including stacked ones.
    #[must_use]
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        let Some(value) = value else {
            return Some(Self::Identity);
        };
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(Self::Identity),
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
        }
    }

    /// Decompress `raw`, refusing output larger than `limit` bytes.
    pub fn decode(self, raw: Bytes, limit: usize) -> Result<Bytes, ProxyError> {
        let out = match self {
            Self::Identity => return Ok(raw),
            Self::Gzip => read_capped(flate2::read::MultiGzDecoder::new(&raw[..]), limit),
            Self::Deflate => {
                // "deflate" is specified as zlib-wrapped, but raw streams are common
                read_capped(flate2::read::ZlibDecoder::new(&raw[..]), limit).or_else(|_| {
                    read_capped(flate2::read::DeflateDecoder::new(&raw[..]), limit)
                })
            }
            Self::Brotli => read_capped(brotli::Decompressor::new(&raw[..], 4096), limit),
        };

        match out {
            Ok(bytes) if bytes.len() > limit => Err(ProxyError::BodyTooLarge { limit }),
            Ok(bytes) => Ok(Bytes::from(bytes)),
            Err(source) => Err(ProxyError::Decode {
                encoding: self.as_str().to_string(),
                source,
            }),
        }
    }
}

/// Read at most `limit + 1` bytes, so an oversized stream is detectable
/// without inflating all of it.
fn read_capped<R: Read>(reader: R, limit: usize) -> std::io::Result<Vec<u8>> {
    let mut out = Vec::new();
    reader
        .take(u64::try_from(limit).unwrap_or(u64::MAX).saturating_add(1))
        .read_to_end(&mut out)?;
    Ok(out)
}

/// Decode a body to UTF-8 text.
///
/// Precedence: byte order mark, then the `charset` parameter, then (HTML
/// only) a `<meta charset>` declaration, then UTF-8. Malformed sequences
/// become U+FFFD.
#[must_use]
pub fn decode_text(body: &[u8], content_type: Option<&str>, kind: ContentKind) -> String {
    let declared = content_type
        .and_then(charset_param)
        .or_else(|| (kind == ContentKind::Html).then(|| sniff_meta_charset(body)).flatten());
    let encoding = declared
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(body);
    if had_errors {
        tracing::debug!(encoding = used.name(), "body contained malformed sequences");
    }
    text.into_owned()
}

fn charset_param(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string())
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<String> {
    let head = &body[..body.len().min(META_SNIFF_LIMIT)];
    let lower = head.to_ascii_lowercase();
    let at = lower
        .windows(b"charset=".len())
        .position(|w| w == b"charset=")?
        + b"charset=".len();

    let rest = &head[at..];
    let rest = rest
        .strip_prefix(b"\"")
        .or_else(|| rest.strip_prefix(b"'"))
        .unwrap_or(rest);
    let end = rest
        .iter()
        .position(|b| matches!(b, b'"' | b'\'' | b';' | b'>' | b'/') || b.is_ascii_whitespace())
        .unwrap_or(rest.len());
    let label = std::str::from_utf8(&rest[..end]).ok()?;
    (!label.is_empty()).then(|| label.to_string())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    fn brotli(data: &[u8]) -> Bytes {
        let mut out = Vec::new();
        {
            let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
            writer.write_all(data).unwrap();
        }
        Bytes::from(out)
    }

    #[test]
    fn parses_codings() {
        assert_eq!(ContentCoding::from_header(None), Some(ContentCoding::Identity));
        assert_eq!(ContentCoding::from_header(Some("GZIP")), Some(ContentCoding::Gzip));
        assert_eq!(ContentCoding::from_header(Some("br")), Some(ContentCoding::Brotli));
        assert_eq!(ContentCoding::from_header(Some("gzip, br")), None);
        assert_eq!(ContentCoding::from_header(Some("zstd")), None);
    }

    #[test]
    fn decompresses_gzip_and_brotli() {
        let text = b"<html><body>hello</body></html>";
        assert_eq!(ContentCoding::Gzip.decode(gzip(text), 1024).unwrap(), &text[..]);
        assert_eq!(ContentCoding::Brotli.decode(brotli(text), 1024).unwrap(), &text[..]);
    }

    #[test]
    fn deflate_accepts_zlib_and_raw() {
        let text = b"body { color: red }";

        let mut zlib = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        zlib.write_all(text).unwrap();
        let zlib = Bytes::from(zlib.finish().unwrap());
        assert_eq!(ContentCoding::Deflate.decode(zlib, 1024).unwrap(), &text[..]);

        let mut raw = flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::default());
        raw.write_all(text).unwrap();
        let raw = Bytes::from(raw.finish().unwrap());
        assert_eq!(ContentCoding::Deflate.decode(raw, 1024).unwrap(), &text[..]);
    }

    #[test]
    fn decompression_bomb_is_capped() {
        let big = vec![b'a'; 64 * 1024];
        let err = ContentCoding::Gzip.decode(gzip(&big), 1024).unwrap_err();
        assert!(matches!(err, ProxyError::BodyTooLarge { limit: 1024 }));
    }

    #[test]
    fn corrupt_stream_is_a_decode_error() {
        let err = ContentCoding::Gzip
            .decode(Bytes::from_static(b"not gzip at all"), 1024)
            .unwrap_err();
        assert!(matches!(err, ProxyError::Decode { .. }));
    }

    #[test]
    fn charset_parameter_wins() {
        let body = [0x63, 0x61, 0x66, 0xe9]; // "café" in latin-1
        let text = decode_text(&body, Some("text/css; charset=ISO-8859-1"), ContentKind::Css);
        assert_eq!(text, "café");
    }

    #[test]
    fn html_meta_charset_is_sniffed() {
        let mut body = b"<html><head><meta charset=\"windows-1252\"></head><body>".to_vec();
        body.push(0x93);
        let text = decode_text(&body, Some("text/html"), ContentKind::Html);
        assert!(text.ends_with('\u{201c}'));
    }

    #[test]
    fn defaults_to_utf8_with_replacement() {
        let text = decode_text(&[b'a', 0xff, b'b'], None, ContentKind::ScriptOrData);
        assert_eq!(text, "a\u{fffd}b");
    }
}
