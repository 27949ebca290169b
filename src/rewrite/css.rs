//! Stylesheet rewriting.
//!
//! A small scanner walks the stylesheet honoring comments and string
//! literals, so `url(` inside `/* ... */` or `"..."` is never touched.
//! References in `url(...)` tokens and `@import "..."` strings are routed
//! through the proxy; everything else is copied through byte-for-byte.

use super::{RewriteContext, RewriteReport, Tally};

/// Rewrite a standalone stylesheet.
#[must_use]
pub fn rewrite_css(css: &str, ctx: &RewriteContext) -> (String, RewriteReport) {
    let tally = Tally::default();
    let out = rewrite_css_with(css, ctx, &tally);
    (out, tally.report())
}

pub(crate) fn rewrite_css_with(css: &str, ctx: &RewriteContext, tally: &Tally) -> String {
    let bytes = css.as_bytes();
    let mut out = String::with_capacity(css.len());
    let mut copied = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = find_comment_end(bytes, i + 2);
            }
            b'"' | b'\'' => {
                i = find_string_end(bytes, i);
            }
            b'@' if starts_with_ignore_case(bytes, i, b"@import") => {
                let mut j = skip_whitespace(bytes, i + "@import".len());
                if matches!(bytes.get(j), Some(b'"' | b'\'')) {
                    let end = find_string_end(bytes, j);
                    if let Some(value) = string_value(css, j, end) {
                        if let Some(proxied) = ctx.rewrite_reference(value, tally) {
                            let quote = char::from(bytes[j]);
                            out.push_str(&css[copied..j]);
                            out.push(quote);
                            out.push_str(&proxied);
                            out.push(quote);
                            copied = end;
                        }
                    }
                    j = end;
                }
                i = j;
            }
            b'u' | b'U' if starts_with_ignore_case(bytes, i, b"url(") && !follows_ident(bytes, i) => {
                match parse_url_token(css, i) {
                    Some((value, end)) => {
                        if let Some(proxied) = ctx.rewrite_reference(value, tally) {
                            out.push_str(&css[copied..i]);
                            out.push_str("url(\"");
                            out.push_str(&proxied);
                            out.push_str("\")");
                            copied = end;
                        }
                        i = end;
                    }
                    None => i += "url(".len(),
                }
            }
            _ => i += 1,
        }
    }

    out.push_str(&css[copied..]);
    out
}

/// Parse `url(...)` starting at `start`. Returns the inner reference and the
/// index just past the closing parenthesis.
fn parse_url_token(css: &str, start: usize) -> Option<(&str, usize)> {
    let bytes = css.as_bytes();
    let open = start + "url(".len();
    let mut i = skip_whitespace(bytes, open);

    let value = match bytes.get(i)? {
        b'"' | b'\'' => {
            let end = find_string_end(bytes, i);
            let value = string_value(css, i, end)?;
            i = skip_whitespace(bytes, end);
            value
        }
        _ => {
            let value_start = i;
            while let Some(&b) = bytes.get(i) {
                if b == b')' || b.is_ascii_whitespace() {
                    break;
                }
                if matches!(b, b'"' | b'\'' | b'(') {
                    return None;
                }
                i += 1;
            }
            let value = &css[value_start..i];
            i = skip_whitespace(bytes, i);
            value
        }
    };

    (bytes.get(i) == Some(&b')')).then_some((value, i + 1))
}

/// Content of a string literal spanning `start..end` (quotes included), or
/// `None` when it is unterminated.
fn string_value(css: &str, start: usize, end: usize) -> Option<&str> {
    let bytes = css.as_bytes();
    let quote = bytes[start];
    if end < start + 2 || bytes[end - 1] != quote {
        return None;
    }
    Some(&css[start + 1..end - 1])
}

fn find_string_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while let Some(&b) = bytes.get(i) {
        match b {
            b'\\' => i += 2,
            b'\n' => return i,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn find_comment_end(bytes: &[u8], from: usize) -> usize {
    bytes[from.min(bytes.len())..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |pos| from + pos + 2)
}

fn skip_whitespace(bytes: &[u8], mut i: usize) -> usize {
    while bytes.get(i).is_some_and(u8::is_ascii_whitespace) {
        i += 1;
    }
    i
}

fn starts_with_ignore_case(bytes: &[u8], at: usize, needle: &[u8]) -> bool {
    bytes
        .get(at..at + needle.len())
        .is_some_and(|s| s.eq_ignore_ascii_case(needle))
}

/// `myurl(` is a different function than `url(`.
fn follows_ident(bytes: &[u8], at: usize) -> bool {
    at.checked_sub(1)
        .and_then(|prev| bytes.get(prev))
        .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b >= 0x80)
}
