//! Frame-busting neutralization for JavaScript and JSON-like payloads.
//!
//! This is textual substitution, not parsing. Two shapes are rewritten:
//!
//! - assignments to `top.location` / `parent.location` (optionally
//!   `window.`/`self.` qualified, optionally `.href`) become a `void`
//!   expression, so the right-hand side still evaluates but nothing
//!   navigates;
//! - identity comparisons between `top`, `self`, `parent` and `window`
//!   become the constant that reports "not framed": `false` for `!=`/`!==`,
//!   `true` for `==`/`===`.
//!
//! Text that merely looks like these shapes (inside string literals,
//! comments, or unrelated code) is rewritten too. That imprecision is the
//! accepted cost of not shipping a JavaScript parser.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static LOCATION_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(^|[^\w$.])(?:(?:window|self)\s*\.\s*)?(?:top|parent)\s*\.\s*location(?:\s*\.\s*href)?\s*=",
    )
    .unwrap_or_else(|e| unreachable!("invalid location assignment pattern: {e}"))
});

static FRAME_COMPARISON: LazyLock<Regex> = LazyLock::new(|| {
    let operand = r"(?:(?:window\s*\.\s*)?(?:top|self|parent)|window)(?:\s*\.\s*location)?";
    Regex::new(&format!(r"(^|[^\w$.]){operand}\s*(===?|!==?)\s*{operand}"))
        .unwrap_or_else(|e| unreachable!("invalid frame comparison pattern: {e}"))
});

/// Rewrite frame-busting assignments and comparisons. Returns the input
/// unchanged (borrowed) when nothing matched.
#[must_use]
pub fn neutralize(source: &str) -> Cow<'_, str> {
    match neutralize_assignments(source) {
        Cow::Borrowed(text) => neutralize_comparisons(text),
        Cow::Owned(text) => Cow::Owned(neutralize_comparisons(&text).into_owned()),
    }
}

fn neutralize_assignments(text: &str) -> Cow<'_, str> {
    LOCATION_ASSIGNMENT.replace_all(text, |caps: &Captures| {
        // `top.location == x` is a comparison, not an assignment
        if next_char(text, caps) == Some('=') {
            return caps[0].to_string();
        }
        format!("{}void ", &caps[1])
    })
}

fn neutralize_comparisons(text: &str) -> Cow<'_, str> {
    FRAME_COMPARISON.replace_all(text, |caps: &Captures| {
        // `top !== self.opener` compares something else entirely
        if next_char(text, caps).is_some_and(|c| c.is_alphanumeric() || matches!(c, '_' | '$' | '.' | '(')) {
            return caps[0].to_string();
        }
        let constant = if caps[2].starts_with('!') { "false" } else { "true" };
        format!("{}{constant}", &caps[1])
    })
}

fn next_char(text: &str, caps: &Captures) -> Option<char> {
    let end = caps.get(0).map_or(text.len(), |m| m.end());
    text[end..].chars().next()
}
