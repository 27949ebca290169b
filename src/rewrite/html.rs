//! HTML document rewriting on top of the `lol_html` streaming tokenizer.
//!
//! One pass, in document order:
//!
//! 1. `<head>` gets a prologue as its first children: `<base href>` pointing
//!    at the real document URL, a permissive CSP `<meta>`, and the
//!    countermeasure script. All three carry [`MARKER_ATTR`].
//! 2. `src`, `href`, `srcset`, `style` attributes and `<style>` bodies have
//!    their references routed through the proxy.
//! 3. Inline `<script>` bodies and `on*` event-handler attributes go
//!    through [`script::neutralize`].
//! 4. `<meta>` policies that forbid embedding, and foreign `<base>` elements,
//!    are dropped.
//!
//! A document that already carries the marker is never injected twice, and
//! proxied references classify as skip, so the transform is idempotent.

use std::borrow::Cow;
use std::cell::{Cell, RefCell};

use lol_html::errors::RewritingError;
use lol_html::html_content::{ContentType, Element};
use lol_html::{element, rewrite_str, text, HtmlRewriter, RewriteStrSettings, Settings};

use super::css::rewrite_css_with;
use super::script;
use super::shield::{shield_script, MARKER_ATTR};
use super::{RewriteContext, RewriteReport, Tally, PERMISSIVE_POLICY};

/// `http-equiv` values that would stop the document from being framed.
const BLOCKING_EQUIVS: &[&str] = &[
    "content-security-policy",
    "content-security-policy-report-only",
    "x-frame-options",
];

/// Rewrite an HTML document. On tokenizer failure the document is returned
/// untouched.
#[must_use]
pub fn rewrite_html(html: &str, ctx: &RewriteContext) -> (String, RewriteReport) {
    let tally = Tally::default();
    match run_pipeline(html, ctx, &tally) {
        Ok(out) => (out, tally.report()),
        Err(e) => {
            tracing::warn!(error = %e, base = %ctx.base(), "html rewrite failed, passing document through");
            (html.to_string(), RewriteReport::default())
        }
    }
}

#[allow(clippy::too_many_lines)]
fn run_pipeline(html: &str, ctx: &RewriteContext, tally: &Tally) -> Result<String, RewritingError> {
    let injected = Cell::new(is_shielded(html)?);
    let prologue = prologue(ctx);
    let style_text = RefCell::new(String::new());
    let script_text = RefCell::new(String::new());
    let unmarked_script = format!("script:not([{MARKER_ATTR}])");

    let output = rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![
                element!("head", |el| {
                    if !injected.get() {
                        el.prepend(&prologue, ContentType::Html);
                        injected.set(true);
                    }
                    Ok(())
                }),
                element!("meta[http-equiv]", |el| {
                    let equiv = el.get_attribute("http-equiv").unwrap_or_default();
                    let equiv = equiv.trim().to_ascii_lowercase();
                    if BLOCKING_EQUIVS.contains(&equiv.as_str()) && !is_marked(el) {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("base", |el| {
                    if !is_marked(el) {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("[src]", |el| {
                    rewrite_reference_attr(el, "src", ctx, tally);
                    Ok(())
                }),
                element!("[href]", |el| {
                    if el.tag_name() != "base" {
                        rewrite_reference_attr(el, "href", ctx, tally);
                    }
                    Ok(())
                }),
                element!("[srcset]", |el| {
                    if let Some(value) = el.get_attribute("srcset") {
                        if let Some(rewritten) = rewrite_srcset(&value, ctx, tally) {
                            set_attr(el, "srcset", &rewritten);
                        }
                    }
                    Ok(())
                }),
                element!("[style]", |el| {
                    if let Some(value) = el.get_attribute("style") {
                        let rewritten = rewrite_css_with(&value, ctx, tally);
                        if rewritten != value {
                            set_attr(el, "style", &rewritten);
                        }
                    }
                    Ok(())
                }),
                element!("*", |el| {
                    if !is_marked(el) {
                        neutralize_handlers(el);
                    }
                    Ok(())
                }),
                text!("style", |chunk| {
                    style_text.borrow_mut().push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        let css = std::mem::take(&mut *style_text.borrow_mut());
                        chunk.replace(&rewrite_css_with(&css, ctx, tally), ContentType::Html);
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
                text!(unmarked_script, |chunk| {
                    script_text.borrow_mut().push_str(chunk.as_str());
                    if chunk.last_in_text_node() {
                        let source = std::mem::take(&mut *script_text.borrow_mut());
                        chunk.replace(&script::neutralize(&source), ContentType::Html);
                    } else {
                        chunk.remove();
                    }
                    Ok(())
                }),
            ],
            ..RewriteStrSettings::new()
        },
    )?;

    if injected.get() {
        Ok(output)
    } else {
        Ok(inject_without_head(&output, &prologue))
    }
}

/// Preflight scan for a previously injected countermeasure script.
fn is_shielded(html: &str) -> Result<bool, RewritingError> {
    let found = Cell::new(false);
    let selector = format!("script[{MARKER_ATTR}]");
    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![element!(selector, |_el| {
                found.set(true);
                Ok(())
            })],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );
    rewriter.write(html.as_bytes())?;
    rewriter.end()?;
    Ok(found.get())
}

fn prologue(ctx: &RewriteContext) -> String {
    let base = ctx.base().as_str();
    let script = shield_script(&ctx.endpoint().prefix(), base);
    format!(
        "<base href=\"{href}\" {MARKER_ATTR}>\
         <meta http-equiv=\"Content-Security-Policy\" content=\"{policy}\" {MARKER_ATTR}>\
         <script {MARKER_ATTR}>{script}</script>",
        href = escape_attr(base),
        policy = escape_attr(PERMISSIVE_POLICY),
    )
}

/// Head-less documents get the prologue right after the doctype, or first.
fn inject_without_head(doc: &str, prologue: &str) -> String {
    let trimmed = doc.trim_start();
    let lead = doc.len() - trimmed.len();
    let after_doctype = trimmed
        .get(..9)
        .filter(|p| p.eq_ignore_ascii_case("<!doctype"))
        .and_then(|_| trimmed.find('>'))
        .map_or(0, |end| lead + end + 1);

    let mut out = String::with_capacity(doc.len() + prologue.len());
    out.push_str(&doc[..after_doctype]);
    out.push_str(prologue);
    out.push_str(&doc[after_doctype..]);
    out
}

fn rewrite_reference_attr(el: &mut Element, attr: &str, ctx: &RewriteContext, tally: &Tally) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    if let Some(proxied) = ctx.rewrite_reference(&value, tally) {
        set_attr(el, attr, &proxied);
        // the proxied body may differ from what the hash was computed over
        el.remove_attribute("integrity");
    }
}

fn neutralize_handlers(el: &mut Element) {
    let handlers: Vec<(String, String)> = el
        .attributes()
        .iter()
        .map(|a| (a.name(), a.value()))
        .filter(|(name, _)| name.len() > 2 && name.starts_with("on"))
        .collect();
    for (name, value) in handlers {
        if let Cow::Owned(rewritten) = script::neutralize(&value) {
            set_attr(el, &name, &rewritten);
        }
    }
}

fn set_attr(el: &mut Element, attr: &str, value: &str) {
    if let Err(e) = el.set_attribute(attr, value) {
        tracing::debug!(attr, error = %e, "attribute rewrite skipped");
    }
}

fn is_marked(el: &Element) -> bool {
    el.has_attribute(MARKER_ATTR)
}

/// Rewrite every candidate URL of a `srcset`, keeping descriptors and
/// separators intact. Returns `None` when nothing changed.
fn rewrite_srcset(value: &str, ctx: &RewriteContext, tally: &Tally) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut changed = false;
    let mut rest = value;

    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_ascii_whitespace() || c == ',');
        out.push_str(&rest[..rest.len() - trimmed.len()]);
        rest = trimmed;
        if rest.is_empty() {
            break;
        }

        let token_end = rest.find(|c: char| c.is_ascii_whitespace()).unwrap_or(rest.len());
        let token = &rest[..token_end];
        let url = token.trim_end_matches(',');

        // Descriptors run until the next comma outside parentheses.
        let consumed = if url.len() == token.len() {
            let mut depth = 0_usize;
            let mut end = rest.len();
            for (i, c) in rest[token_end..].char_indices() {
                match c {
                    '(' => depth += 1,
                    ')' => depth = depth.saturating_sub(1),
                    ',' if depth == 0 => {
                        end = token_end + i;
                        break;
                    }
                    _ => {}
                }
            }
            end
        } else {
            url.len()
        };

        match ctx.rewrite_reference(url, tally) {
            Some(proxied) => {
                out.push_str(&proxied);
                changed = true;
            }
            None => out.push_str(url),
        }
        out.push_str(&rest[url.len()..consumed]);
        rest = &rest[consumed..];
    }

    changed.then_some(out)
}

fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}
