//! Countermeasure script injected into every rewritten HTML document.
//!
//! The script is plain templated text: the proxy prefix and the original
//! document URL are substituted as JSON string literals and nothing here is
//! ever evaluated server-side. Once loaded in a browser it
//!
//! - pins `top`, `parent` and `frameElement` to read-only accessors that
//!   report the document's own window (and no frame element),
//! - cancels unload attempts with a capturing `beforeunload` handler,
//! - turns anchor clicks, form submissions and `history.pushState` /
//!   `replaceState` calls into `framegate:navigate` messages posted to the
//!   hosting page instead of navigating.

/// Attribute carried by every element the HTML transform injects.
pub const MARKER_ATTR: &str = "data-framegate";

/// `type` field of the navigation intent message.
pub const NAVIGATE_MESSAGE: &str = "framegate:navigate";

const PROXY_SLOT: &str = "__FRAMEGATE_PROXY__";
const ORIGIN_SLOT: &str = "__FRAMEGATE_ORIGIN__";
const MESSAGE_SLOT: &str = "__FRAMEGATE_MESSAGE__";

const TEMPLATE: &str = r##"(function () {
  "use strict";
  if (window.__framegateShield) { return; }
  var w = window;
  var host = w.parent;
  var PROXY = __FRAMEGATE_PROXY__;
  var ORIGINAL = __FRAMEGATE_ORIGIN__;
  var MESSAGE = __FRAMEGATE_MESSAGE__;
  var PROXY_PATH = PROXY;
  try { PROXY_PATH = new URL(PROXY, ORIGINAL).pathname; } catch (e) {}

  try { Object.defineProperty(w, "__framegateShield", { value: true }); } catch (e) {}

  function pin(name, value) {
    try {
      Object.defineProperty(w, name, {
        get: function () { return value; },
        configurable: false
      });
    } catch (e) {}
  }
  pin("top", w);
  pin("parent", w);
  pin("frameElement", null);

  function unwrap(href) {
    try {
      var u = new URL(href, ORIGINAL);
      if (u.pathname === PROXY_PATH && u.searchParams.has("url")) {
        return u.searchParams.get("url");
      }
      return u.href;
    } catch (e) {
      return null;
    }
  }

  function navigate(href, method, via) {
    var target = unwrap(href);
    if (!target || !/^https?:/i.test(target)) { return; }
    var intent = {
      type: MESSAGE,
      url: target,
      proxied: PROXY + "?url=" + encodeURIComponent(target),
      method: method,
      via: via
    };
    try { host.postMessage(intent, "*"); } catch (e) {}
  }

  w.addEventListener("beforeunload", function (e) {
    e.preventDefault();
    e.returnValue = "";
    return "";
  }, true);

  document.addEventListener("click", function (e) {
    var el = e.target;
    while (el && !(el.tagName && el.tagName.toUpperCase() === "A")) { el = el.parentElement; }
    if (!el) { return; }
    var raw = el.getAttribute("href");
    if (!raw || raw.charAt(0) === "#" || /^(javascript|mailto|tel):/i.test(raw)) { return; }
    e.preventDefault();
    e.stopPropagation();
    navigate(el.href, "GET", "click");
  }, true);

  document.addEventListener("submit", function (e) {
    var form = e.target;
    if (!form || !form.getAttribute) { return; }
    e.preventDefault();
    e.stopPropagation();
    var method = (form.getAttribute("method") || "GET").toUpperCase();
    var action = unwrap(form.getAttribute("action") || ORIGINAL);
    if (!action) { return; }
    if (method === "GET") {
      try {
        var u = new URL(action);
        u.search = new URLSearchParams(new FormData(form)).toString();
        action = u.href;
      } catch (e2) {}
    }
    navigate(action, method, "submit");
  }, true);

  ["pushState", "replaceState"].forEach(function (name) {
    var original = w.history[name];
    if (typeof original !== "function") { return; }
    w.history[name] = function (state, title, url) {
      if (url !== undefined && url !== null) { navigate(String(url), "GET", name); }
      try { return original.apply(this, arguments); } catch (e) { return undefined; }
    };
  });
})();"##;

/// Render the countermeasure script body (without the `<script>` tags).
#[must_use]
pub fn shield_script(proxy_prefix: &str, original_url: &str) -> String {
    TEMPLATE
        .replace(PROXY_SLOT, &script_literal(proxy_prefix))
        .replace(ORIGIN_SLOT, &script_literal(original_url))
        .replace(MESSAGE_SLOT, &script_literal(NAVIGATE_MESSAGE))
}

/// A JSON string literal that is also safe inside an inline `<script>`.
fn script_literal(value: &str) -> String {
    serde_json::Value::from(value)
        .to_string()
        .replace("</", "<\\/")
        .replace("<!--", "<\\!--")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pins_navigation_identifiers_to_own_window() {
        let js = shield_script("/api/proxy", "https://example.com/");
        assert!(js.contains(r#"pin("top", w);"#));
        assert!(js.contains(r#"pin("parent", w);"#));
        assert!(js.contains(r#"pin("frameElement", null);"#));
        assert!(js.contains("get: function () { return value; }"));
        assert!(!js.contains("set:"));
    }

    #[test]
    fn captures_real_parent_before_pinning() {
        let js = shield_script("/api/proxy", "https://example.com/");
        let host = js.find("var host = w.parent;").unwrap();
        let pin = js.find(r#"pin("parent", w);"#).unwrap();
        assert!(host < pin);
    }

    #[test]
    fn substitutes_parameters_as_literals() {
        let js = shield_script("/p", "https://example.com/a?b=\"c\"");
        assert!(js.contains(r#"var PROXY = "/p";"#));
        assert!(js.contains(r#"var ORIGINAL = "https://example.com/a?b=\"c\"";"#));
        assert!(js.contains(r#"var MESSAGE = "framegate:navigate";"#));
        assert!(!js.contains("__FRAMEGATE_"));
    }

    #[test]
    fn absolute_prefix_is_matched_by_pathname() {
        let js = shield_script("http://localhost:3000/p", "https://example.com/");
        assert!(js.contains(r#"var PROXY = "http://localhost:3000/p";"#));
        assert!(js.contains("PROXY_PATH = new URL(PROXY, ORIGINAL).pathname;"));
        assert!(js.contains("u.pathname === PROXY_PATH"));
    }

    #[test]
    fn parameters_cannot_close_the_script_element() {
        let js = shield_script("/p", "https://example.com/</script><script>alert(1)//");
        assert!(!js.contains("</script>"));
    }

    #[test]
    fn intercepts_every_navigation_channel() {
        let js = shield_script("/p", "https://example.com/");
        for needle in [
            r#"addEventListener("beforeunload""#,
            r#"addEventListener("click""#,
            r#"addEventListener("submit""#,
            r#"["pushState", "replaceState"]"#,
        ] {
            assert!(js.contains(needle), "{needle}");
        }
    }
}
