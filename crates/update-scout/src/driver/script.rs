//! JavaScript snippets evaluated in the console page.
//!
//! ## Security: JS encoding
//!
//! Selectors come from configuration and are only ever injected into JS
//! string literals after passing through [`sanitize_js_string`].

use serde::Deserialize;

use super::Locator;

/// Reply from [`click`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ClickReply {
    Clicked,
    Missing,
    Intercepted { by: String },
}

/// Build the element lookup prologue shared by every snippet.
fn query(locator: &Locator) -> String {
    format!(
        "const el = document.querySelector('{}');",
        sanitize_js_string(&locator.to_css())
    )
}

/// `true` if the element exists.
pub fn presence(locator: &Locator) -> String {
    format!("(() => {{ {} return el !== null; }})()", query(locator))
}

/// Number of direct children, `-1` if the element does not exist.
pub fn child_count(locator: &Locator) -> String {
    format!(
        "(() => {{ {} return el ? el.children.length : -1; }})()",
        query(locator)
    )
}

/// `innerHTML` of each direct child, `null` if the element does not exist.
pub fn children_html(locator: &Locator) -> String {
    format!(
        "(() => {{ {} return el ? Array.from(el.children).map(c => c.innerHTML) : null; }})()",
        query(locator)
    )
}

/// Clear an input's value, `false` if the element does not exist.
pub fn clear_value(locator: &Locator) -> String {
    format!(
        r#"(() => {{
            {}
            if (!el) return false;
            el.value = '';
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            return true;
        }})()"#,
        query(locator)
    )
}

/// Scroll the element to the top of the viewport, `false` if it does not exist.
pub fn scroll_into_view(locator: &Locator) -> String {
    format!(
        "(() => {{ {} if (!el) return false; el.scrollIntoView(true); return true; }})()",
        query(locator)
    )
}

/// Click the element unless something else sits on top of its centre.
///
/// Mirrors what a real pointer would hit: the topmost element at the click
/// point must be the target or one of its descendants.
pub fn click(locator: &Locator) -> String {
    format!(
        r#"(() => {{
            {}
            if (!el) return {{ status: 'missing' }};
            const r = el.getBoundingClientRect();
            const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2);
            if (!hit) return {{ status: 'intercepted', by: 'viewport' }};
            if (hit !== el && !el.contains(hit)) {{
                const name = hit.tagName.toLowerCase() + (hit.id ? '#' + hit.id : '');
                return {{ status: 'intercepted', by: name }};
            }}
            el.click();
            return {{ status: 'clicked' }};
        }})()"#,
        query(locator)
    )
}

/// Full document markup.
pub const PAGE_SOURCE: &str = "document.documentElement.outerHTML";

/// Escape text for use inside a single- or double-quoted JS literal.
/// NUL bytes are dropped; angle brackets become `\x3c`/`\x3e`.
pub fn sanitize_js_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => result.push_str("\\\\"),
            '\'' => result.push_str("\\'"),
            '"' => result.push_str("\\\""),
            '`' => result.push_str("\\`"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\0' => {}
            '<' => result.push_str("\\x3c"),
            '>' => result.push_str("\\x3e"),
            _ => result.push(ch),
        }
    }
    result
}
