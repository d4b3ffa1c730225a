//! Input sanitization.
//!
//! Two passes exist:
//! - scalar: `< > " ' &` become entities. Applied to every top-level string
//!   field of query strings and JSON bodies before validation.
//! - rich text: additionally strips `<script>`/`<iframe>` elements with
//!   their content, `javascript:` pseudo-URLs and inline `on*=` handlers.
//!
//! The rich text pass is a best-effort denylist, not an HTML parser. It sits
//! behind the [`Sanitizer`] trait so an allow-list implementation can
//! replace it without touching callers.
//!
//! Escaping is not idempotent: `&` in an entity is escaped again on a
//! second pass (`&lt;` → `&amp;lt;`).

use regex::Regex;
use serde_json::{Map, Value};

/// Replaceable sanitization strategy.
pub trait Sanitizer: Send + Sync {
    fn scalar(&self, value: &str) -> String;

    fn rich_text(&self, value: &str) -> String;
}

/// Entity-escape the markup-significant characters.
pub fn sanitize_scalar(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '&' => out.push_str("&amp;"),
            c => out.push(c),
        }
    }
    out
}

/// Sanitize a JSON value: strings are escaped, everything else passes
/// through unchanged.
pub fn sanitize_value(sanitizer: &dyn Sanitizer, value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitizer.scalar(&s)),
        other => other,
    }
}

/// Escape every top-level string field in place. Nested values are left
/// alone.
pub fn sanitize_fields(sanitizer: &dyn Sanitizer, fields: &mut Map<String, Value>) {
    for value in fields.values_mut() {
        if let Value::String(s) = value {
            *s = sanitizer.scalar(s);
        }
    }
}

/// Pattern-based sanitizer.
pub struct DenylistSanitizer {
    script: Regex,
    iframe: Regex,
    js_url: Regex,
    event_handler: Regex,
}

impl DenylistSanitizer {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            script: Regex::new(r"(?i)<script[^>]*>.*?</script>")?,
            iframe: Regex::new(r"(?i)<iframe[^>]*>.*?</iframe>")?,
            js_url: Regex::new(r"(?i)javascript:")?,
            event_handler: Regex::new(r"(?i)on[a-z0-9_]+\s*=")?,
        })
    }
}

impl Sanitizer for DenylistSanitizer {
    fn scalar(&self, value: &str) -> String {
        sanitize_scalar(value)
    }

    fn rich_text(&self, value: &str) -> String {
        let out = self.script.replace_all(value, "");
        let out = self.iframe.replace_all(&out, "");
        let out = self.js_url.replace_all(&out, "");
        self.event_handler.replace_all(&out, "").into_owned()
    }
}
