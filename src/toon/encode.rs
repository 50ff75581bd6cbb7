//! JSON → TOON rendering.
//!
//! Encoding is total: every `serde_json::Value` has a TOON form, so the
//! entry point returns a plain `String`. Shape selection per array follows
//! the module contract: inline for all-primitive, tabular for uniform flat
//! objects, `- ` list otherwise.

use serde_json::{Map, Value};

use super::{is_json_number, is_safe_key, EncodeOptions, KeyFolding};

/// Renders `value` as TOON text (no trailing newline).
pub fn encode(value: &Value, options: &EncodeOptions) -> String {
    let mut encoder = Encoder {
        lines: Vec::new(),
        delim: options.delimiter.as_char().to_string(),
        options,
    };
    encoder.root(value);
    encoder.lines.join("\n")
}

struct Encoder<'a> {
    lines: Vec<String>,
    delim: String,
    options: &'a EncodeOptions,
}

impl Encoder<'_> {
    fn root(&mut self, value: &Value) {
        match value {
            Value::Object(map) => self.object_body(map, 0),
            Value::Array(items) => self.array(None, items, 0),
            scalar => {
                let token = self.scalar_token(scalar);
                self.lines.push(token);
            }
        }
    }

    fn pad(&self, depth: usize) -> String {
        " ".repeat(depth * self.options.indent)
    }

    fn object_body(&mut self, map: &Map<String, Value>, depth: usize) {
        for (key, value) in map {
            let (token, value) = self.folded_key(key, value, map);
            self.entry(&token, value, depth);
        }
    }

    /// Key token for one entry, folding single-key chains into a dotted path
    /// when enabled. Returns the (possibly deeper) value the token points at.
    fn folded_key<'v>(
        &self,
        key: &str,
        value: &'v Value,
        siblings: &Map<String, Value>,
    ) -> (String, &'v Value) {
        if self.options.key_folding != KeyFolding::Safe || !is_safe_key(key) {
            return (key_token(key), value);
        }
        let cap = self.options.flatten_depth.unwrap_or(usize::MAX);
        let mut segments = vec![key];
        let mut tail = value;
        while segments.len() < cap {
            let Value::Object(inner) = tail else { break };
            if inner.len() != 1 {
                break;
            }
            let Some((next_key, next_value)) = inner.iter().next() else {
                break;
            };
            if !is_safe_key(next_key) {
                break;
            }
            segments.push(next_key);
            tail = next_value;
        }
        if segments.len() == 1 {
            return (key_token(key), value);
        }
        let folded = segments.join(".");
        // a literal sibling of the same name would collide after expansion
        if siblings.contains_key(&folded) {
            return (key_token(key), value);
        }
        (folded, tail)
    }

    fn entry(&mut self, key: &str, value: &Value, depth: usize) {
        match value {
            Value::Object(map) if map.is_empty() => {
                self.lines.push(format!("{}{}:", self.pad(depth), key));
            }
            Value::Object(map) => {
                self.lines.push(format!("{}{}:", self.pad(depth), key));
                self.object_body(map, depth + 1);
            }
            Value::Array(items) => self.array(Some(key), items, depth),
            scalar => {
                let token = self.scalar_token(scalar);
                self.lines
                    .push(format!("{}{}: {}", self.pad(depth), key, token));
            }
        }
    }

    fn array(&mut self, key: Option<&str>, items: &[Value], depth: usize) {
        let prefix = key.unwrap_or("");
        if items.is_empty() {
            self.lines.push(format!("{}{}[0]:", self.pad(depth), prefix));
            return;
        }
        if items.iter().all(is_scalar) {
            let cells: Vec<String> = items.iter().map(|v| self.scalar_token(v)).collect();
            self.lines.push(format!(
                "{}{}[{}]: {}",
                self.pad(depth),
                prefix,
                items.len(),
                cells.join(&self.delim)
            ));
            return;
        }
        if let Some(fields) = tabular_fields(items) {
            let header: Vec<String> = fields.iter().map(|f| key_token(f.as_str())).collect();
            self.lines.push(format!(
                "{}{}[{}]{{{}}}:",
                self.pad(depth),
                prefix,
                items.len(),
                header.join(&self.delim)
            ));
            for item in items {
                if let Value::Object(map) = item {
                    let cells: Vec<String> = fields
                        .iter()
                        .map(|f| self.scalar_token(map.get(*f).unwrap_or(&Value::Null)))
                        .collect();
                    self.lines
                        .push(format!("{}{}", self.pad(depth + 1), cells.join(&self.delim)));
                }
            }
            return;
        }
        self.lines
            .push(format!("{}{}[{}]:", self.pad(depth), prefix, items.len()));
        for item in items {
            self.list_item(item, depth + 1);
        }
    }

    /// One `- ` element. Containers are rendered one level deeper and their
    /// first line is hoisted onto the dash, so an element's continuation
    /// lines sit at `depth + 1` and nested blocks at `depth + 2`.
    fn list_item(&mut self, value: &Value, depth: usize) {
        match value {
            Value::Object(map) if map.is_empty() => {
                self.lines.push(format!("{}-", self.pad(depth)));
            }
            Value::Object(map) => {
                let mark = self.lines.len();
                self.object_body(map, depth + 1);
                self.hoist(mark, depth);
            }
            Value::Array(items) => {
                let mark = self.lines.len();
                self.array(None, items, depth + 1);
                self.hoist(mark, depth);
            }
            scalar => {
                let token = self.scalar_token(scalar);
                self.lines.push(format!("{}- {}", self.pad(depth), token));
            }
        }
    }

    fn hoist(&mut self, mark: usize, depth: usize) {
        let pad = self.pad(depth);
        if let Some(first) = self.lines.get_mut(mark) {
            let content = first.trim_start().to_string();
            *first = format!("{}- {}", pad, content);
        }
    }

    fn scalar_token(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => {
                if needs_quotes(s) {
                    quote(s)
                } else {
                    s.to_string()
                }
            }
            // containers are routed to array()/object_body() by the callers
            Value::Array(_) | Value::Object(_) => String::new(),
        }
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

/// Field list for the tabular form: every element is an object with the same
/// key sequence and only primitive values.
fn tabular_fields(items: &[Value]) -> Option<Vec<&String>> {
    let first = match items.first()? {
        Value::Object(map) if !map.is_empty() => map,
        _ => return None,
    };
    let fields: Vec<&String> = first.keys().collect();
    for item in items {
        let Value::Object(map) = item else {
            return None;
        };
        if !map.keys().eq(fields.iter().copied()) {
            return None;
        }
        if !map.values().all(is_scalar) {
            return None;
        }
    }
    Some(fields)
}

fn key_token(key: &str) -> String {
    if is_safe_key(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

/// A string stays unquoted only when the decoder would hand it back
/// verbatim: not a keyword/number lookalike, no structural lead-in, no
/// delimiter of any dialect, no surrounding whitespace.
fn needs_quotes(s: &str) -> bool {
    if s.is_empty() || s.trim().len() != s.len() {
        return true;
    }
    if matches!(s, "true" | "false" | "null") || is_json_number(s) {
        return true;
    }
    if s == "-" || s.starts_with("- ") || s.starts_with('[') {
        return true;
    }
    if s.ends_with(':') || s.contains(": ") {
        return true;
    }
    s.chars()
        .any(|c| matches!(c, ',' | '\t' | '|' | '"' | '\\') || c.is_control())
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
