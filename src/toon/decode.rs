//! TOON → JSON parsing.
//!
//! Two passes: `scan` drops blank lines, validates indentation and assigns
//! each content line a depth, then a recursive descent walks the line list.
//! Strict mode turns declared-length, row-width and indentation drift into
//! errors; non-strict mode takes what is actually present.

use std::str::CharIndices;

use serde_json::{Map, Number, Value};

use super::{is_json_number, is_safe_key, DecodeOptions, ExpandPaths};
use crate::error::ToonError;

/// Parses one TOON document.
///
/// Empty input (or blank lines only) decodes to an empty object. A single
/// line that is neither an entry nor an array header decodes as a root
/// scalar.
pub fn decode(text: &str, options: &DecodeOptions) -> Result<Value, ToonError> {
    let lines = scan(text, options)?;
    if lines.is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    let mut parser = Parser {
        lines,
        pos: 0,
        options,
    };
    let value = parser.root()?;
    if let Some(line) = parser.peek() {
        return Err(ToonError::Syntax {
            line: line.number,
            detail: "unexpected trailing content".to_string(),
        });
    }
    Ok(value)
}

#[derive(Clone)]
struct Line {
    number: usize,
    depth: usize,
    text: String,
}

/// Blank lines are skipped everywhere. The first indented line defines one
/// indentation level; strict mode requires every deeper line to be an exact
/// multiple of it. Tabs never count as indentation.
fn scan(text: &str, options: &DecodeOptions) -> Result<Vec<Line>, ToonError> {
    let mut unit = 0usize;
    let mut lines = Vec::new();
    for (i, raw) in text.lines().enumerate() {
        let number = i + 1;
        let trimmed = raw.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        let spaces = trimmed.len() - trimmed.trim_start_matches(' ').len();
        let content = &trimmed[spaces..];
        if content.starts_with('\t') {
            return Err(ToonError::Syntax {
                line: number,
                detail: "tab in indentation".to_string(),
            });
        }
        if spaces > 0 && unit == 0 {
            unit = spaces;
        }
        let depth = if spaces == 0 {
            0
        } else if options.strict {
            if spaces % unit != 0 {
                return Err(ToonError::Syntax {
                    line: number,
                    detail: format!("indentation of {spaces} is not a multiple of {unit}"),
                });
            }
            spaces / unit
        } else {
            spaces / unit.max(1)
        };
        lines.push(Line {
            number,
            depth,
            text: content.to_string(),
        });
    }
    Ok(lines)
}

struct Parser<'a> {
    lines: Vec<Line>,
    pos: usize,
    options: &'a DecodeOptions,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Line> {
        self.lines.get(self.pos)
    }

    fn take(&mut self) -> Line {
        let line = self.lines[self.pos].clone();
        self.pos += 1;
        line
    }

    fn next_is_deeper(&self, depth: usize) -> bool {
        self.peek().is_some_and(|line| line.depth > depth)
    }

    fn root(&mut self) -> Result<Value, ToonError> {
        let first = &self.lines[0];
        if first.depth == 0 {
            if is_list_line(&first.text) {
                return Err(ToonError::Syntax {
                    line: first.number,
                    detail: "list item without an array header".to_string(),
                });
            }
            if first.text.starts_with('[') {
                let Line { number, text, .. } = self.take();
                return self.array_after_header(&text, number, 0);
            }
            if self.lines.len() == 1 && !entry_like(&first.text) {
                let Line { number, text, .. } = self.take();
                return value_token(&text, number);
            }
        }
        Ok(Value::Object(self.object_block(0)?))
    }

    /// Entries at exactly `depth` until a dedent (or a stray list item, which
    /// the caller then rejects as trailing content).
    fn object_block(&mut self, depth: usize) -> Result<Map<String, Value>, ToonError> {
        let mut map = Map::new();
        while let Some(line) = self.peek() {
            if line.depth > depth {
                return Err(ToonError::Syntax {
                    line: line.number,
                    detail: "unexpected indentation".to_string(),
                });
            }
            if line.depth < depth || is_list_line(&line.text) {
                break;
            }
            let Line { number, text, .. } = self.take();
            let (key, value) = self.entry(&text, number, depth)?;
            insert_entry(&mut map, key, value, self.options.expand_paths);
        }
        Ok(map)
    }

    /// One `key…` entry whose own level is `depth`; nested content is read
    /// at `depth + 1`.
    fn entry(&mut self, text: &str, number: usize, depth: usize) -> Result<(Key, Value), ToonError> {
        let (key, rest) = split_key(text, number)?;
        if rest.starts_with('[') {
            let value = self.array_after_header(rest, number, depth)?;
            return Ok((key, value));
        }
        if let Some(value_text) = rest.strip_prefix(": ") {
            return Ok((key, value_token(value_text, number)?));
        }
        if rest == ":" {
            let value = if self.next_is_deeper(depth) {
                Value::Object(self.object_block(depth + 1)?)
            } else {
                Value::Object(Map::new())
            };
            return Ok((key, value));
        }
        Err(ToonError::Syntax {
            line: number,
            detail: format!("expected ':' after key '{}'", key.name),
        })
    }

    /// Array whose header line sits at `depth`; rows and list items are read
    /// at `depth + 1`.
    fn array_after_header(
        &mut self,
        header: &str,
        number: usize,
        depth: usize,
    ) -> Result<Value, ToonError> {
        let Some(parts) = split_header(header) else {
            return Err(ToonError::Syntax {
                line: number,
                detail: "malformed array header".to_string(),
            });
        };
        if let Some(fields_raw) = parts.fields {
            if parts.inline.is_some() {
                return Err(ToonError::Syntax {
                    line: number,
                    detail: "tabular header cannot carry inline values".to_string(),
                });
            }
            let fields = header_fields(fields_raw, number)?;
            let mut rows = Vec::new();
            while let Some(line) = self.peek() {
                if line.depth > depth + 1 {
                    return Err(ToonError::Syntax {
                        line: line.number,
                        detail: "unexpected indentation".to_string(),
                    });
                }
                if line.depth != depth + 1 || is_list_line(&line.text) {
                    break;
                }
                let Line {
                    number: row_no,
                    text,
                    ..
                } = self.take();
                let delim = sniff_delimiter(&text);
                let cells = split_cells(&text, delim);
                if self.options.strict && cells.len() != fields.len() {
                    return Err(ToonError::RowWidth {
                        line: row_no,
                        header: fields.len(),
                        row: cells.len(),
                    });
                }
                let mut object = Map::new();
                for (field, cell) in fields.iter().zip(cells) {
                    object.insert(field.clone(), value_token(&cell, row_no)?);
                }
                rows.push(Value::Object(object));
            }
            if self.options.strict && rows.len() != parts.len {
                return Err(ToonError::LengthMismatch {
                    line: number,
                    declared: parts.len,
                    actual: rows.len(),
                });
            }
            return Ok(Value::Array(rows));
        }
        if let Some(inline) = parts.inline {
            let delim = sniff_delimiter(inline);
            let values = split_cells(inline, delim)
                .iter()
                .map(|cell| value_token(cell, number))
                .collect::<Result<Vec<_>, _>>()?;
            if self.options.strict && values.len() != parts.len {
                return Err(ToonError::LengthMismatch {
                    line: number,
                    declared: parts.len,
                    actual: values.len(),
                });
            }
            return Ok(Value::Array(values));
        }
        if parts.len == 0 {
            return Ok(Value::Array(Vec::new()));
        }
        let items = self.list_items(depth + 1)?;
        if self.options.strict && items.len() != parts.len {
            return Err(ToonError::LengthMismatch {
                line: number,
                declared: parts.len,
                actual: items.len(),
            });
        }
        Ok(Value::Array(items))
    }

    /// `- ` elements at exactly `depth`. The content after the dash is the
    /// element's first line, one level deeper than the dash itself, so
    /// object continuation lines sit at `depth + 1` and nested blocks at
    /// `depth + 2`.
    fn list_items(&mut self, depth: usize) -> Result<Vec<Value>, ToonError> {
        let mut items = Vec::new();
        while let Some(line) = self.peek() {
            if line.depth > depth {
                return Err(ToonError::Syntax {
                    line: line.number,
                    detail: "unexpected indentation".to_string(),
                });
            }
            if line.depth < depth || !is_list_line(&line.text) {
                break;
            }
            let Line { number, text, .. } = self.take();
            if text == "-" {
                items.push(Value::Object(Map::new()));
                continue;
            }
            let content = text[2..].trim_start();
            if content.is_empty() {
                items.push(Value::Object(Map::new()));
                continue;
            }
            if content.starts_with('[') && split_header(content).is_some() {
                items.push(self.array_after_header(content, number, depth + 1)?);
            } else if entry_like(content) {
                let (key, value) = self.entry(content, number, depth + 1)?;
                let mut map = Map::new();
                insert_entry(&mut map, key, value, self.options.expand_paths);
                for (k, v) in self.object_block(depth + 1)? {
                    map.insert(k, v);
                }
                items.push(Value::Object(map));
            } else {
                items.push(value_token(content, number)?);
            }
        }
        Ok(items)
    }
}

struct Key {
    name: String,
    quoted: bool,
}

fn is_list_line(text: &str) -> bool {
    text == "-" || text.starts_with("- ")
}

/// Splits `key…` off the front of an entry line. Returns the rest starting
/// at `:` or `[`.
fn split_key(text: &str, number: usize) -> Result<(Key, &str), ToonError> {
    if text.starts_with('"') {
        let (name, consumed) = unquote(text, number)?;
        return Ok((Key { name, quoted: true }, &text[consumed..]));
    }
    let split = text.find([':', '[']).ok_or_else(|| ToonError::Syntax {
        line: number,
        detail: "expected ':' after key".to_string(),
    })?;
    let name = text[..split].trim();
    if name.is_empty() {
        return Err(ToonError::Syntax {
            line: number,
            detail: "missing key".to_string(),
        });
    }
    Ok((
        Key {
            name: name.to_string(),
            quoted: false,
        },
        &text[split..],
    ))
}

struct HeaderParts<'t> {
    len: usize,
    fields: Option<&'t str>,
    inline: Option<&'t str>,
}

/// Parses `[N]`, `[N]{fields}`, with `:` and optional inline payload.
/// Returns `None` when the text is not header-shaped, so callers can fall
/// back to treating it as a scalar.
fn split_header(s: &str) -> Option<HeaderParts<'_>> {
    let rest = s.strip_prefix('[')?;
    let close = rest.find(']')?;
    let len = rest[..close].parse::<usize>().ok()?;
    let mut tail = &rest[close + 1..];
    let mut fields = None;
    if let Some(inner) = tail.strip_prefix('{') {
        let end = scan_outside_quotes(inner, '}')?;
        fields = Some(&inner[..end]);
        tail = &inner[end + 1..];
    }
    let tail = tail.strip_prefix(':')?;
    if tail.is_empty() {
        Some(HeaderParts {
            len,
            fields,
            inline: None,
        })
    } else {
        Some(HeaderParts {
            len,
            fields,
            inline: Some(tail.strip_prefix(' ')?),
        })
    }
}

fn header_fields(raw: &str, line: usize) -> Result<Vec<String>, ToonError> {
    let delim = sniff_delimiter(raw);
    let mut fields = Vec::new();
    for cell in split_cells(raw, delim) {
        let cell = cell.trim();
        if cell.is_empty() {
            return Err(ToonError::Syntax {
                line,
                detail: "empty field name in tabular header".to_string(),
            });
        }
        if cell.starts_with('"') {
            let (name, consumed) = unquote(cell, line)?;
            if !cell[consumed..].trim().is_empty() {
                return Err(ToonError::Syntax {
                    line,
                    detail: "unexpected characters after closing quote".to_string(),
                });
            }
            fields.push(name);
        } else {
            fields.push(cell.to_string());
        }
    }
    Ok(fields)
}

/// Whether a line (or a dash payload) is a `key…` entry rather than a bare
/// scalar. Mirrors the encoder's quoting rules: anything this classifies as
/// an entry would have been quoted when encoded as a string.
fn entry_like(text: &str) -> bool {
    if text.starts_with('"') {
        return match unquote(text, 0) {
            Ok((_, consumed)) => {
                let rest = &text[consumed..];
                rest.starts_with(':') || rest.starts_with('[')
            }
            Err(_) => false,
        };
    }
    for (i, c) in text.char_indices() {
        match c {
            ':' => {
                let rest = &text[i + 1..];
                return rest.is_empty() || rest.starts_with(' ');
            }
            '[' => return split_header(&text[i..]).is_some(),
            _ => {}
        }
    }
    false
}

/// Delimiter sniffing outside quoted regions: tab wins over pipe wins over
/// comma, comma being the default when nothing matches.
fn sniff_delimiter(s: &str) -> char {
    let mut in_quotes = false;
    let mut escaped = false;
    let (mut tab, mut pipe) = (false, false);
    for c in s.chars() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            '\t' => tab = true,
            '|' => pipe = true,
            _ => {}
        }
    }
    if tab {
        '\t'
    } else if pipe {
        '|'
    } else {
        ','
    }
}

fn split_cells(s: &str, delim: char) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in s.chars() {
        if in_quotes {
            current.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        if c == delim {
            cells.push(std::mem::take(&mut current));
            continue;
        }
        if c == '"' {
            in_quotes = true;
        }
        current.push(c);
    }
    cells.push(current);
    cells
}

fn scan_outside_quotes(s: &str, target: char) -> Option<usize> {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in s.char_indices() {
        if in_quotes {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_quotes = false;
            }
            continue;
        }
        if c == target {
            return Some(i);
        }
        if c == '"' {
            in_quotes = true;
        }
    }
    None
}

fn value_token(token: &str, line: usize) -> Result<Value, ToonError> {
    let token = token.trim();
    if token.starts_with('"') {
        let (s, consumed) = unquote(token, line)?;
        if !token[consumed..].trim().is_empty() {
            return Err(ToonError::Syntax {
                line,
                detail: "unexpected characters after closing quote".to_string(),
            });
        }
        return Ok(Value::String(s));
    }
    Ok(scalar_value(token))
}

fn scalar_value(token: &str) -> Value {
    match token {
        "null" => Value::Null,
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ if is_json_number(token) => number_value(token),
        _ => Value::String(token.to_string()),
    }
}

fn number_value(token: &str) -> Value {
    if !token.contains(['.', 'e', 'E']) {
        if let Ok(i) = token.parse::<i64>() {
            return Value::Number(i.into());
        }
        if let Ok(u) = token.parse::<u64>() {
            return Value::Number(u.into());
        }
    }
    match token.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(token.to_string()),
    }
}

/// Reads a leading `"…"` token. Returns the unescaped string and the byte
/// length consumed, so callers can inspect what follows the closing quote.
fn unquote(s: &str, line: usize) -> Result<(String, usize), ToonError> {
    let mut out = String::new();
    let mut iter = s.char_indices();
    iter.next(); // opening quote
    while let Some((idx, c)) = iter.next() {
        match c {
            '"' => return Ok((out, idx + 1)),
            '\\' => {
                let Some((_, esc)) = iter.next() else { break };
                match esc {
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'n' => out.push('\n'),
                    'r' => out.push('\r'),
                    't' => out.push('\t'),
                    'b' => out.push('\u{8}'),
                    'f' => out.push('\u{c}'),
                    'u' => out.push(read_unicode_escape(&mut iter, line)?),
                    other => {
                        return Err(ToonError::Syntax {
                            line,
                            detail: format!("invalid escape '\\{other}'"),
                        });
                    }
                }
            }
            c => out.push(c),
        }
    }
    Err(ToonError::Syntax {
        line,
        detail: "unterminated string".to_string(),
    })
}

fn read_unicode_escape(iter: &mut CharIndices, line: usize) -> Result<char, ToonError> {
    let unpaired = || ToonError::Syntax {
        line,
        detail: "unpaired surrogate in \\u escape".to_string(),
    };
    let hi = read_hex4(iter, line)?;
    let code = if (0xD800..=0xDBFF).contains(&hi) {
        match (iter.next(), iter.next()) {
            (Some((_, '\\')), Some((_, 'u'))) => {
                let lo = read_hex4(iter, line)?;
                if !(0xDC00..=0xDFFF).contains(&lo) {
                    return Err(unpaired());
                }
                0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)
            }
            _ => return Err(unpaired()),
        }
    } else if (0xDC00..=0xDFFF).contains(&hi) {
        return Err(unpaired());
    } else {
        hi
    };
    char::from_u32(code).ok_or_else(|| ToonError::Syntax {
        line,
        detail: "invalid \\u escape".to_string(),
    })
}

fn read_hex4(iter: &mut CharIndices, line: usize) -> Result<u32, ToonError> {
    let mut value = 0u32;
    for _ in 0..4 {
        let digit = iter
            .next()
            .and_then(|(_, c)| c.to_digit(16))
            .ok_or_else(|| ToonError::Syntax {
                line,
                detail: "invalid \\u escape".to_string(),
            })?;
        value = value * 16 + digit;
    }
    Ok(value)
}

/// Inserts one parsed entry, splitting unquoted dotted keys into nested
/// objects when expand-paths is on. A conflicting non-object on the path
/// keeps the dotted key literal.
fn insert_entry(map: &mut Map<String, Value>, key: Key, value: Value, expand: ExpandPaths) {
    if expand == ExpandPaths::Safe && !key.quoted && key.name.contains('.') {
        let segments: Vec<&str> = key.name.split('.').collect();
        if segments.iter().all(|s| is_safe_key(s)) {
            match insert_path(map, &segments, value) {
                Ok(()) => return,
                Err(value) => {
                    map.insert(key.name, value);
                    return;
                }
            }
        }
    }
    map.insert(key.name, value);
}

fn insert_path(map: &mut Map<String, Value>, segments: &[&str], value: Value) -> Result<(), Value> {
    let Some((last, parents)) = segments.split_last() else {
        return Err(value);
    };
    let mut current = map;
    for segment in parents {
        let slot = current
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match slot {
            Value::Object(inner) => current = inner,
            _ => return Err(value),
        }
    }
    current.insert((*last).to_string(), value);
    Ok(())
}
