//! Front matter assembly and serialization.
//!
//! Hugo reads whatever YAML we emit, but the on-disk format is kept stable:
//! every string scalar is double-quoted, keys are plain, sequences are
//! indented under their key, and insertion order is preserved.

use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter {
    entries: Vec<(String, Value)>,
}

impl FrontMatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace `key`, keeping its original position on replace.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.entries.iter_mut().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn to_yaml(&self) -> String {
        let mut out = String::new();
        write_entries(&mut out, self.entries.iter().map(|(k, v)| (k.as_str(), v)), 0);
        out
    }
}

/// `---\n<yaml>\n---\n<head>\n<body>`
pub fn render_document(front_matter: &FrontMatter, head: &str, body: &str) -> String {
    format!("---\n{}\n---\n{}\n{}", front_matter.to_yaml(), head, body)
}

/// Split a rendered document into its YAML block and the remainder.
pub fn split_document(document: &str) -> Option<(&str, &str)> {
    let rest = document.strip_prefix("---\n")?;
    let end = rest.find("\n---\n")?;
    Some((&rest[..end], &rest[end + "\n---\n".len()..]))
}

fn is_plain_key(key: &str) -> bool {
    let mut chars = key.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn key(k: &str) -> String {
    if is_plain_key(k) {
        k.to_string()
    } else {
        quoted(k)
    }
}

/// JSON string escapes are a subset of YAML double-quoted escapes.
fn quoted(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quoted(s),
        Value::Array(_) => "[]".to_string(),
        Value::Object(_) => "{}".to_string(),
    }
}

fn is_block(value: &Value) -> bool {
    match value {
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => false,
    }
}

fn pad(out: &mut String, indent: usize) {
    out.extend(std::iter::repeat(' ').take(indent));
}

fn write_entries<'a>(out: &mut String, entries: impl Iterator<Item = (&'a str, &'a Value)>, indent: usize) {
    for (k, v) in entries {
        pad(out, indent);
        write_entry(out, k, v, indent);
    }
}

/// Writes `key: value` assuming the cursor is already at `indent`.
fn write_entry(out: &mut String, k: &str, v: &Value, indent: usize) {
    out.push_str(&key(k));
    out.push(':');
    match v {
        Value::Object(map) if !map.is_empty() => {
            out.push('\n');
            write_entries(out, map.iter().map(|(k, v)| (k.as_str(), v)), indent + 2);
        }
        Value::Array(items) if !items.is_empty() => {
            out.push('\n');
            write_sequence(out, items, indent + 2);
        }
        _ => {
            out.push(' ');
            out.push_str(&scalar(v));
            out.push('\n');
        }
    }
}

fn write_sequence(out: &mut String, items: &[Value], indent: usize) {
    for item in items {
        pad(out, indent);
        match item {
            Value::Object(map) if !map.is_empty() => {
                out.push_str("- ");
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        pad(out, indent + 2);
                    }
                    write_entry(out, k, v, indent + 2);
                }
            }
            Value::Array(inner) if is_block(item) => {
                out.push_str("-\n");
                write_sequence(out, inner, indent + 2);
            }
            _ => {
                out.push_str("- ");
                out.push_str(&scalar(item));
                out.push('\n');
            }
        }
    }
}
