//! Block-style YAML writer.
//!
//! Emits a [`Node`] tree as deterministic block YAML:
//!
//! 1. Two-space indentation, sequences inside mappings are not indented
//! 2. Entries are written in the order the tree holds them
//! 3. Strings marked [`Node::Literal`] use literal block style (`|`) when
//!    their content allows it, so embedded newlines stay readable
//! 4. Other strings are plain when unambiguous, double-quoted otherwise
//! 5. No tags, anchors or flow collections except `{}` and `[]`
//!
//! Parsing goes through `serde_yaml`; this module only writes.

use std::fmt::Write as _;

use serde_json::{Number, Value};

/// A node of the tree to emit.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    Str(String),
    /// A string to render in literal block style.
    Literal(String),
    Seq(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl Node {
    /// Convert a JSON value, with mapping keys in sorted order.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(*b),
            Value::Number(n) => Node::Number(n.clone()),
            Value::String(s) => Node::Str(s.clone()),
            Value::Array(items) => Node::Seq(items.iter().map(Node::from_json).collect()),
            Value::Object(map) => {
                let mut entries: Vec<(String, Node)> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), Node::from_json(v)))
                    .collect();
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                Node::Map(entries)
            }
        }
    }

    /// Literal style for strings, the normal conversion for anything else.
    pub fn literal_from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Node::Literal(s.clone()),
            other => Node::from_json(other),
        }
    }
}

/// Emit a node as a YAML document.
pub fn to_string(node: &Node) -> String {
    let mut output = String::new();
    match node {
        Node::Map(entries) if !entries.is_empty() => emit_mapping(entries, 0, false, &mut output),
        Node::Seq(items) if !items.is_empty() => emit_sequence(items, 0, false, &mut output),
        other => emit_after_indicator(other, 0, &mut output),
    }
    output
}

fn push_indent(indent: usize, output: &mut String) {
    for _ in 0..indent {
        output.push(' ');
    }
}

/// Emits mapping entries, one per line, keys at `indent`. With `first_inline`
/// the first key continues the current line (after a `- `).
fn emit_mapping(entries: &[(String, Node)], indent: usize, first_inline: bool, output: &mut String) {
    for (i, (key, value)) in entries.iter().enumerate() {
        if i > 0 || !first_inline {
            push_indent(indent, output);
        }
        emit_string(key, output);
        output.push(':');
        match value {
            Node::Map(inner) if !inner.is_empty() => {
                output.push('\n');
                emit_mapping(inner, indent + 2, false, output);
            }
            Node::Seq(items) if !items.is_empty() => {
                output.push('\n');
                emit_sequence(items, indent, false, output);
            }
            other => {
                output.push(' ');
                emit_after_indicator(other, indent, output);
            }
        }
    }
}

/// Emits sequence items with their dashes at `indent`.
fn emit_sequence(items: &[Node], indent: usize, first_inline: bool, output: &mut String) {
    for (i, item) in items.iter().enumerate() {
        if i > 0 || !first_inline {
            push_indent(indent, output);
        }
        output.push_str("- ");
        match item {
            Node::Map(inner) if !inner.is_empty() => emit_mapping(inner, indent + 2, true, output),
            Node::Seq(inner) if !inner.is_empty() => emit_sequence(inner, indent + 2, true, output),
            other => emit_after_indicator(other, indent, output),
        }
    }
}

/// Emits a scalar, literal block or empty collection that follows a `key: `
/// or `- ` on a line indented by `indent`. Always ends the line.
fn emit_after_indicator(node: &Node, indent: usize, output: &mut String) {
    match node {
        Node::Null => output.push_str("null"),
        Node::Bool(b) => output.push_str(if *b { "true" } else { "false" }),
        Node::Number(n) => output.push_str(&n.to_string()),
        Node::Str(s) => emit_string(s, output),
        Node::Literal(s) if allows_literal(s) => {
            emit_literal(s, indent + 2, output);
            return;
        }
        Node::Literal(s) => emit_string(s, output),
        Node::Seq(_) => output.push_str("[]"),
        Node::Map(_) => output.push_str("{}"),
    }
    output.push('\n');
}

/// Emits a literal block scalar: the header, then each line at `indent`.
fn emit_literal(s: &str, indent: usize, output: &mut String) {
    output.push('|');
    // Content starting with whitespace or an empty line cannot have its
    // indentation detected, so state it.
    if s.starts_with(' ') || s.starts_with('\t') || s.starts_with('\n') {
        output.push('2');
    }

    let body = match s.strip_suffix('\n') {
        None => {
            output.push('-');
            s
        }
        Some(body) if body.is_empty() || body.ends_with('\n') => {
            output.push('+');
            body
        }
        Some(body) => body,
    };
    output.push('\n');

    for line in body.split('\n') {
        if !line.is_empty() {
            push_indent(indent, output);
            output.push_str(line);
        }
        output.push('\n');
    }
}

/// Whether a string survives a literal block unchanged.
fn allows_literal(s: &str) -> bool {
    if s.is_empty() || s.ends_with(' ') || s.ends_with('\t') {
        return false;
    }
    // Trailing whitespace on a line is invisible and fragile in diffs.
    if s.contains(" \n") || s.contains("\t\n") {
        return false;
    }
    !s.chars().any(|c| (c.is_control() && c != '\n' && c != '\t') || is_special_char(c))
}

/// Characters a YAML parser folds, strips or rejects when written raw.
fn is_special_char(c: char) -> bool {
    matches!(
        c,
        '\r' | '\u{85}' | '\u{2028}' | '\u{2029}' | '\u{feff}' | '\u{fffe}' | '\u{ffff}'
    )
}

/// Emits a string plain if unambiguous, otherwise double-quoted.
fn emit_string(s: &str, output: &mut String) {
    if is_plain_safe(s) {
        output.push_str(s);
    } else {
        emit_quoted_string(s, output);
    }
}

/// Determines if a string can be written as a plain scalar and read back as
/// the same string.
fn is_plain_safe(s: &str) -> bool {
    let Some(first) = s.chars().next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_' || first == '/') {
        return false;
    }
    if s.ends_with(' ') {
        return false;
    }

    let lower = s.to_lowercase();
    if matches!(
        lower.as_str(),
        "true" | "false" | "null" | "yes" | "no" | "on" | "off" | "y" | "n" | "nan" | "inf"
            | "infinity"
    ) {
        return false;
    }

    s.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.' | '/' | '+' | '(' | ')' | '='))
        && !s.contains("  ")
}

/// Emits a double-quoted string with proper escaping.
fn emit_quoted_string(s: &str, output: &mut String) {
    output.push('"');
    for c in s.chars() {
        match c {
            '"' => output.push_str("\\\""),
            '\\' => output.push_str("\\\\"),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            c if c.is_control() || is_special_char(c) => {
                let code = c as u32;
                let _ = write!(output, "\\u{code:04x}");
            }
            c => output.push(c),
        }
    }
    output.push('"');
}
