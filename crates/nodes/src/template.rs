//! Templating for user-authored node fields.
//!
//! Supported forms:
//! - `{{path}}` / `{{{path}}}`: the value at a dotted path, stringified.
//!   Strings render raw, numbers and booleans in their JSON spelling,
//!   `null` and absent keys as the empty string, objects and arrays as
//!   compact JSON.
//! - `{{json path}}`: the value at `path` as pretty-printed JSON, for
//!   embedding structured data inside a larger string (e.g. a request body).
//! - `{{! comment }}` / `{{!-- comment --}}`: dropped from the output.
//! - `\{{`: a literal `{{`.
//!
//! Paths are `this`, `a.b.c`, and array indices as `items.0` or `items.[0]`.
//! Rendering never HTML-escapes. Templates are compiled per execution
//! against the current context; nothing is cached across runs.

use serde_json::Value;
use thiserror::Error;

use crate::{Context, NodeError};

/// Errors raised while compiling a template.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed expression starting at byte {0}")]
    Unclosed(usize),

    #[error("empty expression at byte {0}")]
    Empty(usize),

    #[error("unknown helper '{0}'")]
    UnknownHelper(String),

    #[error("invalid path '{0}'")]
    InvalidPath(String),
}

impl From<TemplateError> for NodeError {
    fn from(err: TemplateError) -> Self {
        NodeError::Configuration(format!("template error: {err}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Part {
    Literal(String),
    Value(Vec<String>),
    Json(Vec<String>),
}

/// A compiled template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    parts: Vec<Part>,
}

impl Template {
    /// Parse `source` into a renderable template.
    pub fn compile(source: &str) -> Result<Self, TemplateError> {
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut rest = source;
        let mut offset = 0;

        while let Some(start) = rest.find("{{") {
            if start > 0 && rest.as_bytes()[start - 1] == b'\\' {
                literal.push_str(&rest[..start - 1]);
                literal.push_str("{{");
                rest = &rest[start + 2..];
                offset += start + 2;
                continue;
            }

            literal.push_str(&rest[..start]);
            let open_at = offset + start;
            let tail = &rest[start..];

            let (open, close) = if tail.starts_with("{{!--") {
                ("{{!--", "--}}")
            } else if tail.starts_with("{{{") {
                ("{{{", "}}}")
            } else {
                ("{{", "}}")
            };

            let body_len = tail[open.len()..]
                .find(close)
                .ok_or(TemplateError::Unclosed(open_at))?;
            let body = &tail[open.len()..open.len() + body_len];
            let consumed = open.len() + body_len + close.len();

            let is_comment = open == "{{!--" || body.trim_start().starts_with('!');
            if !is_comment {
                if !literal.is_empty() {
                    parts.push(Part::Literal(std::mem::take(&mut literal)));
                }
                parts.push(parse_expression(body, open_at)?);
            }

            rest = &tail[consumed..];
            offset = open_at + consumed;
        }

        literal.push_str(rest);
        if !literal.is_empty() {
            parts.push(Part::Literal(literal));
        }

        Ok(Self { parts })
    }

    /// Render against a context snapshot.
    pub fn render(&self, context: &Context) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Value(path) => {
                    if let Some(value) = resolve(context, path) {
                        out.push_str(&stringify(&value));
                    }
                }
                Part::Json(path) => {
                    if let Some(value) = resolve(context, path) {
                        out.push_str(&serde_json::to_string_pretty(&value).unwrap_or_default());
                    }
                }
            }
        }
        out
    }

    /// Whether the template contains any expression at all.
    pub fn is_static(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, Part::Literal(_)))
    }
}

/// Compile and render in one go.
pub fn render(source: &str, context: &Context) -> Result<String, TemplateError> {
    Ok(Template::compile(source)?.render(context))
}

fn parse_expression(body: &str, at: usize) -> Result<Part, TemplateError> {
    let mut tokens = body.split_whitespace();
    let first = tokens.next().ok_or(TemplateError::Empty(at))?;

    match (first, tokens.next(), tokens.next()) {
        (path, None, _) => Ok(Part::Value(parse_path(path)?)),
        ("json", Some(path), None) => Ok(Part::Json(parse_path(path)?)),
        (helper, _, _) => Err(TemplateError::UnknownHelper(helper.to_string())),
    }
}

fn parse_path(raw: &str) -> Result<Vec<String>, TemplateError> {
    if raw == "this" || raw == "." {
        return Ok(Vec::new());
    }
    let trimmed = raw.strip_prefix("this.").unwrap_or(raw);
    trimmed
        .split('.')
        .map(|segment| {
            let segment = segment
                .strip_prefix('[')
                .and_then(|s| s.strip_suffix(']'))
                .unwrap_or(segment);
            if segment.is_empty() {
                Err(TemplateError::InvalidPath(raw.to_string()))
            } else {
                Ok(segment.to_string())
            }
        })
        .collect()
}

fn resolve(context: &Context, path: &[String]) -> Option<Value> {
    if path.is_empty() {
        Some(context.to_value())
    } else {
        context.lookup(path).cloned()
    }
}

fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::Array(_) | Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}
