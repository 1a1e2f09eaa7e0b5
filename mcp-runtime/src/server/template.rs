//! Restricted URI-template matching for resource reads.
//!
//! Templates are literal text plus `{var}` placeholders. Matching rules:
//!
//! - literal characters must match exactly
//! - each `{var}` spans at least one character, taking the shortest span
//!   that still lets the remaining literals match; a trailing variable
//!   takes the whole remaining (non-empty) suffix
//! - no RFC 6570 expansion operators, no percent-decoding
//!
//! Deliberately minimal: deployed servers rely on exactly this behavior, so
//! the subset must not grow. Templates compile to anchored regexes once at
//! registration; matching is deterministic.

use std::collections::HashMap;

use regex::Regex;

use crate::error::{McpResult, ProtocolError};

/// A parsed, compiled URI template.
#[derive(Debug, Clone)]
pub struct UriTemplate {
    template: String,
    variables: Vec<String>,
    pattern: Regex,
}

enum Segment {
    Literal(String),
    Variable(String),
}

impl UriTemplate {
    /// Parse and compile a template.
    ///
    /// Fails on unbalanced braces or empty variable names.
    pub fn parse(template: impl Into<String>) -> McpResult<Self> {
        let template = template.into();
        let segments = Self::segments(&template)?;

        let mut variables = Vec::new();
        let mut pattern = String::from("^");
        let last = segments.len().saturating_sub(1);
        for (index, segment) in segments.iter().enumerate() {
            match segment {
                Segment::Literal(text) => pattern.push_str(&regex::escape(text)),
                Segment::Variable(name) => {
                    variables.push(name.clone());
                    // Trailing variables swallow the rest of the URI; inner
                    // ones take the shortest span that lets the remaining
                    // literals match.
                    if index == last {
                        pattern.push_str("(.+)");
                    } else {
                        pattern.push_str("(.+?)");
                    }
                }
            }
        }
        pattern.push('$');

        let pattern = Regex::new(&pattern).map_err(|e| ProtocolError::InvalidParams {
            reason: format!("template {template} did not compile: {e}"),
        })?;

        Ok(Self {
            template,
            variables,
            pattern,
        })
    }

    fn segments(template: &str) -> McpResult<Vec<Segment>> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars();

        while let Some(c) = chars.next() {
            match c {
                '{' => {
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    let mut name = String::new();
                    let mut closed = false;
                    for c in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed || name.is_empty() {
                        return Err(ProtocolError::InvalidParams {
                            reason: format!("malformed variable in template {template}"),
                        }
                        .into());
                    }
                    segments.push(Segment::Variable(name));
                }
                '}' => {
                    return Err(ProtocolError::InvalidParams {
                        reason: format!("unbalanced brace in template {template}"),
                    }
                    .into())
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(segments)
    }

    /// The original template text.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Match `uri` against the template, returning the variable bindings on
    /// success.
    pub fn matches(&self, uri: &str) -> Option<HashMap<String, String>> {
        let captures = self.pattern.captures(uri)?;
        let mut bindings = HashMap::with_capacity(self.variables.len());
        for (index, name) in self.variables.iter().enumerate() {
            let value = captures.get(index + 1)?.as_str().to_string();
            bindings.insert(name.clone(), value);
        }
        Some(bindings)
    }
}
