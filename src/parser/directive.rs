//! Directive Extraction
//!
//! Authors embed structured annotations in comments using the marker
//! `@<namespace>:<option>:<value>`. Each comment line yields at most one
//! directive; a block comment spanning several lines can yield several, in
//! source order.

use regex::Regex;

use crate::ast::{Comment, CommentKind, Directive, Position, Span};

/// Namespace token accepted when none is configured
const ANY_NAMESPACE: &str = r"[A-Za-z0-9_.\-]+";

/// Compiled matcher for one namespace
#[derive(Debug, Clone)]
pub struct DirectiveMatcher {
    pattern: Regex,
}

impl Default for DirectiveMatcher {
    fn default() -> Self {
        Self::new(None)
    }
}

impl DirectiveMatcher {
    /// Build a matcher. `None` accepts any namespace token.
    pub fn new(namespace: Option<&str>) -> Self {
        let namespace = match namespace {
            Some(ns) if !ns.is_empty() => regex::escape(ns),
            _ => ANY_NAMESPACE.to_string(),
        };
        let pattern = format!(
            r"(?:^|[^A-Za-z0-9_])@(?:{}):([^:\s]+):([^:\r\n]+)",
            namespace
        );
        Self {
            pattern: Regex::new(&pattern).expect("escaped namespace forms a valid pattern"),
        }
    }

    /// Extract every directive in `comment`, top to bottom
    pub fn extract(&self, comment: &Comment) -> Vec<Directive> {
        // Comment text starts right after the opening `//` or `/*`
        let base = comment.span.start;
        let body_start = Position::new(base.line, base.column + 2, base.byte_offset + 2);

        let mut directives = Vec::new();
        let mut line_offset = 0usize;
        for (index, line) in comment.text.split('\n').enumerate() {
            if let Some(directive) = self.match_line(line, index, line_offset, body_start) {
                directives.push(directive);
            }
            line_offset += line.len() + 1;
            if comment.kind == CommentKind::Line {
                break;
            }
        }
        directives
    }

    fn match_line(
        &self,
        line: &str,
        index: usize,
        line_offset: usize,
        body_start: Position,
    ) -> Option<Directive> {
        let caps = self.pattern.captures(line)?;
        let option = caps.get(1)?.as_str().to_string();
        let value_match = caps.get(2)?;
        let value = value_match.as_str().trim();
        if value.is_empty() {
            return None;
        }

        // The whole match may begin with one separator character before '@'
        let whole = caps.get(0)?;
        let at = whole.start() + line[whole.start()..].find('@').unwrap_or(0);
        let end = value_match.start() + value_match.as_str().trim_end().len();

        let position = |byte: usize| {
            let column = line[..byte].chars().count() as u32;
            if index == 0 {
                Position::new(
                    body_start.line,
                    body_start.column + column,
                    body_start.byte_offset + line_offset + byte,
                )
            } else {
                Position::new(
                    body_start.line + index as u32,
                    column + 1,
                    body_start.byte_offset + line_offset + byte,
                )
            }
        };

        Some(Directive {
            option,
            value: value.to_string(),
            span: Span::new(position(at), position(end)),
        })
    }
}
