//! Schema Parser
//!
//! Recursive-descent parser from schema text to the [`Node`] tree.
//!
//! Comment attachment rules:
//! - A comment that starts on the line where a declaration ends (its `;` or
//!   closing `}`) is a trailing comment of that declaration.
//! - Every other comment is held until the next declaration is parsed at the
//!   same or a shallower nesting depth, and becomes one of its leading
//!   comments. Comments left dangling at the end of a block carry over to the
//!   next declaration after the block.
//! - Comments with no following declaration end up as detached `Comment`
//!   nodes at the end of the root.
//!
//! Directives are derived from each attached comment and land on the same node.

pub mod directive;
pub(crate) mod lexer;

pub use directive::DirectiveMatcher;

use crate::ast::{
    Comment, CommentKind, CommentPlacement, CompactOption, FieldLabel, Import, Node, NodeKind,
    Position, Span,
};
use crate::error::{RegistryError, Result};
use lexer::{Token, TokenKind};

/// Nesting limit for blocks; deeper input is rejected instead of exhausting the stack
const MAX_NESTING: usize = 128;

/// Parser settings
#[derive(Debug, Clone, Default)]
pub struct ParseOptions {
    /// Directive namespace to recognize. `None` accepts any namespace.
    pub directive_namespace: Option<String>,
}

impl ParseOptions {
    pub fn with_namespace(namespace: impl Into<String>) -> Self {
        Self {
            directive_namespace: Some(namespace.into()),
        }
    }
}

/// Parse schema text with default options
pub fn parse(source: &str) -> Result<Node> {
    parse_with(source, &ParseOptions::default())
}

/// Parse schema text
pub fn parse_with(source: &str, options: &ParseOptions) -> Result<Node> {
    let (tokens, end) = lexer::tokenize(source)?;
    let matcher = DirectiveMatcher::new(options.directive_namespace.as_deref());
    let root = Parser::new(tokens, end, &matcher).parse_file()?;
    tracing::debug!(nodes = root.node_count(), "parsed schema");
    Ok(root)
}

/// Which declarations a block admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Message,
    Enum,
    Service,
    Rpc,
    OneOf,
    Extend,
}

struct Parser<'m> {
    tokens: Vec<Token>,
    pos: usize,
    end: Position,
    pending: Vec<Comment>,
    matcher: &'m DirectiveMatcher,
    depth: usize,
}

impl<'m> Parser<'m> {
    fn new(tokens: Vec<Token>, end: Position, matcher: &'m DirectiveMatcher) -> Self {
        Self {
            tokens,
            pos: 0,
            end,
            pending: Vec::new(),
            matcher,
            depth: 0,
        }
    }

    // =========================================================================
    // Token access
    // =========================================================================

    /// Move comment tokens at the cursor into the pending buffer
    fn fill_pending(&mut self) {
        while let Some(token) = self.tokens.get(self.pos) {
            if !token.kind.is_comment() {
                break;
            }
            let comment = to_comment(token, CommentPlacement::Leading);
            self.pending.push(comment);
            self.pos += 1;
        }
    }

    fn peek_kind(&mut self) -> Option<TokenKind> {
        self.fill_pending();
        self.tokens.get(self.pos).map(|t| t.kind)
    }

    fn peek_word(&mut self) -> Option<String> {
        self.fill_pending();
        match self.tokens.get(self.pos) {
            Some(t) if t.kind == TokenKind::Ident => Some(t.text.clone()),
            _ => None,
        }
    }

    fn check_ident(&mut self, word: &str) -> bool {
        self.fill_pending();
        matches!(self.tokens.get(self.pos), Some(t) if t.kind == TokenKind::Ident && t.text == word)
    }

    fn check_symbol(&mut self, symbol: char) -> bool {
        self.peek_kind() == Some(TokenKind::Symbol(symbol))
    }

    fn next(&mut self, expected: &str) -> Result<Token> {
        self.fill_pending();
        match self.tokens.get(self.pos) {
            Some(token) => {
                let token = token.clone();
                self.pos += 1;
                Ok(token)
            }
            None => Err(self.unexpected(expected)),
        }
    }

    fn eat_symbol(&mut self, symbol: char) -> Option<Token> {
        if self.check_symbol(symbol) {
            self.next("symbol").ok()
        } else {
            None
        }
    }

    fn expect_symbol(&mut self, symbol: char) -> Result<Token> {
        if self.check_symbol(symbol) {
            self.next("symbol")
        } else {
            Err(self.unexpected(&format!("'{}'", symbol)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<Token> {
        if self.peek_kind() == Some(TokenKind::Ident) {
            self.next(what)
        } else {
            Err(self.unexpected(what))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<Token> {
        if self.check_ident(word) {
            self.next(word)
        } else {
            Err(self.unexpected(&format!("'{}'", word)))
        }
    }

    /// One or more adjacent string literals, concatenated
    fn expect_string(&mut self, what: &str) -> Result<(String, Position)> {
        if self.peek_kind() != Some(TokenKind::Str) {
            return Err(self.unexpected(what));
        }
        let mut value = String::new();
        let mut end = self.end;
        while self.peek_kind() == Some(TokenKind::Str) {
            let token = self.next(what)?;
            value.push_str(&token.text);
            end = token.span.end;
        }
        Ok((value, end))
    }

    fn unexpected(&mut self, expected: &str) -> RegistryError {
        self.fill_pending();
        match self.tokens.get(self.pos) {
            Some(token) => RegistryError::syntax(
                format!("expected {}, found '{}'", expected, token.text),
                token.span.start.line,
                token.span.start.column,
            ),
            None => RegistryError::syntax(
                format!("expected {}, found end of input", expected),
                self.end.line,
                self.end.column,
            ),
        }
    }

    // =========================================================================
    // Comment attachment
    // =========================================================================

    fn take_leading(&mut self) -> Vec<Comment> {
        self.fill_pending();
        std::mem::take(&mut self.pending)
    }

    /// Attach leading comments plus any trailing comments on the closing line
    fn finish(&mut self, mut node: Node, leading: Vec<Comment>) -> Node {
        for comment in leading {
            self.attach(&mut node, comment);
        }
        while let Some(token) = self.tokens.get(self.pos) {
            if !token.kind.is_comment() || token.span.start.line != node.span.end.line {
                break;
            }
            let comment = to_comment(token, CommentPlacement::Trailing);
            self.pos += 1;
            self.attach(&mut node, comment);
        }
        node
    }

    fn attach(&self, node: &mut Node, comment: Comment) {
        node.directives.extend(self.matcher.extract(&comment));
        node.comments.push(comment);
    }

    // =========================================================================
    // File level
    // =========================================================================

    fn parse_file(mut self) -> Result<Node> {
        let mut children = Vec::new();
        loop {
            let Some(kind) = self.peek_kind() else {
                break;
            };
            if kind == TokenKind::Symbol(';') {
                self.pos += 1;
                continue;
            }
            let node = match self.peek_word().as_deref() {
                Some("syntax") | Some("edition") => self.parse_syntax()?,
                Some("package") => self.parse_package()?,
                Some("import") => self.parse_import()?,
                Some("option") => self.parse_option()?,
                Some("message") => self.parse_message()?,
                Some("enum") => self.parse_enum()?,
                Some("service") => self.parse_service()?,
                Some("extend") => self.parse_extend()?,
                _ => return Err(self.unexpected("a top-level declaration")),
            };
            children.push(node);
        }

        for mut comment in std::mem::take(&mut self.pending) {
            comment.placement = CommentPlacement::Detached;
            let directives = self.matcher.extract(&comment);
            children.push(Node::new(NodeKind::Comment(comment.clone()), comment.span));
            for directive in directives {
                let span = directive.span;
                children.push(Node::new(NodeKind::Directive(directive), span));
            }
        }

        Ok(Node::new(
            NodeKind::Root { children },
            Span::new(Position::origin(), self.end),
        ))
    }

    fn parse_syntax(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.next("'syntax'")?;
        self.expect_symbol('=')?;
        let (value, _) = self.expect_string("a syntax string")?;
        let semi = self.expect_symbol(';')?;
        let node = Node::new(
            NodeKind::Syntax {
                keyword: keyword.text,
                value,
            },
            Span::new(keyword.span.start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_package(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.next("'package'")?;
        let (name, _) = self.parse_full_ident("a package name")?;
        let semi = self.expect_symbol(';')?;
        let node = Node::new(
            NodeKind::Package { name },
            Span::new(keyword.span.start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_import(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.next("'import'")?;
        let mut public = false;
        let mut weak = false;
        if self.check_ident("public") {
            self.next("'public'")?;
            public = true;
        } else if self.check_ident("weak") {
            self.next("'weak'")?;
            weak = true;
        }
        let (path, _) = self.expect_string("an import path")?;
        let semi = self.expect_symbol(';')?;
        let node = Node::new(
            NodeKind::Import(Import { path, public, weak }),
            Span::new(keyword.span.start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_option(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("option")?;
        let name = self.parse_option_name()?;
        self.expect_symbol('=')?;
        let value = self.parse_constant()?;
        let semi = self.expect_symbol(';')?;
        let node = Node::new(
            NodeKind::Option { name, value },
            Span::new(keyword.span.start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    // =========================================================================
    // Names and values
    // =========================================================================

    /// `a.b.c`, optionally with a leading `.`
    fn parse_full_ident(&mut self, what: &str) -> Result<(String, Position)> {
        let mut name = String::new();
        if let Some(dot) = self.eat_symbol('.') {
            name.push_str(&dot.text);
        }
        let first = self.expect_ident(what)?;
        name.push_str(&first.text);
        let mut end = first.span.end;
        while self.eat_symbol('.').is_some() {
            let part = self.expect_ident(what)?;
            name.push('.');
            name.push_str(&part.text);
            end = part.span.end;
        }
        Ok((name, end))
    }

    /// `name`, `(custom.ext)`, `(custom.ext).field`
    fn parse_option_name(&mut self) -> Result<String> {
        let mut name = String::new();
        loop {
            if self.eat_symbol('(').is_some() {
                let (inner, _) = self.parse_full_ident("an extension name")?;
                self.expect_symbol(')')?;
                name.push('(');
                name.push_str(&inner);
                name.push(')');
            } else {
                let part = self.expect_ident("an option name")?;
                name.push_str(&part.text);
            }
            if self.eat_symbol('.').is_some() {
                name.push('.');
            } else {
                return Ok(name);
            }
        }
    }

    fn parse_constant(&mut self) -> Result<String> {
        match self.peek_kind() {
            Some(TokenKind::Str) => Ok(self.expect_string("a string")?.0),
            Some(TokenKind::Int) | Some(TokenKind::Float) => Ok(self.next("a number")?.text),
            Some(TokenKind::Symbol(sign @ ('-' | '+'))) => {
                self.next("a sign")?;
                match self.peek_kind() {
                    Some(TokenKind::Int) | Some(TokenKind::Float) | Some(TokenKind::Ident) => {
                        let number = self.next("a number")?;
                        Ok(format!("{}{}", sign, number.text))
                    }
                    _ => Err(self.unexpected("a number")),
                }
            }
            Some(TokenKind::Ident) => Ok(self.parse_full_ident("a constant")?.0),
            Some(TokenKind::Symbol('{')) => self.parse_aggregate(),
            _ => Err(self.unexpected("an option value")),
        }
    }

    /// Text-format aggregate `{ ... }`, kept as space-joined tokens
    fn parse_aggregate(&mut self) -> Result<String> {
        let open = self.expect_symbol('{')?;
        let mut parts = vec![open.text];
        let mut depth = 1usize;
        while depth > 0 {
            let token = self.next("'}'")?;
            match token.kind {
                TokenKind::Symbol('{') => depth += 1,
                TokenKind::Symbol('}') => depth -= 1,
                _ => {}
            }
            if depth > MAX_NESTING {
                return Err(RegistryError::syntax(
                    "option value nested too deeply",
                    token.span.start.line,
                    token.span.start.column,
                ));
            }
            if token.kind == TokenKind::Str {
                parts.push(format!("{:?}", token.text));
            } else {
                parts.push(token.text);
            }
        }
        Ok(parts.join(" "))
    }

    /// `[name = value, ...]` after a field or enum value
    fn parse_compact_options(&mut self) -> Result<Vec<CompactOption>> {
        let mut options = Vec::new();
        if self.eat_symbol('[').is_none() {
            return Ok(options);
        }
        loop {
            let name = self.parse_option_name()?;
            self.expect_symbol('=')?;
            let value = self.parse_constant()?;
            options.push(CompactOption { name, value });
            if self.eat_symbol(',').is_none() {
                self.expect_symbol(']')?;
                return Ok(options);
            }
        }
    }

    // =========================================================================
    // Blocks
    // =========================================================================

    /// Parse `{ ... }`, returning the children and the position after `}`
    fn parse_block(&mut self, block: Block) -> Result<(Vec<Node>, Position)> {
        let open = self.expect_symbol('{')?;
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(RegistryError::syntax(
                "declarations nested too deeply",
                open.span.start.line,
                open.span.start.column,
            ));
        }

        let mut children = Vec::new();
        let close = loop {
            match self.peek_kind() {
                None => return Err(self.unexpected("'}'")),
                Some(TokenKind::Symbol('}')) => break self.next("'}'")?,
                Some(TokenKind::Symbol(';')) => {
                    self.pos += 1;
                }
                Some(_) => children.push(self.parse_member(block)?),
            }
        };

        self.depth -= 1;
        Ok((children, close.span.end))
    }

    fn parse_member(&mut self, block: Block) -> Result<Node> {
        let word = self.peek_word();
        match (block, word.as_deref()) {
            (Block::Rpc, Some("option")) => self.parse_option(),
            (Block::Rpc, _) => Err(self.unexpected("an rpc option")),

            (_, Some("option")) if block != Block::Extend => self.parse_option(),

            (Block::Message, Some("message")) => self.parse_message(),
            (Block::Message, Some("enum")) => self.parse_enum(),
            (Block::Message, Some("extend")) => self.parse_extend(),
            (Block::Message, Some("oneof")) => self.parse_oneof(),
            (Block::Message, Some("reserved" | "extensions")) => self.parse_reserved(),
            (Block::Message | Block::Extend, _) => self.parse_field(true),

            (Block::Enum, Some("reserved")) => self.parse_reserved(),
            (Block::Enum, Some(_)) => self.parse_enum_value(),
            (Block::Enum, None) => Err(self.unexpected("an enum value")),

            (Block::Service, Some("rpc")) => self.parse_rpc(),
            (Block::Service, _) => Err(self.unexpected("'rpc' or 'option'")),

            (Block::OneOf, _) => self.parse_field(false),
        }
    }

    fn parse_message(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("message")?;
        let name = self.expect_ident("a message name")?.text;
        let (children, end) = self.parse_block(Block::Message)?;
        let node = Node::new(
            NodeKind::Message { name, children },
            Span::new(keyword.span.start, end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_enum(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("enum")?;
        let name = self.expect_ident("an enum name")?.text;
        let (children, end) = self.parse_block(Block::Enum)?;
        let node = Node::new(
            NodeKind::Enum { name, children },
            Span::new(keyword.span.start, end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_service(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("service")?;
        let name = self.expect_ident("a service name")?.text;
        let (children, end) = self.parse_block(Block::Service)?;
        let node = Node::new(
            NodeKind::Service { name, children },
            Span::new(keyword.span.start, end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_oneof(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("oneof")?;
        let name = self.expect_ident("a oneof name")?.text;
        let (children, end) = self.parse_block(Block::OneOf)?;
        let node = Node::new(
            NodeKind::OneOf { name, children },
            Span::new(keyword.span.start, end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_extend(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("extend")?;
        let (extendee, _) = self.parse_full_ident("an extended type")?;
        let (children, end) = self.parse_block(Block::Extend)?;
        let node = Node::new(
            NodeKind::Extend { extendee, children },
            Span::new(keyword.span.start, end),
        );
        Ok(self.finish(node, leading))
    }

    fn parse_rpc(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.expect_keyword("rpc")?;
        let name = self.expect_ident("an rpc name")?.text;
        let (request_type, request_stream) = self.parse_rpc_type()?;
        self.expect_keyword("returns")?;
        let (response_type, response_stream) = self.parse_rpc_type()?;

        let (children, end) = if self.check_symbol('{') {
            self.parse_block(Block::Rpc)?
        } else {
            (Vec::new(), self.expect_symbol(';')?.span.end)
        };

        let node = Node::new(
            NodeKind::Rpc {
                name,
                request_type,
                request_stream,
                response_type,
                response_stream,
                children,
            },
            Span::new(keyword.span.start, end),
        );
        Ok(self.finish(node, leading))
    }

    /// `( [stream] Type )`
    fn parse_rpc_type(&mut self) -> Result<(String, bool)> {
        self.expect_symbol('(')?;
        let mut stream = false;
        if self.check_ident("stream") {
            let keyword = self.next("'stream'")?;
            if self.check_symbol(')') {
                // a message literally named `stream`
                self.next("')'")?;
                return Ok((keyword.text, false));
            }
            stream = true;
        }
        let (type_name, _) = self.parse_full_ident("a message type")?;
        self.expect_symbol(')')?;
        Ok((type_name, stream))
    }

    // =========================================================================
    // Leaf declarations
    // =========================================================================

    fn parse_field(&mut self, allow_label: bool) -> Result<Node> {
        let leading = self.take_leading();
        let start = self.peek_start();

        let mut label = None;
        if allow_label {
            label = match self.peek_word().as_deref() {
                Some("optional") => Some(FieldLabel::Optional),
                Some("required") => Some(FieldLabel::Required),
                Some("repeated") => Some(FieldLabel::Repeated),
                _ => None,
            };
            if label.is_some() {
                self.next("a field label")?;
            }
        }

        let type_name = self.parse_field_type()?;
        let name = self.expect_ident("a field name")?.text;
        self.expect_symbol('=')?;
        let number = if self.peek_kind() == Some(TokenKind::Int) {
            self.next("a field number")?.text
        } else {
            return Err(self.unexpected("a field number"));
        };
        let options = self.parse_compact_options()?;
        let semi = self.expect_symbol(';')?;

        let node = Node::new(
            NodeKind::Field {
                label,
                type_name,
                name,
                number,
                options,
            },
            Span::new(start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    /// Scalar or message type name, or `map<K, V>`
    fn parse_field_type(&mut self) -> Result<String> {
        if self.check_ident("map") {
            let map = self.next("'map'")?;
            if self.eat_symbol('<').is_none() {
                // a message named `map`, possibly qualified
                let mut name = map.text;
                while self.eat_symbol('.').is_some() {
                    name.push('.');
                    name.push_str(&self.expect_ident("a type name")?.text);
                }
                return Ok(name);
            }
            let (key, _) = self.parse_full_ident("a map key type")?;
            self.expect_symbol(',')?;
            let (value, _) = self.parse_full_ident("a map value type")?;
            self.expect_symbol('>')?;
            return Ok(format!("map<{}, {}>", key, value));
        }
        Ok(self.parse_full_ident("a field type")?.0)
    }

    fn parse_enum_value(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let name_token = self.expect_ident("an enum value name")?;
        self.expect_symbol('=')?;
        let negative = self.eat_symbol('-').is_some();
        let number = if self.peek_kind() == Some(TokenKind::Int) {
            self.next("an enum number")?.text
        } else {
            return Err(self.unexpected("an enum number"));
        };
        let options = self.parse_compact_options()?;
        let semi = self.expect_symbol(';')?;

        let node = Node::new(
            NodeKind::EnumValue {
                name: name_token.text,
                number: if negative { format!("-{}", number) } else { number },
                options,
            },
            Span::new(name_token.span.start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    /// `reserved ...;` and `extensions ...;` with comma-separated items
    fn parse_reserved(&mut self) -> Result<Node> {
        let leading = self.take_leading();
        let keyword = self.next("'reserved'")?;
        let mut items = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut brackets = 0usize;

        let semi = loop {
            let token = self.next("';'")?;
            match token.kind {
                TokenKind::Symbol(';') if brackets == 0 => break token,
                TokenKind::Symbol(',') if brackets == 0 => {
                    if !current.is_empty() {
                        items.push(current.join(" "));
                        current.clear();
                    }
                }
                TokenKind::Symbol('[') => {
                    brackets += 1;
                    current.push(token.text);
                }
                TokenKind::Symbol(']') => {
                    brackets = brackets.saturating_sub(1);
                    current.push(token.text);
                }
                TokenKind::Symbol('{') | TokenKind::Symbol('}') => {
                    return Err(RegistryError::syntax(
                        format!("unexpected '{}' in {}", token.text, keyword.text),
                        token.span.start.line,
                        token.span.start.column,
                    ));
                }
                _ => current.push(token.text),
            }
        };
        if !current.is_empty() {
            items.push(current.join(" "));
        }

        let node = Node::new(
            NodeKind::Reserved {
                keyword: keyword.text,
                items,
            },
            Span::new(keyword.span.start, semi.span.end),
        );
        Ok(self.finish(node, leading))
    }

    fn peek_start(&mut self) -> Position {
        self.fill_pending();
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or(self.end)
    }
}

fn to_comment(token: &Token, placement: CommentPlacement) -> Comment {
    let kind = if token.kind == TokenKind::BlockComment {
        CommentKind::Block
    } else {
        CommentKind::Line
    };
    Comment {
        kind,
        placement,
        text: token.text.clone(),
        span: token.span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_x(source: &str) -> Node {
        parse_with(source, &ParseOptions::with_namespace("x")).unwrap()
    }

    fn first_message(root: &Node) -> &Node {
        root.walk()
            .find(|n| matches!(n.kind, NodeKind::Message { .. }))
            .expect("a message")
    }

    #[test]
    fn test_empty_input() {
        let root = parse("").unwrap();
        assert!(root.children().is_empty());
        assert!(matches!(root.kind, NodeKind::Root { .. }));
    }

    #[test]
    fn test_full_file_shapes() {
        let source = r#"
syntax = "proto3";
package acme.user.v1;

import "google/protobuf/timestamp.proto";
option go_package = "github.com/acme/user/v1;userv1";

message User {
  string id = 1;
  repeated string emails = 2 [deprecated = true];
  map<string, int64> counters = 3;
  .google.protobuf.Timestamp created_at = 4;
  oneof contact {
    string phone = 5;
    string pager = 6;
  }
  reserved 7, 9 to 11;
  reserved "legacy";
  enum Role { ROLE_UNSPECIFIED = 0; ROLE_ADMIN = 1; }
}

service UserService {
  rpc GetUser(GetUserRequest) returns (User);
  rpc Watch(stream WatchRequest) returns (stream User) {
    option idempotency_level = NO_SIDE_EFFECTS;
  }
}
"#;
        let root = parse(source).unwrap();
        let kinds: Vec<_> = root.children().iter().map(|n| n.kind_name()).collect();
        assert_eq!(
            kinds,
            vec!["syntax", "package", "import", "option", "message", "service"]
        );

        let user = root.find("message", "User").unwrap();
        let fields: Vec<_> = user
            .walk()
            .filter_map(|n| match &n.kind {
                NodeKind::Field { name, type_name, .. } => Some((name.as_str(), type_name.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            vec![
                ("id", "string"),
                ("emails", "string"),
                ("counters", "map<string, int64>"),
                ("created_at", ".google.protobuf.Timestamp"),
                ("phone", "string"),
                ("pager", "string"),
            ]
        );

        match &root.find("field", "emails").unwrap().kind {
            NodeKind::Field { label, options, .. } => {
                assert_eq!(*label, Some(FieldLabel::Repeated));
                assert_eq!(options[0].name, "deprecated");
                assert_eq!(options[0].value, "true");
            }
            other => panic!("expected field, got {:?}", other),
        }

        match &root.find("rpc", "Watch").unwrap().kind {
            NodeKind::Rpc {
                request_stream,
                response_stream,
                children,
                ..
            } => {
                assert!(*request_stream && *response_stream);
                assert_eq!(children.len(), 1);
            }
            other => panic!("expected rpc, got {:?}", other),
        }

        let reserved: Vec<_> = user
            .children()
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Reserved { items, .. } => Some(items.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(reserved[0], vec!["7", "9 to 11"]);
        assert_eq!(reserved[1], vec!["legacy"]);
    }

    #[test]
    fn test_positions_cover_declarations() {
        let root = parse("message A {\n  int32 x = 1;\n}\n").unwrap();
        let message = first_message(&root);
        assert_eq!(message.span.start, Position::new(1, 1, 0));
        assert_eq!(message.span.end.line, 3);
        let field = &message.children()[0];
        assert_eq!(field.span.start, Position::new(2, 3, 14));
        assert_eq!(field.span.end, Position::new(2, 15, 26));
        for node in root.walk() {
            assert!(node.span.end >= node.span.start);
        }
    }

    #[test]
    fn test_block_directive_on_message() {
        let root = parse_x("/* @x:option:validated */\nmessage Foo {}\n");
        let message = first_message(&root);
        assert_eq!(message.directives.len(), 1);
        assert_eq!(message.directives[0].option, "option");
        assert_eq!(message.directives[0].value, "validated");
    }

    #[test]
    fn test_multiline_block_directives_in_order() {
        let source = "/*\n * @x:first:a\n * @x:second:b\n */\nmessage Foo {}\n";
        let message_directives: Vec<_> = first_message(&parse_x(source))
            .directives
            .iter()
            .map(|d| d.option.clone())
            .collect();
        assert_eq!(message_directives, vec!["first", "second"]);
    }

    #[test]
    fn test_mixed_comment_kinds_union() {
        let source = "/* @x:from_block:1 */\n// @x:from_line:2\nmessage Foo {}\n";
        let root = parse_x(source);
        let message = first_message(&root);
        let mut options: Vec<_> = message.directives.iter().map(|d| d.option.as_str()).collect();
        options.sort();
        assert_eq!(options, vec!["from_block", "from_line"]);
        assert_eq!(message.comments.len(), 2);
    }

    #[test]
    fn test_leading_comment_after_blank_lines() {
        let root = parse("// about Foo\n\n\nmessage Foo {}\n").unwrap();
        let message = first_message(&root);
        assert_eq!(message.comments.len(), 1);
        assert_eq!(message.comments[0].placement, CommentPlacement::Leading);
        assert_eq!(message.comments[0].text, " about Foo");
    }

    #[test]
    fn test_trailing_comment_stays_with_previous_field() {
        let source = "message A {\n  int32 x = 1; // @x:unit:ms\n  int32 y = 2;\n}\n";
        let root = parse_x(source);
        let x = root.find("field", "x").unwrap();
        let y = root.find("field", "y").unwrap();
        assert_eq!(x.comments[0].placement, CommentPlacement::Trailing);
        assert_eq!(x.directives[0].value, "ms");
        assert!(y.comments.is_empty());
    }

    #[test]
    fn test_dangling_block_comment_moves_to_next_outer_declaration() {
        let source = "message A {\n  int32 x = 1;\n  // @x:owner:core\n}\nmessage B {}\n";
        let root = parse_x(source);
        assert!(root.find("message", "A").unwrap().directives.is_empty());
        assert!(root.find("field", "x").unwrap().directives.is_empty());
        assert_eq!(root.find("message", "B").unwrap().directives[0].value, "core");
    }

    #[test]
    fn test_comment_attaches_to_nested_declaration() {
        let source = "message A {\n  // @x:pii:true\n  string email = 1;\n}\n";
        let root = parse_x(source);
        assert!(first_message(&root).directives.is_empty());
        assert_eq!(root.find("field", "email").unwrap().directives.len(), 1);
    }

    #[test]
    fn test_detached_comment_at_end_of_file() {
        let root = parse_x("message A {}\n\n// @x:note:eof\n");
        let kinds: Vec<_> = root.children().iter().map(|n| n.kind_name()).collect();
        assert_eq!(kinds, vec!["message", "comment", "directive"]);
        match &root.children()[1].kind {
            NodeKind::Comment(c) => assert_eq!(c.placement, CommentPlacement::Detached),
            other => panic!("expected comment, got {:?}", other),
        }
    }

    #[test]
    fn test_semantic_problems_are_not_syntax_errors() {
        // duplicate and out-of-range numbers are left to validation
        let source = "message A { int32 a = 0; int32 b = 0; int32 c = 99999999999; }";
        assert!(parse(source).is_ok());
    }

    #[test]
    fn test_malformed_inputs_fail() {
        for source in [
            "message A {",
            "message { }",
            "import;",
            "syntax = proto3;",
            "message A { int32 x = ; }",
            "banana",
            "service S { int32 x = 1; }",
        ] {
            let err = parse(source).unwrap_err();
            assert!(err.is_syntax(), "{source:?} gave {err}");
        }
    }

    #[test]
    fn test_excessive_nesting_is_rejected() {
        let source = "message A {".repeat(MAX_NESTING + 5);
        assert!(parse(&source).unwrap_err().is_syntax());
    }

    #[test]
    fn test_option_forms() {
        let source = r#"option (acme.api).visibility = PUBLIC;
option java_multiple_files = true;
option (acme.rules) = { min: -1 max: 10 label: "x" };
"#;
        let root = parse(source).unwrap();
        let options: Vec<_> = root
            .children()
            .iter()
            .filter_map(|n| match &n.kind {
                NodeKind::Option { name, value } => Some((name.as_str(), value.as_str())),
                _ => None,
            })
            .collect();
        assert_eq!(options[0], ("(acme.api).visibility", "PUBLIC"));
        assert_eq!(options[1], ("java_multiple_files", "true"));
        assert_eq!(options[2].0, "(acme.rules)");
        assert!(options[2].1.starts_with('{') && options[2].1.ends_with('}'));
    }
}
