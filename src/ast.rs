//! Schema Syntax Tree
//!
//! Position-annotated tree produced by the parser. Every node is a [`Node`]
//! carrying a [`NodeKind`] tag, a start/end [`Span`], the comments attached to
//! it and the directives derived from those comments.
//!
//! The tree is owned top-down: children live inside their parent's kind and
//! never point back up. Traversal is by matching on the kind.

use serde::{Deserialize, Serialize};

// =============================================================================
// Positions
// =============================================================================

/// A point in the source text. Lines and columns are 1-based, the byte offset
/// is 0-based. Columns count characters, not bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
    pub byte_offset: usize,
}

impl Position {
    pub fn new(line: u32, column: u32, byte_offset: usize) -> Self {
        Self {
            line,
            column,
            byte_offset,
        }
    }

    /// Position of the first byte of a document
    pub fn origin() -> Self {
        Self::new(1, 1, 0)
    }
}

/// Start and end of a node. `end` always sorts at or after `start`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        if end < start {
            Self { start, end: start }
        } else {
            Self { start, end }
        }
    }

    pub fn point(at: Position) -> Self {
        Self { start: at, end: at }
    }
}

// =============================================================================
// Comments and Directives
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentKind {
    /// `// ...`
    Line,
    /// `/* ... */`
    Block,
}

/// Where a comment sits relative to the declaration it is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentPlacement {
    /// Before the declaration, possibly separated by blank lines
    Leading,
    /// On the same line as the end of the declaration
    Trailing,
    /// Not followed by any declaration (end of file)
    Detached,
}

/// A source comment with its delimiters stripped
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub kind: CommentKind,
    pub placement: CommentPlacement,
    pub text: String,
    pub span: Span,
}

/// Structured annotation found in a comment: `@<namespace>:<option>:<value>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub option: String,
    pub value: String,
    pub span: Span,
}

// =============================================================================
// Declarations
// =============================================================================

/// An `import` statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub path: String,
    pub public: bool,
    pub weak: bool,
}

/// `optional` / `required` / `repeated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldLabel {
    Optional,
    Required,
    Repeated,
}

/// Name/value pair from a `[...]` option list on a field or enum value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompactOption {
    pub name: String,
    pub value: String,
}

/// Variant-specific payload of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum NodeKind {
    Root {
        children: Vec<Node>,
    },
    /// `syntax = "proto3";` or `edition = "2023";`
    Syntax {
        keyword: String,
        value: String,
    },
    Package {
        name: String,
    },
    Import(Import),
    Option {
        name: String,
        value: String,
    },
    Message {
        name: String,
        children: Vec<Node>,
    },
    Field {
        label: Option<FieldLabel>,
        type_name: String,
        name: String,
        number: String,
        options: Vec<CompactOption>,
    },
    Enum {
        name: String,
        children: Vec<Node>,
    },
    EnumValue {
        name: String,
        number: String,
        options: Vec<CompactOption>,
    },
    Service {
        name: String,
        children: Vec<Node>,
    },
    Rpc {
        name: String,
        request_type: String,
        request_stream: bool,
        response_type: String,
        response_stream: bool,
        children: Vec<Node>,
    },
    OneOf {
        name: String,
        children: Vec<Node>,
    },
    Extend {
        extendee: String,
        children: Vec<Node>,
    },
    /// `reserved` and `extensions` ranges, kept verbatim
    Reserved {
        keyword: String,
        items: Vec<String>,
    },
    /// Comment with no declaration to attach to
    Comment(Comment),
    /// Directive surfaced from a detached comment
    Directive(Directive),
}

/// A tree node: kind + position + attached comments/directives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub directives: Vec<Directive>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            span,
            comments: Vec::new(),
            directives: Vec::new(),
        }
    }

    /// An empty document
    pub fn empty_root() -> Self {
        Self::new(
            NodeKind::Root {
                children: Vec::new(),
            },
            Span::point(Position::origin()),
        )
    }

    /// Declared name, for the kinds that have one
    pub fn name(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Message { name, .. }
            | NodeKind::Field { name, .. }
            | NodeKind::Enum { name, .. }
            | NodeKind::EnumValue { name, .. }
            | NodeKind::Service { name, .. }
            | NodeKind::Rpc { name, .. }
            | NodeKind::OneOf { name, .. }
            | NodeKind::Option { name, .. }
            | NodeKind::Package { name } => Some(name),
            _ => None,
        }
    }

    /// Short tag for logs and diagnostics
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::Root { .. } => "root",
            NodeKind::Syntax { .. } => "syntax",
            NodeKind::Package { .. } => "package",
            NodeKind::Import(_) => "import",
            NodeKind::Option { .. } => "option",
            NodeKind::Message { .. } => "message",
            NodeKind::Field { .. } => "field",
            NodeKind::Enum { .. } => "enum",
            NodeKind::EnumValue { .. } => "enum_value",
            NodeKind::Service { .. } => "service",
            NodeKind::Rpc { .. } => "rpc",
            NodeKind::OneOf { .. } => "oneof",
            NodeKind::Extend { .. } => "extend",
            NodeKind::Reserved { .. } => "reserved",
            NodeKind::Comment(_) => "comment",
            NodeKind::Directive(_) => "directive",
        }
    }

    /// Direct children (empty for leaf kinds)
    pub fn children(&self) -> &[Node] {
        match &self.kind {
            NodeKind::Root { children }
            | NodeKind::Message { children, .. }
            | NodeKind::Enum { children, .. }
            | NodeKind::Service { children, .. }
            | NodeKind::Rpc { children, .. }
            | NodeKind::OneOf { children, .. }
            | NodeKind::Extend { children, .. } => children,
            _ => &[],
        }
    }

    /// Pre-order traversal starting at (and including) this node
    pub fn walk(&self) -> Walk<'_> {
        Walk { stack: vec![self] }
    }

    /// Total number of nodes in this subtree, including itself
    pub fn node_count(&self) -> usize {
        self.walk().count()
    }

    /// Every directive in this subtree in pre-order, detached ones included
    pub fn all_directives(&self) -> Vec<&Directive> {
        self.walk()
            .flat_map(|n| {
                let detached = match &n.kind {
                    NodeKind::Directive(d) => Some(d),
                    _ => None,
                };
                n.directives.iter().chain(detached)
            })
            .collect()
    }

    /// First declaration with the given kind tag and name, searching the whole subtree
    pub fn find(&self, kind_name: &str, name: &str) -> Option<&Node> {
        self.walk()
            .find(|n| n.kind_name() == kind_name && n.name() == Some(name))
    }
}

/// Depth-first pre-order iterator over a subtree
pub struct Walk<'a> {
    stack: Vec<&'a Node>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children().iter().rev());
        Some(node)
    }
}
