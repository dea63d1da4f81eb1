//! Rust Code Emitter
//!
//! Emits serde-derived structs and enums from parsed messages and enums, one
//! `.rs` file per schema file plus a `mod.rs` index.
//!
//! Directives honored on a message or enum:
//! - `rust_derive:<A, B>`: extra derives appended to the default set
//! - `rust_skip:true`: the declaration is not emitted
//!
//! Dependency files are parsed only so type references resolve to the right
//! Rust names; no code is emitted for them.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::ast::{Directive, FieldLabel, Node, NodeKind};
use crate::parser::ParseOptions;

use super::{
    file_stem, parse_all, to_pascal_case, to_snake_case, GenerateResult, GeneratedFile,
    GeneratedOutput, Generator, GeneratorInput,
};

const HEADER: &str = "// @generated by idl-registry. Do not edit.\n";

const DEFAULT_DERIVES: &[&str] = &["Debug", "Clone", "PartialEq", "Serialize", "Deserialize"];

const RUST_KEYWORDS: &[&str] = &[
    "as", "async", "await", "break", "const", "continue", "crate", "dyn", "else", "enum",
    "extern", "false", "fn", "for", "if", "impl", "in", "let", "loop", "match", "mod", "move",
    "mut", "pub", "ref", "return", "static", "struct", "trait", "true", "type", "unsafe", "use",
    "where", "while", "abstract", "become", "box", "do", "final", "macro", "override", "priv",
    "typeof", "unsized", "virtual", "yield", "try",
];

/// The built-in `rust` backend
#[derive(Debug, Clone, Default)]
pub struct RustGenerator {
    options: ParseOptions,
}

impl RustGenerator {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }
}

impl Generator for RustGenerator {
    fn generate(&self, input: &GeneratorInput) -> GenerateResult {
        let own = parse_all(&input.schema_files, &self.options)?;
        let deps = parse_all(&input.dependency_files, &self.options)?;

        let mut symbols = Symbols::default();
        for (_, root) in own.iter().chain(deps.iter()) {
            symbols.collect(root.children(), "");
        }

        let mut output = GeneratedOutput::default();
        let mut modules = Vec::with_capacity(own.len());

        for (file, root) in &own {
            let module = escape_keyword(&to_snake_case(&file_stem(&file.path)));
            let mut emitter = Emitter {
                symbols: &symbols,
                include_grpc: input.include_grpc,
                out: String::new(),
            };
            emitter.emit_file(&file.path, root);
            output.files.push(GeneratedFile::new(
                format!("{}.rs", module.trim_start_matches("r#")),
                emitter.out,
            ));
            modules.push(module);
        }

        let mut index = String::from(HEADER);
        index.push('\n');
        for module in &modules {
            let _ = writeln!(index, "pub mod {};", module);
        }
        output.package_files.push(GeneratedFile::new("mod.rs", index));

        Ok(output)
    }

    fn describe(&self) -> &str {
        "serde-derived Rust structs and enums"
    }
}

// =============================================================================
// Symbol table
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SymbolKind {
    Message,
    Enum,
}

/// Declared message/enum name -> emitted Rust name
#[derive(Debug, Default)]
struct Symbols {
    by_name: HashMap<String, (SymbolKind, String)>,
}

impl Symbols {
    fn collect(&mut self, nodes: &[Node], prefix: &str) {
        for node in nodes {
            let (kind, name) = match &node.kind {
                NodeKind::Message { name, .. } => (SymbolKind::Message, name),
                NodeKind::Enum { name, .. } => (SymbolKind::Enum, name),
                _ => continue,
            };
            let rust_name = format!("{}{}", prefix, to_pascal_case(name));
            self.by_name
                .entry(name.clone())
                .or_insert_with(|| (kind, rust_name.clone()));
            if kind == SymbolKind::Message {
                self.collect(node.children(), &rust_name);
            }
        }
    }

    /// Resolve `Foo`, `pkg.Foo` or `.pkg.Outer.Foo` by its last segment
    fn lookup(&self, type_name: &str) -> (Option<SymbolKind>, String) {
        let last = type_name.rsplit('.').next().unwrap_or(type_name);
        match self.by_name.get(last) {
            Some((kind, rust)) => (Some(*kind), rust.clone()),
            None => (None, to_pascal_case(last)),
        }
    }
}

// =============================================================================
// Emission
// =============================================================================

struct Emitter<'a> {
    symbols: &'a Symbols,
    include_grpc: bool,
    out: String,
}

impl Emitter<'_> {
    fn emit_file(&mut self, path: &str, root: &Node) {
        self.out.push_str(HEADER);
        let _ = writeln!(self.out, "// source: {}", path);
        self.out.push('\n');
        self.out.push_str("use serde::{Deserialize, Serialize};\n");

        for node in root.children() {
            match &node.kind {
                NodeKind::Message { .. } => self.emit_message(node, ""),
                NodeKind::Enum { .. } => self.emit_enum(node, ""),
                NodeKind::Service { .. } if self.include_grpc => self.emit_service(node),
                _ => {}
            }
        }
    }

    fn emit_message(&mut self, node: &Node, prefix: &str) {
        let NodeKind::Message { name, children } = &node.kind else {
            return;
        };
        if skipped(&node.directives) {
            return;
        }
        let rust_name = format!("{}{}", prefix, to_pascal_case(name));

        self.out.push('\n');
        self.emit_docs(node);
        self.emit_derives(&node.directives, &[]);
        let _ = writeln!(self.out, "pub struct {} {{", rust_name);

        for child in children {
            match &child.kind {
                NodeKind::Field { .. } => self.emit_field(child, &rust_name),
                NodeKind::OneOf { name: oneof, .. } => {
                    let _ = writeln!(
                        self.out,
                        "    #[serde(skip_serializing_if = \"Option::is_none\")]\n    pub {}: Option<{}{}>,",
                        escape_keyword(&to_snake_case(oneof)),
                        rust_name,
                        to_pascal_case(oneof)
                    );
                }
                _ => {}
            }
        }
        self.out.push_str("}\n");

        for child in children {
            match &child.kind {
                NodeKind::Message { .. } => self.emit_message(child, &rust_name),
                NodeKind::Enum { .. } => self.emit_enum(child, &rust_name),
                NodeKind::OneOf { .. } => self.emit_oneof(child, &rust_name),
                _ => {}
            }
        }
    }

    fn emit_field(&mut self, node: &Node, owner: &str) {
        let NodeKind::Field {
            label,
            type_name,
            name,
            ..
        } = &node.kind
        else {
            return;
        };

        let field_name = escape_keyword(&to_snake_case(name));
        let rust_type = if let Some((key, value)) = map_types(type_name) {
            format!(
                "std::collections::HashMap<{}, {}>",
                self.value_type(key, owner),
                self.value_type(value, owner)
            )
        } else {
            let inner = self.value_type(type_name, owner);
            let (kind, _) = self.symbols.lookup(type_name);
            match label {
                Some(FieldLabel::Repeated) => format!("Vec<{}>", inner),
                Some(FieldLabel::Optional) => format!("Option<{}>", inner),
                _ if kind == Some(SymbolKind::Message) && scalar_type(type_name).is_none() => {
                    format!("Option<{}>", inner)
                }
                _ => inner,
            }
        };

        if rust_type.starts_with("Option<") {
            self.out
                .push_str("    #[serde(skip_serializing_if = \"Option::is_none\")]\n");
        }
        if field_name.trim_start_matches("r#") != name.as_str() {
            let _ = writeln!(self.out, "    #[serde(rename = \"{}\")]", name);
        }
        let _ = writeln!(self.out, "    pub {}: {},", field_name, rust_type);
    }

    /// Scalar, enum or message type; a message containing itself is boxed
    fn value_type(&self, type_name: &str, owner: &str) -> String {
        if let Some(scalar) = scalar_type(type_name) {
            return scalar.to_string();
        }
        let (_, rust) = self.symbols.lookup(type_name);
        if rust == owner {
            format!("Box<{}>", rust)
        } else {
            rust
        }
    }

    fn emit_oneof(&mut self, node: &Node, owner: &str) {
        let NodeKind::OneOf { name, children } = &node.kind else {
            return;
        };
        let rust_name = format!("{}{}", owner, to_pascal_case(name));

        self.out.push('\n');
        self.emit_derives(&node.directives, &[]);
        self.out.push_str("#[serde(rename_all = \"snake_case\")]\n");
        let _ = writeln!(self.out, "pub enum {} {{", rust_name);
        for child in children {
            if let NodeKind::Field {
                type_name, name, ..
            } = &child.kind
            {
                let _ = writeln!(
                    self.out,
                    "    {}({}),",
                    to_pascal_case(name),
                    self.value_type(type_name, owner)
                );
            }
        }
        self.out.push_str("}\n");
    }

    fn emit_enum(&mut self, node: &Node, prefix: &str) {
        let NodeKind::Enum { name, children } = &node.kind else {
            return;
        };
        if skipped(&node.directives) {
            return;
        }
        let rust_name = format!("{}{}", prefix, to_pascal_case(name));

        let values: Vec<(&str, Option<i64>)> = children
            .iter()
            .filter_map(|c| match &c.kind {
                NodeKind::EnumValue { name, number, .. } => Some((name.as_str(), parse_int(number))),
                _ => None,
            })
            .collect();

        // Aliased or unparseable numbers cannot become discriminants
        let mut numbers: Vec<i64> = values.iter().filter_map(|(_, n)| *n).collect();
        let all_numbered = numbers.len() == values.len();
        numbers.sort_unstable();
        numbers.dedup();
        let discriminants = all_numbered && numbers.len() == values.len();

        self.out.push('\n');
        self.emit_docs(node);
        self.emit_derives(&node.directives, &["Copy", "Eq", "Hash"]);
        if discriminants {
            self.out.push_str("#[repr(i32)]\n");
        }
        let _ = writeln!(self.out, "pub enum {} {{", rust_name);
        for (value, number) in values {
            let _ = writeln!(self.out, "    #[serde(rename = \"{}\")]", value);
            match number {
                Some(n) if discriminants => {
                    let _ = writeln!(self.out, "    {} = {},", to_pascal_case(value), n);
                }
                _ => {
                    let _ = writeln!(self.out, "    {},", to_pascal_case(value));
                }
            }
        }
        self.out.push_str("}\n");
    }

    fn emit_service(&mut self, node: &Node) {
        let NodeKind::Service { name, children } = &node.kind else {
            return;
        };

        self.out.push('\n');
        self.emit_docs(node);
        let _ = writeln!(self.out, "pub trait {} {{", to_pascal_case(name));
        self.out.push_str("    type Error;\n");
        for child in children {
            if let NodeKind::Rpc {
                name,
                request_type,
                request_stream,
                response_type,
                response_stream,
                ..
            } = &child.kind
            {
                let request = self.symbols.lookup(request_type).1;
                let response = self.symbols.lookup(response_type).1;
                let _ = writeln!(
                    self.out,
                    "    fn {}(&self, request: {}) -> Result<{}, Self::Error>;",
                    escape_keyword(&to_snake_case(name)),
                    wrap_stream(request, *request_stream),
                    wrap_stream(response, *response_stream)
                );
            }
        }
        self.out.push_str("}\n");
    }

    fn emit_docs(&mut self, node: &Node) {
        for comment in &node.comments {
            for line in comment.text.lines() {
                let line = line.trim().trim_start_matches('*').trim();
                if line.is_empty() || line.starts_with('@') {
                    continue;
                }
                let _ = writeln!(self.out, "/// {}", line);
            }
        }
    }

    fn emit_derives(&mut self, directives: &[Directive], extra: &[&str]) {
        let mut derives: Vec<String> = DEFAULT_DERIVES.iter().map(|d| d.to_string()).collect();
        derives.extend(extra.iter().map(|d| d.to_string()));
        for directive in directives.iter().filter(|d| d.option == "rust_derive") {
            for derive in directive.value.split(',').map(str::trim) {
                if !derive.is_empty() && !derives.iter().any(|d| d == derive) {
                    derives.push(derive.to_string());
                }
            }
        }
        let _ = writeln!(self.out, "#[derive({})]", derives.join(", "));
    }
}

// =============================================================================
// Helper Utilities
// =============================================================================

fn skipped(directives: &[Directive]) -> bool {
    directives
        .iter()
        .any(|d| d.option == "rust_skip" && d.value.trim() == "true")
}

fn scalar_type(type_name: &str) -> Option<&'static str> {
    Some(match type_name {
        "double" => "f64",
        "float" => "f32",
        "int32" | "sint32" | "sfixed32" => "i32",
        "int64" | "sint64" | "sfixed64" => "i64",
        "uint32" | "fixed32" => "u32",
        "uint64" | "fixed64" => "u64",
        "bool" => "bool",
        "string" => "String",
        "bytes" => "Vec<u8>",
        _ => return None,
    })
}

/// Split `map<K, V>` into its key and value types
fn map_types(type_name: &str) -> Option<(&str, &str)> {
    let inner = type_name.strip_prefix("map<")?.strip_suffix('>')?;
    let (key, value) = inner.split_once(',')?;
    Some((key.trim(), value.trim()))
}

fn wrap_stream(type_name: String, stream: bool) -> String {
    if stream {
        format!("Vec<{}>", type_name)
    } else {
        type_name
    }
}

fn parse_int(number: &str) -> Option<i64> {
    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()?
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()?
    } else {
        digits.parse().ok()?
    };
    Some(if negative { -value } else { value })
}

fn escape_keyword(name: &str) -> String {
    if RUST_KEYWORDS.contains(&name) {
        format!("r#{}", name)
    } else {
        name.to_string()
    }
}
