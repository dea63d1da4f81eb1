//! Code Generation
//!
//! Generator backends turn schema files into one target language's source.
//!
//! Architecture:
//! - Generator: a synchronous, independently failable backend
//! - GeneratorRegistry: language id -> backend, consulted by the compiler
//! - GeneratorInput/GeneratedOutput: the only data crossing the boundary
//!
//! Backends never see jobs, caches or stores. Adding a language means
//! registering another [`Generator`], not touching the compiler.

pub mod descriptor;
pub mod rust;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ast::Node;
use crate::parser::{self, ParseOptions};
use crate::version::SchemaFile;

pub use descriptor::DescriptorGenerator;
pub use rust::RustGenerator;

// =============================================================================
// Boundary types
// =============================================================================

/// Everything a backend gets to look at
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorInput {
    /// Files to generate code for
    pub schema_files: Vec<SchemaFile>,
    /// Files available for type lookups only
    pub dependency_files: Vec<SchemaFile>,
    pub options: BTreeMap<String, String>,
    pub include_grpc: bool,
}

impl GeneratorInput {
    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }
}

/// One emitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub path: String,
    pub content: String,
}

impl GeneratedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Backend output: per-schema files plus package-level glue (module indexes, manifests)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedOutput {
    pub files: Vec<GeneratedFile>,
    pub package_files: Vec<GeneratedFile>,
}

/// A backend's own failure, carried into a failed compilation result
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct GenerateError {
    pub message: String,
}

impl GenerateError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type GenerateResult = std::result::Result<GeneratedOutput, GenerateError>;

/// A code generation backend for one target language
pub trait Generator: Send + Sync {
    fn generate(&self, input: &GeneratorInput) -> GenerateResult;

    /// Short human description for listings
    fn describe(&self) -> &str {
        ""
    }
}

/// Closures work as backends; handy for hosts wiring external tools and for tests
impl<F> Generator for F
where
    F: Fn(&GeneratorInput) -> GenerateResult + Send + Sync,
{
    fn generate(&self, input: &GeneratorInput) -> GenerateResult {
        self(input)
    }
}

// =============================================================================
// Registry
// =============================================================================

/// Language id -> backend
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<String, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `rust` and `descriptor` backends
    pub fn with_builtins(options: &ParseOptions) -> Self {
        let mut registry = Self::new();
        registry.register("rust", RustGenerator::new(options.clone()));
        registry.register("descriptor", DescriptorGenerator::new(options.clone()));
        registry
    }

    /// Register (or replace) the backend for a language
    pub fn register(&mut self, language: impl Into<String>, generator: impl Generator + 'static) {
        self.register_arc(language, Arc::new(generator));
    }

    pub fn register_arc(&mut self, language: impl Into<String>, generator: Arc<dyn Generator>) {
        let language = language.into();
        tracing::debug!(language = %language, "registered generator");
        self.generators.insert(language, generator);
    }

    pub fn get(&self, language: &str) -> Option<Arc<dyn Generator>> {
        self.generators.get(language).cloned()
    }

    pub fn contains(&self, language: &str) -> bool {
        self.generators.contains_key(language)
    }

    /// Registered language ids, sorted
    pub fn languages(&self) -> Vec<String> {
        let mut languages: Vec<String> = self.generators.keys().cloned().collect();
        languages.sort();
        languages
    }

    /// `(language, description)` for every backend, sorted by language
    pub fn descriptions(&self) -> Vec<(String, String)> {
        self.languages()
            .into_iter()
            .filter_map(|language| {
                let description = self.generators.get(&language)?.describe().to_string();
                Some((language, description))
            })
            .collect()
    }
}

impl fmt::Debug for GeneratorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorRegistry")
            .field("languages", &self.languages())
            .finish()
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Parse every file, turning the first syntax error into a backend error
pub(crate) fn parse_all<'a>(
    files: &'a [SchemaFile],
    options: &ParseOptions,
) -> std::result::Result<Vec<(&'a SchemaFile, Node)>, GenerateError> {
    files
        .iter()
        .map(|file| {
            parser::parse_with(&file.content, options)
                .map(|root| (file, root))
                .map_err(|e| GenerateError::new(format!("{}: {}", file.path, e)))
        })
        .collect()
}

/// Drop the extension and turn path separators into underscores
pub(crate) fn file_stem(path: &str) -> String {
    let without_ext = match path.rsplit_once('.') {
        Some((stem, ext)) if !ext.contains('/') => stem,
        _ => path,
    };
    without_ext.replace(['/', '\\', '.'], "_")
}

/// Convert to PascalCase. All-caps words (`ACTIVE`, `HTTP_CODE`) are lowered first.
pub(crate) fn to_pascal_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len());

    for word in s.split(|c: char| c == '_' || c == '-' || c == ' ' || c == '.') {
        if word.is_empty() {
            continue;
        }
        let all_caps = word.chars().all(|c| !c.is_ascii_lowercase());
        let mut chars = word.chars();
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            for c in chars {
                result.push(if all_caps { c.to_ascii_lowercase() } else { c });
            }
        }
    }

    result
}

/// Convert to snake_case
pub(crate) fn to_snake_case(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 4);
    let mut prev_lower = false;

    for c in s.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                result.push('_');
            }
            result.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else if c == '-' || c == ' ' || c == '.' {
            result.push('_');
            prev_lower = false;
        } else {
            result.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }

    result
}
