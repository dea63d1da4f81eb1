//! IDL Schema Registry
//!
//! A versioned, append-only registry for protocol-buffer style IDL files:
//! parse schemas (with directives embedded in comments), resolve
//! `module@version` dependencies, and compile versions through pluggable
//! per-language generator backends.
//!
//! ## Features
//!
//! - **Parser**: hand-written lexer and recursive-descent parser producing a
//!   positioned AST, with comments attached to the declarations they describe
//! - **Directives**: `@namespace:option:value` markers pulled out of comments
//! - **Dependency Resolution**: ordered, deduplicated file sets from the store
//! - **Compilation**: concurrent per-language jobs with a fingerprint cache
//! - **Checksum Validation**: SHA256 checksums guard published files
//!
//! ## Architecture
//!
//! ```text
//! text ─► parser ─► ast ─► schema facade
//!                              │
//! store ◄─ registry ─► resolver ─► compiler ─► codegen backends
//!                                     │
//!                                 job store / cache
//! ```
//!
//! On-disk layout read by the CLI:
//!
//! ```text
//! schemas/
//! ├── common/
//! │   └── v1.0.0/
//! │       └── common.proto
//! └── user-service/
//!     └── v1.0.0/
//!         ├── user.proto
//!         └── deps.txt        # common@v1.0.0
//! ```

pub mod ast;
pub mod checksum;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod parser;
pub mod registry;
pub mod resolver;
pub mod schema;
pub mod store;
pub mod version;

pub use ast::{Comment, Directive, Import, Node, NodeKind, Position, Span};
pub use checksum::{Checksum, Fingerprint};
pub use codegen::{GeneratedFile, GeneratedOutput, Generator, GeneratorInput, GeneratorRegistry};
pub use compiler::{
    CompilationJob, CompilationResult, CompileRequest, Compiler, CompilerOptions, JobStatus,
};
pub use config::RegistryConfig;
pub use error::{RegistryError, Result};
pub use parser::{parse, parse_with, ParseOptions};
pub use registry::{PublishRequest, SchemaRegistry};
pub use resolver::{DependencyResolver, ResolutionMode, ResolvedDependencySet};
pub use schema::{MissingPackagePolicy, SchemaFacade};
pub use store::{MemoryStore, VersionStore};
pub use version::{DependencyRef, Module, SchemaFile, Version, VersionId};
