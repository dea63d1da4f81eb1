//! Schema Facade
//!
//! Convenience operations over the parser: parse from text, byte streams or
//! files, pull out the package name and imports, or check syntax only.
//! Everything here is purely syntactic; nothing opens imported files.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ast::{Import, Node, NodeKind};
use crate::error::{RegistryError, Result};
use crate::parser::{self, ParseOptions};

/// What to do when a file has no `package` statement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPackagePolicy {
    /// Report [`RegistryError::NoPackage`]
    #[default]
    Error,
    /// Treat the file as belonging to the default (empty) package
    Empty,
}

/// Parser front-end configured once and reused
#[derive(Debug, Clone, Default)]
pub struct SchemaFacade {
    options: ParseOptions,
    missing_package: MissingPackagePolicy,
}

impl SchemaFacade {
    pub fn new(options: ParseOptions, missing_package: MissingPackagePolicy) -> Self {
        Self {
            options,
            missing_package,
        }
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn parse_str(&self, text: &str) -> Result<Node> {
        parser::parse_with(text, &self.options)
    }

    /// Parse raw bytes; input that is not UTF-8 fails with [`RegistryError::InvalidUtf8`]
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Node> {
        let text = std::str::from_utf8(bytes).map_err(|e| RegistryError::InvalidUtf8 {
            byte_offset: e.valid_up_to(),
        })?;
        self.parse_str(text)
    }

    pub fn parse_reader<R: Read>(&self, mut reader: R) -> Result<Node> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        self.parse_bytes(&bytes)
    }

    /// Parse a file on disk. Failing to open it is a [`RegistryError::FileOpen`],
    /// distinct from a syntax error in its content.
    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<Node> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| RegistryError::FileOpen {
            path: path.display().to_string(),
            source,
        })?;
        self.parse_reader(file)
    }

    /// Name from the first `package` statement
    pub fn extract_package_name(&self, text: &str) -> Result<String> {
        let root = self.parse_str(text)?;
        match package_name(&root) {
            Some(name) => Ok(name.to_string()),
            None => match self.missing_package {
                MissingPackagePolicy::Error => Err(RegistryError::NoPackage),
                MissingPackagePolicy::Empty => Ok(String::new()),
            },
        }
    }

    /// Imports in declaration order, flags verbatim
    pub fn extract_imports(&self, text: &str) -> Result<Vec<Import>> {
        let root = self.parse_str(text)?;
        Ok(imports(&root).into_iter().cloned().collect())
    }

    /// Syntax-only check
    pub fn validate(&self, text: &str) -> Result<()> {
        self.parse_str(text).map(|_| ())
    }
}

/// First `package` name directly under the root
pub fn package_name(root: &Node) -> Option<&str> {
    root.children().iter().find_map(|n| match &n.kind {
        NodeKind::Package { name } => Some(name.as_str()),
        _ => None,
    })
}

/// Import statements directly under the root, in order
pub fn imports(root: &Node) -> Vec<&Import> {
    root.children()
        .iter()
        .filter_map(|n| match &n.kind {
            NodeKind::Import(import) => Some(import),
            _ => None,
        })
        .collect()
}

// =============================================================================
// Default-configured shortcuts
// =============================================================================

pub fn parse_str(text: &str) -> Result<Node> {
    SchemaFacade::default().parse_str(text)
}

pub fn parse_reader<R: Read>(reader: R) -> Result<Node> {
    SchemaFacade::default().parse_reader(reader)
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<Node> {
    SchemaFacade::default().parse_file(path)
}

pub fn extract_package_name(text: &str) -> Result<String> {
    SchemaFacade::default().extract_package_name(text)
}

pub fn extract_imports(text: &str) -> Result<Vec<Import>> {
    SchemaFacade::default().extract_imports(text)
}

pub fn validate(text: &str) -> Result<()> {
    SchemaFacade::default().validate(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extract_package_name() {
        let name = extract_package_name("syntax = \"proto3\";\npackage acme.common.v1;\n").unwrap();
        assert_eq!(name, "acme.common.v1");
    }

    #[test]
    fn test_missing_package_policies() {
        let text = "syntax = \"proto3\";";
        assert!(matches!(
            extract_package_name(text),
            Err(RegistryError::NoPackage)
        ));

        let lenient = SchemaFacade::new(ParseOptions::default(), MissingPackagePolicy::Empty);
        assert_eq!(lenient.extract_package_name(text).unwrap(), "");
    }

    #[test]
    fn test_import_flags() {
        let imports =
            extract_imports(r#"import "a.proto"; import public "b.proto"; import weak "c.proto";"#)
                .unwrap();
        let flags: Vec<_> = imports
            .iter()
            .map(|i| (i.path.as_str(), i.public, i.weak))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("a.proto", false, false),
                ("b.proto", true, false),
                ("c.proto", false, true)
            ]
        );
    }

    #[test]
    fn test_validate_minimal_inputs() {
        assert!(validate("").is_ok());
        assert!(validate("syntax = \"proto3\";").is_ok());
        assert!(validate("message {").unwrap_err().is_syntax());
    }

    #[test]
    fn test_invalid_utf8_is_an_error() {
        let err = SchemaFacade::default()
            .parse_bytes(b"message A { string \xff = 1; }")
            .unwrap_err();
        assert!(matches!(err, RegistryError::InvalidUtf8 { byte_offset: 19 }));

        // truncated multi-byte sequence
        assert!(parse_reader(&b"// caf\xc3"[..]).is_err());
    }

    #[test]
    fn test_parse_file_distinguishes_open_failure() {
        let err = parse_file("/definitely/not/here.proto").unwrap_err();
        assert!(matches!(err, RegistryError::FileOpen { .. }));

        let mut file = NamedTempFile::new().unwrap();
        write!(file, "message Broken {{").unwrap();
        let err = parse_file(file.path()).unwrap_err();
        assert!(err.is_syntax());

        let mut good = NamedTempFile::new().unwrap();
        write!(good, "package ok;").unwrap();
        let root = parse_file(good.path()).unwrap();
        assert_eq!(package_name(&root), Some("ok"));
    }
}
