//! Descriptor backend
//!
//! Dumps each parsed schema file as JSON: package, imports, directives and the
//! full tree. A `descriptor_set.json` package file lists every input file,
//! dependencies included, with its checksum.

use serde::Serialize;

use crate::ast::{Directive, Import, Node};
use crate::checksum::Checksum;
use crate::parser::ParseOptions;
use crate::schema;

use super::{
    file_stem, parse_all, GenerateError, GenerateResult, GeneratedFile, GeneratedOutput,
    Generator, GeneratorInput,
};

/// Set `pretty=false` in the compile options for compact output
pub const PRETTY_OPTION: &str = "pretty";

#[derive(Debug, Clone, Default)]
pub struct DescriptorGenerator {
    options: ParseOptions,
}

impl DescriptorGenerator {
    pub fn new(options: ParseOptions) -> Self {
        Self { options }
    }
}

#[derive(Serialize)]
struct FileDescriptor<'a> {
    path: &'a str,
    package: Option<&'a str>,
    imports: Vec<&'a Import>,
    directives: Vec<&'a Directive>,
    root: &'a Node,
}

#[derive(Serialize)]
struct SetEntry<'a> {
    path: &'a str,
    package: Option<&'a str>,
    checksum: Checksum,
    dependency: bool,
}

impl Generator for DescriptorGenerator {
    fn generate(&self, input: &GeneratorInput) -> GenerateResult {
        let own = parse_all(&input.schema_files, &self.options)?;
        let deps = parse_all(&input.dependency_files, &self.options)?;
        let pretty = input.option(PRETTY_OPTION) != Some("false");

        let mut output = GeneratedOutput::default();
        for (file, root) in &own {
            let descriptor = FileDescriptor {
                path: &file.path,
                package: schema::package_name(root),
                imports: schema::imports(root),
                directives: root.all_directives(),
                root,
            };
            output.files.push(GeneratedFile::new(
                format!("{}.json", file_stem(&file.path)),
                to_json(&descriptor, pretty)?,
            ));
        }

        let entries: Vec<SetEntry<'_>> = own
            .iter()
            .map(|entry| (entry, false))
            .chain(deps.iter().map(|entry| (entry, true)))
            .map(|((file, root), dependency)| SetEntry {
                path: &file.path,
                package: schema::package_name(root),
                checksum: file.checksum(),
                dependency,
            })
            .collect();
        output
            .package_files
            .push(GeneratedFile::new("descriptor_set.json", to_json(&entries, pretty)?));

        Ok(output)
    }

    fn describe(&self) -> &str {
        "JSON dump of parsed schema files"
    }
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String, GenerateError> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    rendered.map_err(|e| GenerateError::new(format!("descriptor serialization failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::version::SchemaFile;

    #[test]
    fn test_descriptor_contents() {
        let input = GeneratorInput {
            schema_files: vec![SchemaFile::new(
                "acme/user.proto",
                "package acme;\nimport \"common.proto\";\n// @buf:table:users\nmessage User {}",
            )],
            dependency_files: vec![SchemaFile::new("common.proto", "package common;")],
            ..Default::default()
        };
        let out = DescriptorGenerator::default().generate(&input).unwrap();

        assert_eq!(out.files[0].path, "acme_user.json");
        let value: serde_json::Value = serde_json::from_str(&out.files[0].content).unwrap();
        assert_eq!(value["package"], "acme");
        assert_eq!(value["imports"][0]["path"], "common.proto");
        assert_eq!(value["directives"][0]["option"], "table");
        assert_eq!(value["root"]["kind"]["node"], "root");

        let set: serde_json::Value = serde_json::from_str(&out.package_files[0].content).unwrap();
        assert_eq!(set.as_array().unwrap().len(), 2);
        assert_eq!(set[1]["dependency"], true);
        assert_eq!(set[1]["package"], "common");
    }

    #[test]
    fn test_compact_output() {
        let mut input = GeneratorInput {
            schema_files: vec![SchemaFile::new("a.proto", "syntax = \"proto3\";")],
            ..Default::default()
        };
        input.options.insert(PRETTY_OPTION.to_string(), "false".to_string());
        let out = DescriptorGenerator::default().generate(&input).unwrap();
        assert!(!out.files[0].content.contains('\n'));
    }
}
