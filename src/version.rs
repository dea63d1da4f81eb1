//! Modules, versions and dependency references

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::checksum::Checksum;
use crate::error::RegistryError;

/// A named, versioned collection of schema files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Module {
    /// Unique module name (e.g., "common", "user-service")
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A single schema source file within a version
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaFile {
    pub path: String,
    pub content: String,
}

impl SchemaFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::of_str(&self.content)
    }
}

/// Where a version's files came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    pub repository: Option<String>,
    pub commit: Option<String>,
    pub published_by: Option<String>,
}

/// Precompiled artifacts shipped with a version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilationInfo {
    /// language id -> artifact location
    pub artifacts: std::collections::BTreeMap<String, String>,
}

/// One immutable published snapshot of a module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    pub module_name: String,
    /// Semver string (with or without a leading `v`) or a content hash
    pub version: String,
    pub files: Vec<SchemaFile>,
    /// `module@version` references, in declaration order
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub source_info: SourceInfo,
    #[serde(default)]
    pub compilation_info: CompilationInfo,
    /// Per-file checksums, parallel to `files`
    #[serde(default)]
    pub checksums: Vec<Checksum>,
    pub created_at: DateTime<Utc>,
}

impl Version {
    pub fn new(module_name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            version: version.into(),
            files: Vec::new(),
            dependencies: Vec::new(),
            source_info: SourceInfo::default(),
            compilation_info: CompilationInfo::default(),
            checksums: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.push(SchemaFile::new(path, content));
        self
    }

    pub fn with_dependency(mut self, reference: impl Into<String>) -> Self {
        self.dependencies.push(reference.into());
        self
    }

    pub fn id(&self) -> VersionId {
        VersionId::new(&self.module_name, &self.version)
    }

    pub fn file(&self, path: &str) -> Option<&SchemaFile> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Record checksums for the current file set
    pub fn seal(&mut self) {
        self.checksums = self.files.iter().map(SchemaFile::checksum).collect();
    }

    /// Checksum over every file checksum, in file order
    pub fn manifest_checksum(&self) -> Checksum {
        Checksum::combine(&self.checksums)
    }

    /// True when every file still matches the checksum recorded at publish
    pub fn verify_checksums(&self) -> bool {
        self.checksums.len() == self.files.len()
            && self
                .files
                .iter()
                .zip(&self.checksums)
                .all(|(file, checksum)| checksum.verify(&file.content))
    }

    /// Parsed dependency references
    pub fn dependency_refs(&self) -> Result<Vec<DependencyRef>, RegistryError> {
        self.dependencies.iter().map(|d| d.parse()).collect()
    }

    pub fn sort_key(&self) -> VersionKey {
        VersionKey::parse(&self.version)
    }
}

// =============================================================================
// Identifiers
// =============================================================================

/// `(module, version)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VersionId {
    pub module: String,
    pub version: String,
}

impl VersionId {
    pub fn new(module: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.module, self.version)
    }
}

/// A parsed `module@version` dependency string
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyRef {
    pub raw: String,
    pub id: VersionId,
}

impl FromStr for DependencyRef {
    type Err = RegistryError;

    /// Splits on the last `@`, so scoped names like `@acme/common@v1` work
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (module, version) = raw
            .rsplit_once('@')
            .ok_or_else(|| RegistryError::InvalidDependency(raw.to_string()))?;
        if module.trim().is_empty() || version.trim().is_empty() {
            return Err(RegistryError::InvalidDependency(raw.to_string()));
        }
        Ok(Self {
            raw: raw.to_string(),
            id: VersionId::new(module, version),
        })
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// =============================================================================
// Ordering
// =============================================================================

/// Sort key for version strings: semver releases by precedence first, then
/// anything else (content hashes, free-form tags) lexically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionKey {
    Semver(semver::Version),
    Other(String),
}

impl VersionKey {
    pub fn parse(version: &str) -> Self {
        // Strip leading 'v' if present
        let trimmed = version.strip_prefix('v').unwrap_or(version);
        match semver::Version::parse(trimmed) {
            Ok(v) => VersionKey::Semver(v),
            Err(_) => VersionKey::Other(version.to_string()),
        }
    }

    pub fn is_semver(&self) -> bool {
        matches!(self, VersionKey::Semver(_))
    }
}

impl PartialOrd for VersionKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (VersionKey::Semver(a), VersionKey::Semver(b)) => a.cmp(b),
            (VersionKey::Semver(_), VersionKey::Other(_)) => Ordering::Less,
            (VersionKey::Other(_), VersionKey::Semver(_)) => Ordering::Greater,
            (VersionKey::Other(a), VersionKey::Other(b)) => a.cmp(b),
        }
    }
}

/// Check a version string is usable: non-empty, no whitespace, no `@`
pub fn validate_version_string(version: &str) -> Result<(), RegistryError> {
    if version.is_empty() || version.contains('@') || version.chars().any(char::is_whitespace) {
        return Err(RegistryError::InvalidVersion(version.to_string()));
    }
    Ok(())
}
