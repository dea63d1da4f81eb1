//! Module/Version Store
//!
//! The resolver and compiler only read through [`VersionStore`]; writes come
//! from the publish flow. [`MemoryStore`] is the in-process implementation
//! used by tests and the CLI. [`load_layout`] reads an on-disk tree of
//! `<root>/<module>/<version>/...` into versions.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use walkdir::WalkDir;

use crate::error::{RegistryError, Result};
use crate::version::{Module, SchemaFile, Version, VersionId};

/// Dependency list file inside a version directory, one `module@version` per line
pub const DEPENDENCY_FILE: &str = "deps.txt";

/// Schema file extension picked up by [`load_layout`]
pub const SCHEMA_EXTENSION: &str = "proto";

#[async_trait]
pub trait VersionStore: Send + Sync {
    async fn get_module(&self, name: &str) -> Result<Module>;

    async fn list_modules(&self) -> Result<Vec<Module>>;

    /// Insert or replace module metadata
    async fn put_module(&self, module: Module) -> Result<()>;

    async fn get_version(&self, module: &str, version: &str) -> Result<Arc<Version>>;

    /// Versions of a module, oldest first
    async fn list_versions(&self, module: &str) -> Result<Vec<Arc<Version>>>;

    /// Store a new version; an existing `(module, version)` pair is rejected
    async fn create_version(&self, version: Version) -> Result<()>;

    async fn get_file(&self, module: &str, version: &str, path: &str) -> Result<SchemaFile> {
        let found = self.get_version(module, version).await?;
        found
            .file(path)
            .cloned()
            .ok_or_else(|| RegistryError::FileNotFound {
                module: module.to_string(),
                version: version.to_string(),
                path: path.to_string(),
            })
    }
}

// =============================================================================
// In-memory store
// =============================================================================

#[derive(Default)]
pub struct MemoryStore {
    modules: DashMap<String, Module>,
    versions: DashMap<VersionId, Arc<Version>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// Load every version under `root` (see [`load_layout`])
    pub async fn load_layout(&self, root: impl AsRef<Path>) -> Result<usize> {
        let versions = load_layout(root)?;
        let count = versions.len();
        for version in versions {
            self.create_version(version).await?;
        }
        Ok(count)
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn get_module(&self, name: &str) -> Result<Module> {
        self.modules
            .get(name)
            .map(|m| m.value().clone())
            .ok_or_else(|| RegistryError::ModuleNotFound(name.to_string()))
    }

    async fn list_modules(&self) -> Result<Vec<Module>> {
        let mut modules: Vec<Module> = self.modules.iter().map(|m| m.value().clone()).collect();
        modules.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(modules)
    }

    async fn put_module(&self, module: Module) -> Result<()> {
        self.modules.insert(module.name.clone(), module);
        Ok(())
    }

    async fn get_version(&self, module: &str, version: &str) -> Result<Arc<Version>> {
        let id = VersionId::new(module, version);
        if let Some(found) = self.versions.get(&id) {
            return Ok(Arc::clone(found.value()));
        }
        if !self.modules.contains_key(module) {
            return Err(RegistryError::ModuleNotFound(module.to_string()));
        }
        Err(RegistryError::VersionNotFound {
            module: module.to_string(),
            version: version.to_string(),
        })
    }

    async fn list_versions(&self, module: &str) -> Result<Vec<Arc<Version>>> {
        if !self.modules.contains_key(module) {
            return Err(RegistryError::ModuleNotFound(module.to_string()));
        }
        let mut versions: Vec<Arc<Version>> = self
            .versions
            .iter()
            .filter(|entry| entry.key().module == module)
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        versions.sort_by(|a, b| {
            a.sort_key()
                .cmp(&b.sort_key())
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(versions)
    }

    async fn create_version(&self, version: Version) -> Result<()> {
        let id = version.id();
        match self.versions.entry(id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyExists {
                module: id.module,
                version: id.version,
            }),
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(version));
                self.modules
                    .entry(id.module.clone())
                    .or_insert_with(|| Module::new(id.module.clone()));
                Ok(())
            }
        }
    }
}

// =============================================================================
// On-disk layout
// =============================================================================

/// Read `<root>/<module>/<version>/` directories into sealed versions.
///
/// Every `*.proto` below a version directory becomes a file, keyed by its path
/// relative to that directory (sorted, `/`-separated). An optional `deps.txt`
/// lists dependencies; blank lines and `#` comments are skipped.
pub fn load_layout(root: impl AsRef<Path>) -> Result<Vec<Version>> {
    let root = root.as_ref();
    let mut versions = Vec::new();

    for module_entry in sorted_dirs(root)? {
        let module_name = module_entry.file_name().to_string_lossy().to_string();
        for version_entry in sorted_dirs(&module_entry.path())? {
            let version_name = version_entry.file_name().to_string_lossy().to_string();
            let version_dir = version_entry.path();
            let mut version = Version::new(&module_name, &version_name);

            let mut files: Vec<SchemaFile> = Vec::new();
            for entry in WalkDir::new(&version_dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let path = entry.path();
                if path.extension().map(|ext| ext != SCHEMA_EXTENSION).unwrap_or(true) {
                    continue;
                }
                let relative = path
                    .strip_prefix(&version_dir)
                    .unwrap_or(path)
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().to_string())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push(SchemaFile::new(relative, fs::read_to_string(path)?));
            }
            files.sort_by(|a, b| a.path.cmp(&b.path));
            version.files = files;

            let deps_path = version_dir.join(DEPENDENCY_FILE);
            if deps_path.exists() {
                version.dependencies = fs::read_to_string(&deps_path)?
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(String::from)
                    .collect();
            }

            version.seal();
            tracing::debug!(version = %version.id(), files = version.files.len(), "loaded version");
            versions.push(version);
        }
    }

    Ok(versions)
}

fn sorted_dirs(dir: &Path) -> Result<Vec<fs::DirEntry>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry);
        }
    }
    dirs.sort_by_key(|e| e.file_name());
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_duplicate_version_rejected() {
        let store = MemoryStore::new();
        store
            .create_version(Version::new("common", "v1.0.0"))
            .await
            .unwrap();
        let err = store
            .create_version(Version::new("common", "v1.0.0"))
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists { .. }));
        assert_eq!(store.version_count(), 1);
    }

    #[tokio::test]
    async fn test_not_found_distinguishes_module_and_version() {
        let store = MemoryStore::new();
        store
            .create_version(Version::new("common", "v1.0.0"))
            .await
            .unwrap();

        assert!(matches!(
            store.get_version("missing", "v1.0.0").await,
            Err(RegistryError::ModuleNotFound(_))
        ));
        assert!(matches!(
            store.get_version("common", "v9.9.9").await,
            Err(RegistryError::VersionNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_file() {
        let store = MemoryStore::new();
        let version = Version::new("common", "v1.0.0").with_file("common.proto", "package common;");
        store.create_version(version).await.unwrap();

        let file = store.get_file("common", "v1.0.0", "common.proto").await.unwrap();
        assert_eq!(file.content, "package common;");
        assert!(matches!(
            store.get_file("common", "v1.0.0", "other.proto").await,
            Err(RegistryError::FileNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_list_versions_sorted() {
        let store = MemoryStore::new();
        for v in ["v1.10.0", "v1.2.0", "v1.9.1"] {
            store.create_version(Version::new("common", v)).await.unwrap();
        }
        let listed: Vec<_> = store
            .list_versions("common")
            .await
            .unwrap()
            .iter()
            .map(|v| v.version.clone())
            .collect();
        assert_eq!(listed, vec!["v1.2.0", "v1.9.1", "v1.10.0"]);
    }

    #[tokio::test]
    async fn test_load_layout() {
        let dir = tempdir().unwrap();
        let v1 = dir.path().join("user-service/v1.0.0/acme");
        fs::create_dir_all(&v1).unwrap();
        fs::write(v1.join("user.proto"), "package acme;").unwrap();
        fs::write(v1.join("README.md"), "ignored").unwrap();
        fs::write(
            dir.path().join("user-service/v1.0.0").join(DEPENDENCY_FILE),
            "# pinned\ncommon@v1.0.0\n\n",
        )
        .unwrap();

        let store = MemoryStore::new();
        assert_eq!(store.load_layout(dir.path()).await.unwrap(), 1);

        let version = store.get_version("user-service", "v1.0.0").await.unwrap();
        assert_eq!(version.files.len(), 1);
        assert_eq!(version.files[0].path, "acme/user.proto");
        assert_eq!(version.dependencies, vec!["common@v1.0.0"]);
        assert!(version.verify_checksums());
    }
}
