//! Dependency Resolver
//!
//! Expands a version's `module@version` list into the file set needed to
//! compile it. Store reads for one level of dependencies run concurrently and
//! are joined before anything is assembled, so callers only ever see a
//! complete set or an error.
//!
//! Ordering: the version's own files first, then each dependency's files in
//! dependency-list order. When two sources contribute the same path, the
//! first one wins.

use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;

use crate::error::{RegistryError, Result};
use crate::store::VersionStore;
use crate::version::{DependencyRef, SchemaFile, Version, VersionId};

/// How far dependency expansion goes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMode {
    /// Only the versions listed directly on the version being resolved
    #[default]
    Direct,
    /// The full closure, breadth-first, each version visited once
    Transitive,
}

/// A file path that lost to an earlier contributor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowedFile {
    pub path: String,
    pub kept_from: VersionId,
    pub dropped_from: VersionId,
}

/// Files a compile needs: own files plus dependency files, deduplicated by path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependencySet {
    pub root: VersionId,
    files: Vec<SchemaFile>,
    own_count: usize,
    /// Dependency versions that contributed, in resolution order
    pub versions: Vec<VersionId>,
    pub shadowed: Vec<ShadowedFile>,
}

impl ResolvedDependencySet {
    /// Every file, own files first
    pub fn files(&self) -> &[SchemaFile] {
        &self.files
    }

    pub fn own_files(&self) -> &[SchemaFile] {
        &self.files[..self.own_count]
    }

    pub fn dependency_files(&self) -> &[SchemaFile] {
        &self.files[self.own_count..]
    }

    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Builds [`ResolvedDependencySet`]s from store reads
#[derive(Clone)]
pub struct DependencyResolver {
    store: Arc<dyn VersionStore>,
    mode: ResolutionMode,
    max_depth: usize,
}

impl DependencyResolver {
    pub const DEFAULT_MAX_DEPTH: usize = 32;

    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self {
            store,
            mode: ResolutionMode::Direct,
            max_depth: Self::DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_mode(mut self, mode: ResolutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    /// Fetch `module@version` from the store and resolve it
    pub async fn resolve_ref(&self, module: &str, version: &str) -> Result<ResolvedDependencySet> {
        let found = self.store.get_version(module, version).await?;
        self.resolve(&found).await
    }

    pub async fn resolve(&self, version: &Version) -> Result<ResolvedDependencySet> {
        let root = version.id();
        let mut set = Assembler::new(root.clone());
        for file in &version.files {
            set.add(file, &root);
        }
        set.own_count = set.files.len();

        let mut visited: HashSet<VersionId> = HashSet::new();
        visited.insert(root.clone());

        let mut frontier = version.dependency_refs()?;
        let mut depth = 0usize;

        while !frontier.is_empty() {
            let mut level = Vec::with_capacity(frontier.len());
            for dep in frontier {
                if visited.insert(dep.id.clone()) {
                    level.push(dep);
                } else if dep.id == root {
                    tracing::warn!(root = %root, "dependency cycle back to the version being resolved");
                } else {
                    tracing::debug!(dependency = %dep, "dependency already resolved");
                }
            }
            // Only levels that still bring in unseen versions count toward the limit
            if level.is_empty() {
                break;
            }

            depth += 1;
            if depth > self.max_depth {
                return Err(RegistryError::DependencyTooDeep {
                    root: root.to_string(),
                    max_depth: self.max_depth,
                });
            }

            let fetched = self.fetch_level(&level).await?;

            let mut next = Vec::new();
            for dep_version in &fetched {
                let dep_id = dep_version.id();
                for file in &dep_version.files {
                    set.add(file, &dep_id);
                }
                set.versions.push(dep_id);
                if self.mode == ResolutionMode::Transitive {
                    next.extend(dep_version.dependency_refs()?);
                }
            }
            frontier = next;
        }

        tracing::debug!(
            root = %root,
            files = set.files.len(),
            dependencies = set.versions.len(),
            "resolved dependencies"
        );
        Ok(set.finish())
    }

    /// Read every reference concurrently; results come back in input order
    async fn fetch_level(&self, level: &[DependencyRef]) -> Result<Vec<Arc<Version>>> {
        let mut tasks = JoinSet::new();
        for (index, dep) in level.iter().enumerate() {
            let store = Arc::clone(&self.store);
            let id = dep.id.clone();
            tasks.spawn(async move { (index, store.get_version(&id.module, &id.version).await) });
        }

        let mut slots: Vec<Option<Result<Arc<Version>>>> = (0..level.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.map_err(|e| {
                RegistryError::ServiceUnavailable(format!("store read task failed: {}", e))
            })?;
            slots[index] = Some(result);
        }

        let mut versions = Vec::with_capacity(level.len());
        for (dep, slot) in level.iter().zip(slots) {
            match slot {
                Some(Ok(version)) => versions.push(version),
                Some(Err(err)) if err.is_not_found() => {
                    return Err(RegistryError::DependencyNotFound {
                        reference: dep.raw.clone(),
                        source: Box::new(err),
                    });
                }
                Some(Err(err)) => return Err(err),
                None => {
                    return Err(RegistryError::ServiceUnavailable(format!(
                        "no store result for {}",
                        dep
                    )))
                }
            }
        }
        Ok(versions)
    }
}

struct Assembler {
    root: VersionId,
    files: Vec<SchemaFile>,
    origins: Vec<VersionId>,
    seen: HashSet<String>,
    own_count: usize,
    versions: Vec<VersionId>,
    shadowed: Vec<ShadowedFile>,
}

impl Assembler {
    fn new(root: VersionId) -> Self {
        Self {
            root,
            files: Vec::new(),
            origins: Vec::new(),
            seen: HashSet::new(),
            own_count: 0,
            versions: Vec::new(),
            shadowed: Vec::new(),
        }
    }

    fn add(&mut self, file: &SchemaFile, origin: &VersionId) {
        if self.seen.insert(file.path.clone()) {
            self.files.push(file.clone());
            self.origins.push(origin.clone());
            return;
        }
        let kept_from = self
            .files
            .iter()
            .position(|f| f.path == file.path)
            .map(|i| self.origins[i].clone())
            .unwrap_or_else(|| self.root.clone());
        tracing::debug!(path = %file.path, kept = %kept_from, dropped = %origin, "duplicate path");
        self.shadowed.push(ShadowedFile {
            path: file.path.clone(),
            kept_from,
            dropped_from: origin.clone(),
        });
    }

    fn finish(self) -> ResolvedDependencySet {
        ResolvedDependencySet {
            root: self.root,
            files: self.files,
            own_count: self.own_count,
            versions: self.versions,
            shadowed: self.shadowed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn store_with(versions: Vec<Version>) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for v in versions {
            store.create_version(v).await.unwrap();
        }
        store
    }

    fn common() -> Version {
        Version::new("common", "v1.0.0")
            .with_file("common.proto", "message Timestamp { int64 seconds = 1; }")
    }

    #[tokio::test]
    async fn test_direct_resolution_order() {
        let store = store_with(vec![
            common(),
            Version::new("money", "v2.0.0").with_file("money.proto", "message Money {}"),
        ])
        .await;
        let resolver = DependencyResolver::new(store);

        let user = Version::new("user-service", "v1.0.0")
            .with_file("user.proto", "import \"common.proto\";")
            .with_dependency("common@v1.0.0")
            .with_dependency("money@v2.0.0");

        let set = resolver.resolve(&user).await.unwrap();
        assert_eq!(set.paths(), vec!["user.proto", "common.proto", "money.proto"]);
        assert_eq!(set.own_files().len(), 1);
        assert_eq!(set.dependency_files().len(), 2);
    }

    #[tokio::test]
    async fn test_first_seen_path_wins() {
        let store = store_with(vec![
            Version::new("a", "v1").with_file("shared.proto", "// from a"),
            Version::new("b", "v1").with_file("shared.proto", "// from b"),
        ])
        .await;
        let resolver = DependencyResolver::new(store);
        let root = Version::new("root", "v1")
            .with_dependency("a@v1")
            .with_dependency("b@v1");

        let set = resolver.resolve(&root).await.unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.files()[0].content, "// from a");
        assert_eq!(set.shadowed[0].dropped_from, VersionId::new("b", "v1"));
    }

    #[tokio::test]
    async fn test_missing_dependency_fails_whole_resolution() {
        let store = store_with(vec![common()]).await;
        let resolver = DependencyResolver::new(store);
        let root = Version::new("root", "v1")
            .with_dependency("common@v1.0.0")
            .with_dependency("ghost@v0.1.0");

        match resolver.resolve(&root).await {
            Err(RegistryError::DependencyNotFound { reference, .. }) => {
                assert_eq!(reference, "ghost@v0.1.0")
            }
            other => panic!("expected dependency error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_direct_mode_does_not_recurse() {
        let store = store_with(vec![
            common(),
            Version::new("auth", "v1")
                .with_file("auth.proto", "")
                .with_dependency("common@v1.0.0"),
        ])
        .await;
        let root = Version::new("root", "v1").with_dependency("auth@v1");

        let direct = DependencyResolver::new(store.clone());
        assert_eq!(direct.resolve(&root).await.unwrap().paths(), vec!["auth.proto"]);

        let transitive = DependencyResolver::new(store).with_mode(ResolutionMode::Transitive);
        assert_eq!(
            transitive.resolve(&root).await.unwrap().paths(),
            vec!["auth.proto", "common.proto"]
        );
    }

    #[tokio::test]
    async fn test_transitive_cycle_terminates() {
        let store = store_with(vec![
            Version::new("a", "v1")
                .with_file("a.proto", "")
                .with_dependency("b@v1"),
            Version::new("b", "v1")
                .with_file("b.proto", "")
                .with_dependency("a@v1"),
        ])
        .await;
        let resolver = DependencyResolver::new(store.clone()).with_mode(ResolutionMode::Transitive);

        let set = resolver.resolve_ref("a", "v1").await.unwrap();
        assert_eq!(set.paths(), vec!["a.proto", "b.proto"]);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let mut versions = Vec::new();
        for i in 0..5 {
            versions.push(
                Version::new(format!("m{}", i), "v1")
                    .with_file(format!("m{}.proto", i), "")
                    .with_dependency(format!("m{}@v1", i + 1)),
            );
        }
        versions.push(Version::new("m5", "v1"));
        let store = store_with(versions).await;

        let resolver = DependencyResolver::new(store)
            .with_mode(ResolutionMode::Transitive)
            .with_max_depth(2);
        assert!(matches!(
            resolver.resolve_ref("m0", "v1").await,
            Err(RegistryError::DependencyTooDeep { .. })
        ));
    }

    #[tokio::test]
    async fn test_closure_complete_at_depth_limit() {
        let store = store_with(vec![
            Version::new("root", "v1")
                .with_file("root.proto", "")
                .with_dependency("a@v1"),
            Version::new("a", "v1")
                .with_file("a.proto", "")
                .with_dependency("root@v1"),
            Version::new("left", "v1")
                .with_file("left.proto", "")
                .with_dependency("base@v1"),
            Version::new("right", "v1")
                .with_file("right.proto", "")
                .with_dependency("base@v1"),
            Version::new("base", "v1").with_file("base.proto", ""),
        ])
        .await;

        let one_level = DependencyResolver::new(store.clone())
            .with_mode(ResolutionMode::Transitive)
            .with_max_depth(1);
        let cycle = one_level.resolve_ref("root", "v1").await.unwrap();
        assert_eq!(cycle.paths(), vec!["root.proto", "a.proto"]);

        let diamond = Version::new("top", "v1")
            .with_dependency("left@v1")
            .with_dependency("right@v1")
            .with_dependency("base@v1");
        let set = one_level.resolve(&diamond).await.unwrap();
        assert_eq!(set.paths(), vec!["left.proto", "right.proto", "base.proto"]);
    }

    #[tokio::test]
    async fn test_resolution_is_deterministic() {
        let store = store_with(vec![common()]).await;
        let resolver = DependencyResolver::new(store);
        let root = Version::new("user-service", "v1.0.0")
            .with_file("user.proto", "")
            .with_dependency("common@v1.0.0");

        let first = resolver.resolve(&root).await.unwrap();
        let second = resolver.resolve(&root).await.unwrap();
        assert_eq!(first, second);
    }
}
