//! Schema Registry
//!
//! Host-facing facade over the store, the resolver and the compiler. Versions
//! are append-only: publishing an existing `module@version` is rejected.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::compiler::{CompilationJob, CompilationResult, CompileRequest, Compiler};
use crate::config::RegistryConfig;
use crate::error::{RegistryError, Result};
use crate::resolver::{DependencyResolver, ResolvedDependencySet};
use crate::schema::SchemaFacade;
use crate::store::VersionStore;
use crate::version::{
    validate_version_string, DependencyRef, Module, SchemaFile, SourceInfo, Version,
};

/// Everything needed to publish one version
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub module: String,
    pub version: String,
    pub files: Vec<SchemaFile>,
    pub dependencies: Vec<String>,
    /// Replaces the module description when set
    pub description: Option<String>,
    pub source_info: SourceInfo,
}

impl PublishRequest {
    pub fn new(module: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            version: version.into(),
            ..Default::default()
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

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The main schema registry
pub struct SchemaRegistry {
    store: Arc<dyn VersionStore>,
    facade: SchemaFacade,
    resolver: DependencyResolver,
    /// Absent until the host wires one in
    compiler: Option<Compiler>,
}

impl SchemaRegistry {
    /// Registry with default parsing and single-level resolution
    pub fn new(store: Arc<dyn VersionStore>) -> Self {
        Self {
            resolver: DependencyResolver::new(Arc::clone(&store)),
            store,
            facade: SchemaFacade::default(),
            compiler: None,
        }
    }

    pub fn from_config(store: Arc<dyn VersionStore>, config: &RegistryConfig) -> Self {
        Self {
            resolver: config.resolver(Arc::clone(&store)),
            facade: config.schema_facade(),
            store,
            compiler: None,
        }
    }

    pub fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn store(&self) -> &Arc<dyn VersionStore> {
        &self.store
    }

    pub fn facade(&self) -> &SchemaFacade {
        &self.facade
    }

    pub fn resolver(&self) -> &DependencyResolver {
        &self.resolver
    }

    /// The wired compiler, or `ServiceUnavailable`
    pub fn compiler(&self) -> Result<&Compiler> {
        self.compiler.as_ref().ok_or_else(|| {
            RegistryError::ServiceUnavailable("no compiler configured for this registry".into())
        })
    }

    // =========================================================================
    // Publish
    // =========================================================================

    /// Publish a new version
    ///
    /// Every file must parse and every dependency must be a well-formed
    /// `module@version`. Dependencies are not required to exist yet.
    pub async fn publish(&self, request: PublishRequest) -> Result<Arc<Version>> {
        if request.module.trim().is_empty() || request.module.contains('@') {
            return Err(RegistryError::InvalidModuleName(request.module));
        }
        validate_version_string(&request.version)?;

        for file in &request.files {
            self.facade.validate(&file.content).map_err(|err| match err {
                RegistryError::Syntax {
                    message,
                    line,
                    column,
                } => RegistryError::Syntax {
                    message: format!("{}: {}", file.path, message),
                    line,
                    column,
                },
                other => other,
            })?;
        }
        for dependency in &request.dependencies {
            dependency.parse::<DependencyRef>()?;
        }

        let mut version = Version::new(&request.module, &request.version);
        version.files = request.files;
        version.dependencies = request.dependencies;
        version.source_info = request.source_info;
        version.seal();
        let id = version.id();
        let manifest = version.manifest_checksum();

        self.store.create_version(version).await?;

        let mut module = match self.store.get_module(&id.module).await {
            Ok(existing) => existing,
            Err(err) if err.is_not_found() => Module::new(&id.module),
            Err(err) => return Err(err),
        };
        if let Some(description) = request.description {
            module.description = Some(description);
        }
        module.touch();
        self.store.put_module(module).await?;

        tracing::info!(version = %id, checksum = %manifest, "published version");
        self.store.get_version(&id.module, &id.version).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub async fn get_module(&self, name: &str) -> Result<Module> {
        self.store.get_module(name).await
    }

    pub async fn list_modules(&self) -> Result<Vec<Module>> {
        self.store.list_modules().await
    }

    pub async fn get_version(&self, module: &str, version: &str) -> Result<Arc<Version>> {
        self.store.get_version(module, version).await
    }

    pub async fn get_file(&self, module: &str, version: &str, path: &str) -> Result<SchemaFile> {
        self.store.get_file(module, version, path).await
    }

    /// Versions of a module: semver by precedence, then other versions lexically
    pub async fn list_versions(&self, module: &str) -> Result<Vec<Arc<Version>>> {
        self.store.list_versions(module).await
    }

    pub async fn latest_version(&self, module: &str) -> Result<Arc<Version>> {
        self.list_versions(module)
            .await?
            .pop()
            .ok_or_else(|| RegistryError::VersionNotFound {
                module: module.to_string(),
                version: "latest".to_string(),
            })
    }

    pub async fn update_module_description(
        &self,
        name: &str,
        description: impl Into<String>,
    ) -> Result<Module> {
        let mut module = self.store.get_module(name).await?;
        module.description = Some(description.into());
        module.touch();
        self.store.put_module(module.clone()).await?;
        Ok(module)
    }

    pub async fn resolve(&self, module: &str, version: &str) -> Result<ResolvedDependencySet> {
        let found = self.store.get_version(module, version).await?;
        if !found.verify_checksums() {
            tracing::warn!(version = %found.id(), "stored files no longer match their checksums");
        }
        self.resolver.resolve(&found).await
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    /// Resolve a published version and compile it for every language
    pub async fn compile_version<S: AsRef<str>>(
        &self,
        module: &str,
        version: &str,
        languages: &[S],
        options: BTreeMap<String, String>,
        include_grpc: bool,
    ) -> Result<Vec<CompilationResult>> {
        let compiler = self.compiler()?;
        let resolved = self.resolve(module, version).await?;
        let mut request = CompileRequest::from_resolved(&resolved).with_grpc(include_grpc);
        request.options = options;
        compiler.compile_all(&request, languages).await
    }

    pub async fn compile_all<S: AsRef<str>>(
        &self,
        request: &CompileRequest,
        languages: &[S],
    ) -> Result<Vec<CompilationResult>> {
        self.compiler()?.compile_all(request, languages).await
    }

    pub async fn compile_single(
        &self,
        request: &CompileRequest,
        language: &str,
    ) -> Result<CompilationResult> {
        self.compiler()?.compile_single(request, language).await
    }

    pub async fn get_status(&self, job_id: &str) -> Result<CompilationJob> {
        self.compiler()?.get_status(job_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::GeneratorRegistry;
    use crate::store::MemoryStore;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn test_publish_seals_and_creates_module() {
        let registry = registry();
        let version = registry
            .publish(
                PublishRequest::new("common", "v1.0.0")
                    .with_file("common.proto", "message Timestamp { int64 seconds = 1; }")
                    .with_description("shared types"),
            )
            .await
            .unwrap();

        assert_eq!(version.checksums.len(), 1);
        assert!(version.verify_checksums());

        let module = registry.get_module("common").await.unwrap();
        assert_eq!(module.description.as_deref(), Some("shared types"));
    }

    #[tokio::test]
    async fn test_publish_is_append_only() {
        let registry = registry();
        let request = PublishRequest::new("common", "v1.0.0").with_file("a.proto", "");
        registry.publish(request.clone()).await.unwrap();
        assert!(matches!(
            registry.publish(request).await,
            Err(RegistryError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_publish_rejects_bad_input() {
        let registry = registry();

        let err = registry
            .publish(PublishRequest::new("common", "v1").with_file("bad.proto", "message {"))
            .await
            .unwrap_err();
        assert!(err.is_syntax());
        assert!(err.to_string().contains("bad.proto"));

        assert!(matches!(
            registry
                .publish(PublishRequest::new("svc", "v1").with_dependency("common"))
                .await,
            Err(RegistryError::InvalidDependency(_))
        ));
        assert!(matches!(
            registry.publish(PublishRequest::new("svc", "v 1")).await,
            Err(RegistryError::InvalidVersion(_))
        ));
        for name in ["", "  ", "svc@v1"] {
            match registry.publish(PublishRequest::new(name, "v1")).await {
                Err(RegistryError::InvalidModuleName(reported)) => assert_eq!(reported, name),
                other => panic!("expected invalid module name, got {:?}", other),
            }
        }
        assert!(registry.list_modules().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_and_description_update() {
        let registry = registry();
        for v in ["v1.2.0", "v1.10.0", "v1.9.0"] {
            registry.publish(PublishRequest::new("common", v)).await.unwrap();
        }
        assert_eq!(registry.latest_version("common").await.unwrap().version, "v1.10.0");

        let updated = registry
            .update_module_description("common", "well known types")
            .await
            .unwrap();
        assert!(updated.updated_at >= updated.created_at);
        assert!(matches!(
            registry.update_module_description("ghost", "x").await,
            Err(RegistryError::ModuleNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_compile_without_compiler_is_unavailable() {
        let registry = registry();
        registry.publish(PublishRequest::new("common", "v1")).await.unwrap();
        let err = registry
            .compile_version("common", "v1", &["go"], BTreeMap::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::ServiceUnavailable(_)));
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_compile_version_with_builtin_backend() {
        let registry = registry().with_compiler(Compiler::new(GeneratorRegistry::with_builtins(
            &Default::default(),
        )));
        registry
            .publish(
                PublishRequest::new("common", "v1.0.0")
                    .with_file("common.proto", "message Timestamp { int64 seconds = 1; }"),
            )
            .await
            .unwrap();
        registry
            .publish(
                PublishRequest::new("user-service", "v1.0.0")
                    .with_file(
                        "user.proto",
                        "import \"common.proto\";\nmessage User { Timestamp created = 1; }",
                    )
                    .with_dependency("common@v1.0.0"),
            )
            .await
            .unwrap();

        let results = registry
            .compile_version("user-service", "v1.0.0", &["rust"], BTreeMap::new(), false)
            .await
            .unwrap();
        assert!(results[0].success);
        assert_eq!(results[0].generated_files.len(), 1);
        assert!(results[0].generated_files[0]
            .content
            .contains("pub created: Option<Timestamp>,"));
    }
}
