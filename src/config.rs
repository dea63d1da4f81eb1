//! Configuration management for the IDL registry
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file (registry.toml)
//! - Environment variables (IDLREG__*)
//!
//! ## Example config file (registry.toml):
//! ```toml
//! [registry]
//! root = "./schemas"
//!
//! [parser]
//! directive_namespace = "buf"
//! missing_package = "error"
//!
//! [resolver]
//! mode = "direct"
//! max_depth = 32
//!
//! [compiler]
//! max_concurrency = 8
//! generator_timeout_secs = 60
//! cache_enabled = true
//! ```

use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::compiler::CompilerOptions;
use crate::error::{RegistryError, Result};
use crate::parser::ParseOptions;
use crate::resolver::{DependencyResolver, ResolutionMode};
use crate::schema::{MissingPackagePolicy, SchemaFacade};
use crate::store::VersionStore;

/// Main configuration for the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub registry: StorageConfig,

    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub resolver: ResolverConfig,

    #[serde(default)]
    pub compiler: CompilerConfig,
}

/// Where the on-disk `<module>/<version>/` layout lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Directive namespace; empty accepts any namespace
    #[serde(default = "default_namespace")]
    pub directive_namespace: String,

    #[serde(default)]
    pub missing_package: MissingPackagePolicy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolverConfig {
    #[serde(default)]
    pub mode: ResolutionMode,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilerConfig {
    /// Defaults to the machine's available parallelism
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    #[serde(default = "default_timeout_secs")]
    pub generator_timeout_secs: u64,

    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from("./schemas")
}

fn default_namespace() -> String {
    "buf".to_string()
}

fn default_max_depth() -> usize {
    DependencyResolver::DEFAULT_MAX_DEPTH
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            directive_namespace: default_namespace(),
            missing_package: MissingPackagePolicy::default(),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::default(),
            max_depth: default_max_depth(),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            generator_timeout_secs: default_timeout_secs(),
            cache_enabled: true,
        }
    }
}

impl RegistryConfig {
    /// Load configuration from default locations
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, with `config_path` (if any) layered over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        for location in ["registry.toml", ".registry.toml", "config/registry.toml"] {
            builder = builder.add_source(File::with_name(location).required(false));
        }

        if let Some(dirs) = directories::ProjectDirs::from("dev", "idl", "idl-registry") {
            let xdg_config = dirs.config_dir().join("registry.toml");
            if xdg_config.exists() {
                builder = builder.add_source(File::from(xdg_config).required(false));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // IDLREG__COMPILER__CACHE_ENABLED=false
        builder = builder.add_source(
            Environment::with_prefix("IDLREG")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// Save configuration to a file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            RegistryError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn parse_options(&self) -> ParseOptions {
        let namespace = self.parser.directive_namespace.trim();
        if namespace.is_empty() {
            ParseOptions::default()
        } else {
            ParseOptions::with_namespace(namespace)
        }
    }

    pub fn schema_facade(&self) -> SchemaFacade {
        SchemaFacade::new(self.parse_options(), self.parser.missing_package)
    }

    pub fn resolver(&self, store: Arc<dyn VersionStore>) -> DependencyResolver {
        DependencyResolver::new(store)
            .with_mode(self.resolver.mode)
            .with_max_depth(self.resolver.max_depth)
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        let defaults = CompilerOptions::default();
        CompilerOptions {
            max_concurrency: self
                .compiler
                .max_concurrency
                .unwrap_or(defaults.max_concurrency),
            generator_timeout: Duration::from_secs(self.compiler.generator_timeout_secs),
            cache_enabled: self.compiler.cache_enabled,
        }
    }

    /// Registry root, resolved against the current directory
    pub fn root_path(&self) -> PathBuf {
        if self.registry.root.is_absolute() {
            self.registry.root.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.registry.root)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.parser.directive_namespace, "buf");
        assert_eq!(config.parser.missing_package, MissingPackagePolicy::Error);
        assert_eq!(config.resolver.mode, ResolutionMode::Direct);
        assert_eq!(config.resolver.max_depth, 32);
        assert!(config.compiler.cache_enabled);
        assert_eq!(config.compiler_options().generator_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_serialize_config() {
        let config = RegistryConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[parser]"));
        assert!(toml_str.contains("[resolver]"));
        assert!(toml_str.contains("mode = \"direct\""));
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[parser]\nmissing_package = \"empty\"\ndirective_namespace = \"\"\n\n[resolver]\nmode = \"transitive\"\n\n[compiler]\nmax_concurrency = 2\n",
        )
        .unwrap();

        let config = RegistryConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.parser.missing_package, MissingPackagePolicy::Empty);
        assert_eq!(config.resolver.mode, ResolutionMode::Transitive);
        assert_eq!(config.compiler_options().max_concurrency, 2);
        assert!(config.parse_options().directive_namespace.is_none());
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("saved.toml");
        let mut config = RegistryConfig::default();
        config.compiler.generator_timeout_secs = 5;
        config.save(&path).unwrap();

        let loaded = RegistryConfig::load_from(Some(&path)).unwrap();
        assert_eq!(loaded.compiler.generator_timeout_secs, 5);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = RegistryConfig::load_from(Some(Path::new("/definitely/not/here.toml")));
        assert!(matches!(err, Err(RegistryError::Config(_))));
    }
}
