//! Error types for the IDL registry

use thiserror::Error;

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Registry errors
///
/// Grouped the way callers need to react to them:
/// - syntax errors: malformed schema text, always recoverable
/// - not-found errors: module, version, file, job or generator does not exist
/// - dependency errors: a `module@version` reference could not be resolved
/// - service errors: a collaborator was never wired up by the host
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Syntax error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("Invalid UTF-8 in schema input at byte {byte_offset}")]
    InvalidUtf8 { byte_offset: usize },

    #[error("Cannot open schema file {path}: {source}")]
    FileOpen {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("No package statement found")]
    NoPackage,

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Version not found: {module}@{version}")]
    VersionNotFound { module: String, version: String },

    #[error("File not found: {path} in {module}@{version}")]
    FileNotFound {
        module: String,
        version: String,
        path: String,
    },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Version already exists: {module}@{version}")]
    AlreadyExists { module: String, version: String },

    #[error("Invalid dependency reference '{0}': expected module@version")]
    InvalidDependency(String),

    #[error("Dependency not found: {reference}")]
    DependencyNotFound {
        reference: String,
        #[source]
        source: Box<RegistryError>,
    },

    #[error("Dependency chain from {root} exceeds depth {max_depth}")]
    DependencyTooDeep { root: String, max_depth: usize },

    #[error("Generator unavailable for language '{0}'")]
    GeneratorUnavailable(String),

    #[error("Generator execution failed for '{language}': {message}")]
    GeneratorFailed { language: String, message: String },

    #[error("Job {job} cannot move from {from} to {to}")]
    InvalidTransition { job: String, from: String, to: String },

    #[error("Compile request names no target languages")]
    EmptyLanguages,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Compilation cancelled")]
    Cancelled,

    #[error("Invalid version string: {0}")]
    InvalidVersion(String),

    #[error("Invalid module name: {0:?}")]
    InvalidModuleName(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl RegistryError {
    /// True for conditions that mean "this will never exist" rather than a failure
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::ModuleNotFound(_)
                | RegistryError::VersionNotFound { .. }
                | RegistryError::FileNotFound { .. }
                | RegistryError::JobNotFound(_)
                | RegistryError::GeneratorUnavailable(_)
                | RegistryError::DependencyNotFound { .. }
        )
    }

    /// True for malformed schema text
    pub fn is_syntax(&self) -> bool {
        matches!(
            self,
            RegistryError::Syntax { .. } | RegistryError::InvalidUtf8 { .. }
        )
    }

    pub(crate) fn syntax(message: impl Into<String>, line: u32, column: u32) -> Self {
        RegistryError::Syntax {
            message: message.into(),
            line,
            column,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(RegistryError::JobNotFound("x".into()).is_not_found());
        assert!(RegistryError::VersionNotFound {
            module: "common".into(),
            version: "v1".into()
        }
        .is_not_found());
        assert!(!RegistryError::EmptyLanguages.is_not_found());
        assert!(!RegistryError::ServiceUnavailable("compiler".into()).is_not_found());
    }

    #[test]
    fn test_dependency_error_names_reference() {
        let err = RegistryError::DependencyNotFound {
            reference: "common@v1.0.0".into(),
            source: Box::new(RegistryError::ModuleNotFound("common".into())),
        };
        assert!(err.to_string().contains("common@v1.0.0"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_syntax_message_has_position() {
        let err = RegistryError::syntax("unexpected '}'", 3, 7);
        assert!(err.is_syntax());
        assert_eq!(err.to_string(), "Syntax error at 3:7: unexpected '}'");
    }
}
