//! Compilation Orchestrator
//!
//! Turns a [`CompileRequest`] into one job per target language:
//! 1. look up the language's backend in the [`GeneratorRegistry`]
//! 2. fingerprint the inputs and admit a `pending` job
//! 3. wait for a worker permit, move to `running`
//! 4. serve from cache, or run the backend on a blocking worker under a timeout
//! 5. record the terminal state and (on success) cache the result
//!
//! Backend failures, panics, timeouts and cancellation all end as a `failed`
//! job with a descriptive error. Only malformed requests fail a whole batch.

pub mod cache;
pub mod job;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::checksum::Fingerprint;
use crate::codegen::{GeneratedFile, Generator, GeneratorInput, GeneratorRegistry};
use crate::error::{RegistryError, Result};
use crate::resolver::ResolvedDependencySet;
use crate::version::SchemaFile;

pub use cache::{JobStore, MemoryJobStore};
pub use job::{CompilationJob, JobStatus};

// =============================================================================
// Request / Result
// =============================================================================

/// Inputs shared by every language in one compile call
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub schema_files: Vec<SchemaFile>,
    pub dependency_files: Vec<SchemaFile>,
    pub options: BTreeMap<String, String>,
    pub include_grpc: bool,
    /// Cancelling aborts every job of this request that has not finished
    pub cancel: CancellationToken,
}

impl CompileRequest {
    pub fn new(schema_files: Vec<SchemaFile>) -> Self {
        Self {
            schema_files,
            dependency_files: Vec::new(),
            options: BTreeMap::new(),
            include_grpc: false,
            cancel: CancellationToken::new(),
        }
    }

    /// Own files and dependency files from a resolution
    pub fn from_resolved(resolved: &ResolvedDependencySet) -> Self {
        let mut request = Self::new(resolved.own_files().to_vec());
        request.dependency_files = resolved.dependency_files().to_vec();
        request
    }

    pub fn with_dependencies(mut self, files: Vec<SchemaFile>) -> Self {
        self.dependency_files = files;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_grpc(mut self, include_grpc: bool) -> Self {
        self.include_grpc = include_grpc;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    fn input(&self) -> GeneratorInput {
        GeneratorInput {
            schema_files: self.schema_files.clone(),
            dependency_files: self.dependency_files.clone(),
            options: self.options.clone(),
            include_grpc: self.include_grpc,
        }
    }
}

/// Outcome of compiling for one language
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationResult {
    /// Job that produced this result; `None` when no job was admitted
    pub job_id: Option<String>,
    pub language: String,
    pub success: bool,
    pub generated_files: Vec<GeneratedFile>,
    pub package_files: Vec<GeneratedFile>,
    /// Backend run time. A cache hit reports the run that produced the entry.
    pub duration: Duration,
    pub cache_hit: bool,
    pub error: Option<String>,
    pub artifact_location: Option<String>,
}

impl CompilationResult {
    pub fn succeeded(
        language: impl Into<String>,
        generated_files: Vec<GeneratedFile>,
        package_files: Vec<GeneratedFile>,
    ) -> Self {
        Self {
            job_id: None,
            language: language.into(),
            success: true,
            generated_files,
            package_files,
            duration: Duration::ZERO,
            cache_hit: false,
            error: None,
            artifact_location: None,
        }
    }

    pub fn failed(language: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            job_id: None,
            language: language.into(),
            success: false,
            generated_files: Vec::new(),
            package_files: Vec::new(),
            duration: Duration::ZERO,
            cache_hit: false,
            error: Some(error.into()),
            artifact_location: None,
        }
    }
}

/// Cache key for one language's compile of `input`
pub fn fingerprint(input: &GeneratorInput, language: &str) -> Fingerprint {
    Fingerprint::builder()
        .section("schema")
        .files(&input.schema_files)
        .section("dependencies")
        .files(&input.dependency_files)
        .section("language")
        .text(language)
        .section("options")
        .options(&input.options)
        .flag(input.include_grpc)
        .finish()
}

// =============================================================================
// Compiler
// =============================================================================

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    /// Backends allowed to run at once across all requests
    pub max_concurrency: usize,
    pub generator_timeout: Duration,
    pub cache_enabled: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            generator_timeout: Duration::from_secs(60),
            cache_enabled: true,
        }
    }
}

/// Reported when a backend fails without saying why
const EMPTY_GENERATOR_ERROR: &str = "generator returned an empty error";

/// Why a job failed; decides what `compile_single` reports
#[derive(Debug, Clone, PartialEq, Eq)]
enum Failure {
    Unavailable,
    Generator(String),
    TimedOut(Duration),
    Panicked(String),
    Cancelled,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Unavailable => f.write_str("no generator registered"),
            Failure::Generator(message) => f.write_str(message),
            Failure::TimedOut(after) => write!(f, "generator timed out after {:?}", after),
            Failure::Panicked(message) => write!(f, "generator panicked: {}", message),
            Failure::Cancelled => write!(f, "{}", RegistryError::Cancelled),
        }
    }
}

#[derive(Clone)]
pub struct Compiler {
    generators: Arc<GeneratorRegistry>,
    jobs: Arc<dyn JobStore>,
    options: CompilerOptions,
    permits: Arc<Semaphore>,
}

impl Compiler {
    /// Compiler with an in-memory job store and default options
    pub fn new(generators: GeneratorRegistry) -> Self {
        Self::with_store(
            generators,
            Arc::new(MemoryJobStore::new()),
            CompilerOptions::default(),
        )
    }

    pub fn with_store(
        generators: GeneratorRegistry,
        jobs: Arc<dyn JobStore>,
        options: CompilerOptions,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        Self {
            generators: Arc::new(generators),
            jobs,
            options,
            permits,
        }
    }

    pub fn generators(&self) -> &GeneratorRegistry {
        &self.generators
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Compile for one language. A backend failure is returned as
    /// `GeneratorFailed`; the failed job is still recorded.
    pub async fn compile_single(
        &self,
        request: &CompileRequest,
        language: &str,
    ) -> Result<CompilationResult> {
        let input = Arc::new(request.input());
        let (result, failure) = self.run_job(input, language, &request.cancel).await?;
        match failure {
            None => Ok(result),
            Some(Failure::Unavailable) => {
                Err(RegistryError::GeneratorUnavailable(language.to_string()))
            }
            Some(Failure::Cancelled) => Err(RegistryError::Cancelled),
            Some(other) => Err(RegistryError::GeneratorFailed {
                language: language.to_string(),
                message: other.to_string(),
            }),
        }
    }

    /// Compile for every language concurrently. Results come back in
    /// `languages` order; each carries its own success or error.
    pub async fn compile_all<S: AsRef<str>>(
        &self,
        request: &CompileRequest,
        languages: &[S],
    ) -> Result<Vec<CompilationResult>> {
        if languages.is_empty() {
            return Err(RegistryError::EmptyLanguages);
        }

        let input = Arc::new(request.input());
        let mut tasks = JoinSet::new();
        for (index, language) in languages.iter().enumerate() {
            let compiler = self.clone();
            let input = Arc::clone(&input);
            let language: &str = language.as_ref();
            let language = language.to_string();
            let cancel = request.cancel.clone();
            tasks.spawn(async move {
                let outcome = compiler.run_job(input, &language, &cancel).await;
                (index, language, outcome)
            });
        }

        let mut slots: Vec<Option<CompilationResult>> = vec![None; languages.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, _, Ok((result, _)))) => slots[index] = Some(result),
                Ok((index, language, Err(err))) => {
                    tracing::warn!(language = %language, error = %err, "compile job errored");
                    slots[index] = Some(CompilationResult::failed(language, err.to_string()));
                }
                Err(join_error) => {
                    tracing::warn!(error = %join_error, "compile task aborted");
                }
            }
        }

        Ok(slots
            .into_iter()
            .zip(languages)
            .map(|(slot, language)| {
                let language: &str = language.as_ref();
                slot.unwrap_or_else(|| CompilationResult::failed(language, "compile task aborted"))
            })
            .collect())
    }

    pub async fn get_status(&self, job_id: &str) -> Result<CompilationJob> {
        self.jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))
    }

    /// Every job this compiler has admitted, oldest first
    pub async fn jobs(&self) -> Result<Vec<CompilationJob>> {
        self.jobs.list_jobs().await
    }

    // =========================================================================
    // Job execution
    // =========================================================================

    async fn run_job(
        &self,
        input: Arc<GeneratorInput>,
        language: &str,
        cancel: &CancellationToken,
    ) -> Result<(CompilationResult, Option<Failure>)> {
        let Some(generator) = self.generators.get(language) else {
            tracing::warn!(language, "no generator registered");
            let error = RegistryError::GeneratorUnavailable(language.to_string());
            return Ok((
                CompilationResult::failed(language, error.to_string()),
                Some(Failure::Unavailable),
            ));
        };

        let fingerprint = fingerprint(&input, language);
        let mut job = CompilationJob::new(language, fingerprint.clone());
        self.jobs.put_job(job.clone()).await?;
        tracing::debug!(job = %job.id, language, fingerprint = fingerprint.short(), "job admitted");

        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = Arc::clone(&self.permits).acquire_owned() => Some(permit.map_err(|_| {
                RegistryError::ServiceUnavailable("compiler worker pool closed".to_string())
            })?),
        };

        job.start()?;
        self.jobs.put_job(job.clone()).await?;

        let (mut result, failure) = match permit {
            None => (
                CompilationResult::failed(language, Failure::Cancelled.to_string()),
                Some(Failure::Cancelled),
            ),
            Some(permit) => match self.cached(&fingerprint).await? {
                Some(cached) => (cached, None),
                None => {
                    self.execute(generator, input, language, &fingerprint, cancel, permit)
                        .await?
                }
            },
        };
        result.job_id = Some(job.id.clone());

        job.finish(result.clone())?;
        self.jobs.put_job(job.clone()).await?;

        match &failure {
            None => tracing::info!(
                job = %job.id,
                language,
                cache_hit = result.cache_hit,
                files = result.generated_files.len(),
                "job completed"
            ),
            Some(reason) => tracing::warn!(job = %job.id, language, error = %reason, "job failed"),
        }

        Ok((result, failure))
    }

    async fn cached(&self, fingerprint: &Fingerprint) -> Result<Option<CompilationResult>> {
        if !self.options.cache_enabled {
            return Ok(None);
        }
        Ok(self.jobs.cached(fingerprint).await?.map(|mut hit| {
            tracing::debug!(fingerprint = fingerprint.short(), "cache hit");
            hit.cache_hit = true;
            hit
        }))
    }

    /// Run the backend on a blocking worker, racing timeout and cancellation
    async fn execute(
        &self,
        generator: Arc<dyn Generator>,
        input: Arc<GeneratorInput>,
        language: &str,
        fingerprint: &Fingerprint,
        cancel: &CancellationToken,
        permit: OwnedSemaphorePermit,
    ) -> Result<(CompilationResult, Option<Failure>)> {
        let started = Instant::now();
        let timeout = self.options.generator_timeout;
        // A blocking worker cannot be interrupted; on timeout or cancel it
        // finishes in the background, still holding its permit, and its
        // output is discarded.
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            generator.generate(&input)
        });

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(Failure::Cancelled),
            joined = tokio::time::timeout(timeout, task) => match joined {
                Err(_) => Err(Failure::TimedOut(timeout)),
                Ok(Err(join_error)) => Err(Failure::Panicked(panic_message(join_error))),
                Ok(Ok(Err(generate_error))) if generate_error.message.trim().is_empty() => {
                    Err(Failure::Generator(EMPTY_GENERATOR_ERROR.to_string()))
                }
                Ok(Ok(Err(generate_error))) => Err(Failure::Generator(generate_error.message)),
                Ok(Ok(Ok(output))) => Ok(output),
            },
        };

        match outcome {
            Ok(output) => {
                let mut result =
                    CompilationResult::succeeded(language, output.files, output.package_files);
                result.duration = started.elapsed();
                result.artifact_location = Some(format!("{}/{}", language, fingerprint.short()));
                if self.options.cache_enabled {
                    self.jobs
                        .store_result(fingerprint.clone(), result.clone())
                        .await?;
                }
                Ok((result, None))
            }
            Err(failure) => {
                let mut result = CompilationResult::failed(language, failure.to_string());
                result.duration = started.elapsed();
                Ok((result, Some(failure)))
            }
        }
    }
}

impl fmt::Debug for Compiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Compiler")
            .field("generators", &self.generators)
            .field("options", &self.options)
            .finish()
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return "generator task was cancelled".to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
