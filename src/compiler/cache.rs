//! Job table and result cache
//!
//! The compiler owns one [`JobStore`]; nothing here is process-global, so each
//! compiler instance (and each test) gets its own state. [`MemoryJobStore`]
//! shards by key, so compiles of different fingerprints never wait on each
//! other.

use async_trait::async_trait;
use dashmap::DashMap;

use crate::checksum::Fingerprint;
use crate::error::Result;

use super::job::CompilationJob;
use super::CompilationResult;

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn cached(&self, fingerprint: &Fingerprint) -> Result<Option<CompilationResult>>;

    async fn store_result(&self, fingerprint: Fingerprint, result: CompilationResult) -> Result<()>;

    async fn get_job(&self, id: &str) -> Result<Option<CompilationJob>>;

    /// Insert or overwrite a job's current state
    async fn put_job(&self, job: CompilationJob) -> Result<()>;

    /// All jobs, oldest first
    async fn list_jobs(&self) -> Result<Vec<CompilationJob>>;
}

#[derive(Default)]
pub struct MemoryJobStore {
    results: DashMap<Fingerprint, CompilationResult>,
    jobs: DashMap<String, CompilationJob>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cached_count(&self) -> usize {
        self.results.len()
    }

    pub fn clear_cache(&self) {
        self.results.clear();
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn cached(&self, fingerprint: &Fingerprint) -> Result<Option<CompilationResult>> {
        Ok(self.results.get(fingerprint).map(|r| r.value().clone()))
    }

    async fn store_result(&self, fingerprint: Fingerprint, result: CompilationResult) -> Result<()> {
        self.results.insert(fingerprint, result);
        Ok(())
    }

    async fn get_job(&self, id: &str) -> Result<Option<CompilationJob>> {
        Ok(self.jobs.get(id).map(|j| j.value().clone()))
    }

    async fn put_job(&self, job: CompilationJob) -> Result<()> {
        self.jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn list_jobs(&self) -> Result<Vec<CompilationJob>> {
        let mut jobs: Vec<CompilationJob> = self.jobs.iter().map(|j| j.value().clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_your_writes() {
        let store = MemoryJobStore::new();
        let fingerprint = Fingerprint::builder().text("input").finish();

        assert!(store.cached(&fingerprint).await.unwrap().is_none());
        let result = CompilationResult::failed("go", "boom");
        store.store_result(fingerprint.clone(), result.clone()).await.unwrap();
        assert_eq!(store.cached(&fingerprint).await.unwrap(), Some(result));
        assert_eq!(store.cached_count(), 1);

        store.clear_cache();
        assert!(store.cached(&fingerprint).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_job_overwrite() {
        let store = MemoryJobStore::new();
        let mut job = CompilationJob::new("go", Fingerprint::builder().finish());
        store.put_job(job.clone()).await.unwrap();

        job.start().unwrap();
        store.put_job(job.clone()).await.unwrap();

        let stored = store.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, crate::compiler::job::JobStatus::Running);
        assert_eq!(store.list_jobs().await.unwrap().len(), 1);
        assert!(store.get_job("missing").await.unwrap().is_none());
    }
}
