//! Compilation jobs and their state machine
//!
//! ```text
//! pending -> running -> completed
//!                   \-> failed
//! ```
//!
//! No other edge exists. Terminal states never move again.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::checksum::Fingerprint;
use crate::error::{RegistryError, Result};

use super::CompilationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }

    /// Status implied by a raw result: an error means failed, success means
    /// completed, neither means the work is still in progress.
    pub fn from_result(result: &CompilationResult) -> JobStatus {
        match &result.error {
            Some(error) if !error.is_empty() => JobStatus::Failed,
            _ if result.success => JobStatus::Completed,
            _ => JobStatus::Running,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One language's unit of compilation work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompilationJob {
    pub id: String,
    pub language: String,
    pub fingerprint: Fingerprint,
    pub status: JobStatus,
    /// Every status this job has held, in order
    pub history: Vec<JobStatus>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub cache_hit: bool,
    pub result: Option<CompilationResult>,
}

impl CompilationJob {
    pub fn new(language: impl Into<String>, fingerprint: Fingerprint) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            language: language.into(),
            fingerprint,
            status: JobStatus::Pending,
            history: vec![JobStatus::Pending],
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            cache_hit: false,
            result: None,
        }
    }

    pub fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                job: self.id.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.history.push(next);
        match next {
            JobStatus::Running => self.started_at = Some(Utc::now()),
            JobStatus::Completed | JobStatus::Failed => self.completed_at = Some(Utc::now()),
            JobStatus::Pending => {}
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)
    }

    /// Record the result and move to whichever terminal state it implies
    pub fn finish(&mut self, result: CompilationResult) -> Result<()> {
        let next = match JobStatus::from_result(&result) {
            JobStatus::Completed => JobStatus::Completed,
            _ => JobStatus::Failed,
        };
        self.cache_hit = result.cache_hit;
        self.transition(next)?;
        self.result = Some(result);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> CompilationJob {
        CompilationJob::new("go", Fingerprint::builder().text("x").finish())
    }

    #[test]
    fn test_legal_path() {
        let mut job = job();
        job.start().unwrap();
        job.finish(CompilationResult::succeeded("go", Default::default(), Default::default()))
            .unwrap();
        assert_eq!(
            job.history,
            vec![JobStatus::Pending, JobStatus::Running, JobStatus::Completed]
        );
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.start().unwrap();
        job.finish(CompilationResult::failed("go", "boom")).unwrap();
        assert_eq!(job.status, JobStatus::Failed);

        for next in [JobStatus::Pending, JobStatus::Running, JobStatus::Completed] {
            assert!(matches!(
                job.transition(next),
                Err(RegistryError::InvalidTransition { .. })
            ));
        }
    }

    #[test]
    fn test_pending_cannot_skip_running() {
        let mut job = job();
        assert!(job.transition(JobStatus::Completed).is_err());
        assert!(job.transition(JobStatus::Failed).is_err());
        assert_eq!(job.history, vec![JobStatus::Pending]);
    }

    #[test]
    fn test_status_from_result() {
        let mut result = CompilationResult::failed("go", "boom");
        assert_eq!(JobStatus::from_result(&result), JobStatus::Failed);

        result.error = None;
        result.success = true;
        assert_eq!(JobStatus::from_result(&result), JobStatus::Completed);

        result.success = false;
        assert_eq!(JobStatus::from_result(&result), JobStatus::Running);

        // An error wins over a success flag
        result.success = true;
        result.error = Some("late failure".into());
        assert_eq!(JobStatus::from_result(&result), JobStatus::Failed);
    }
}
