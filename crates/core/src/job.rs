//! Generation job lifecycle.
//!
//! ```text
//! queued --start--> running --complete--> completed
//!    |                 |
//!    +------fail-------+-------fail-----> failed
//! ```
//!
//! `completed` and `failed` are terminal. Every transition method checks the
//! current status and returns [`CoreError::Conflict`] when the move is not
//! allowed, so a job can never be observed in two states or revived.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};
use crate::workflow::Workflow;

/// Status of a generation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Queued or running.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact produced by a completed job.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub filename: String,
    /// Where the backend wrote the file, when its output directory is known.
    pub source_path: Option<PathBuf>,
    /// Encoded image bytes as downloaded from the backend.
    #[serde(skip)]
    pub image: Vec<u8>,
}

/// A unit of submitted generation work.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    id: JobId,
    workflow: Workflow,
    status: JobStatus,
    progress: f32,
    remote_id: Option<String>,
    created_at: Timestamp,
    started_at: Option<Timestamp>,
    result: Option<JobResult>,
    error: Option<String>,
    turbo_mode: bool,
}

impl Job {
    /// Create a queued job owning its own copy of `workflow`.
    pub fn new(id: JobId, workflow: Workflow, turbo_mode: bool, now: Timestamp) -> Self {
        Self {
            id,
            workflow,
            status: JobStatus::Queued,
            progress: 0.0,
            remote_id: None,
            created_at: now,
            started_at: None,
            result: None,
            error: None,
            turbo_mode,
        }
    }

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn started_at(&self) -> Option<Timestamp> {
        self.started_at
    }

    pub fn result(&self) -> Option<&JobResult> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn turbo_mode(&self) -> bool {
        self.turbo_mode
    }

    /// Seconds since the job started running, if it has.
    pub fn elapsed_secs(&self, now: Timestamp) -> Option<i64> {
        self.started_at.map(|s| (now - s).num_seconds())
    }

    // ---- transitions ----

    /// `queued -> running` once the backend accepted the submission.
    pub fn start(&mut self, remote_id: String, now: Timestamp) -> Result<(), CoreError> {
        self.expect_status(&[JobStatus::Queued], JobStatus::Running)?;
        self.remote_id = Some(remote_id);
        self.started_at = Some(now);
        self.progress = 0.0;
        self.status = JobStatus::Running;
        Ok(())
    }

    /// Record progress for a running job. Ignored in any other state.
    pub fn set_progress(&mut self, progress: f32) {
        if self.status == JobStatus::Running {
            self.progress = if progress.is_finite() {
                progress.clamp(0.0, 1.0)
            } else {
                0.0
            };
        }
    }

    /// `running -> completed` with the fetched artifact.
    pub fn complete(&mut self, result: JobResult) -> Result<(), CoreError> {
        self.expect_status(&[JobStatus::Running], JobStatus::Completed)?;
        self.result = Some(result);
        self.progress = 1.0;
        self.status = JobStatus::Completed;
        Ok(())
    }

    /// `queued | running -> failed`.
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), CoreError> {
        self.expect_status(&[JobStatus::Queued, JobStatus::Running], JobStatus::Failed)?;
        self.error = Some(message.into());
        self.status = JobStatus::Failed;
        Ok(())
    }

    /// A completed job whose start is more than `ttl` before `now`.
    ///
    /// Queued, running and failed jobs never expire.
    pub fn is_expired(&self, now: Timestamp, ttl: chrono::Duration) -> bool {
        self.status == JobStatus::Completed
            && self.started_at.is_some_and(|started| now - started > ttl)
    }

    fn expect_status(&self, allowed: &[JobStatus], target: JobStatus) -> Result<(), CoreError> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Job {} cannot move from {} to {target}",
                self.id, self.status
            )))
        }
    }
}
