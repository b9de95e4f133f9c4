//! Event schema for run progress.

use serde::{Deserialize, Serialize};

/// Job counts by final status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

impl StatusCounts {
    pub fn attempted(&self) -> usize {
        self.succeeded + self.failed + self.timed_out + self.skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobFinishedData {
    pub index: usize,
    pub status: String,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        total: usize,
        planned: usize,
    },
    JobSubmitted {
        index: usize,
        planned: usize,
        job_id: String,
        combination: String,
    },
    JobProgress {
        index: usize,
        value: u64,
        max: u64,
    },
    JobFinished(JobFinishedData),
    Summary {
        counts: StatusCounts,
        remaining: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_ms: Option<u128>,
    },
    RunFinished {
        cancelled: bool,
    },
}

impl RunEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            RunEvent::RunStarted { .. } => "run_started",
            RunEvent::JobSubmitted { .. } => "job_submitted",
            RunEvent::JobProgress { .. } => "job_progress",
            RunEvent::JobFinished(_) => "job_finished",
            RunEvent::Summary { .. } => "summary",
            RunEvent::RunFinished { .. } => "run_finished",
        }
    }
}
