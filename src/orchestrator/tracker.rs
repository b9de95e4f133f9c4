//! Per-job results, the run log, and ETA projection.

use crate::progress::StatusCounts;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Succeeded => "SUCCEEDED",
            RunStatus::Failed => "FAILED",
            RunStatus::TimedOut => "TIMED_OUT",
            RunStatus::Skipped => "SKIPPED",
        }
    }
}

/// Outcome of one combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub index: usize,
    pub combination: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_name: Option<String>,
    pub status: RunStatus,
    #[serde(with = "duration_ms")]
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last output file the server recorded for the job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// Rolling average of recent job durations.
#[derive(Debug, Clone)]
pub struct EtaTracker {
    window: usize,
    samples: VecDeque<Duration>,
}

impl EtaTracker {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            samples: VecDeque::new(),
        }
    }

    pub fn record(&mut self, elapsed: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(elapsed);
    }

    pub fn average(&self) -> Option<Duration> {
        if self.samples.is_empty() {
            return None;
        }
        let sum: Duration = self.samples.iter().sum();
        Some(sum / self.samples.len() as u32)
    }

    /// Average duration × jobs not yet attempted.
    pub fn eta(&self, remaining: usize) -> Option<Duration> {
        if remaining == 0 {
            return None;
        }
        let remaining = u32::try_from(remaining).unwrap_or(u32::MAX);
        self.average()
            .map(|avg| avg.checked_mul(remaining).unwrap_or(Duration::MAX))
    }
}

/// Everything a finished (or stopped) run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub results: Vec<RunResult>,
    /// Size of the full combination product.
    pub total: usize,
    /// Combinations the run intended to attempt after the limit.
    pub planned: usize,
    pub cancelled: bool,
    /// Some submission could not reach the server at all.
    pub unreachable: bool,
    /// Reason the run stopped early, when a fatal error or stop policy ended it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
    /// RFC 3339 wall-clock bounds of the run.
    pub started_at: String,
    pub finished_at: String,
}

impl RunReport {
    pub fn counts(&self) -> StatusCounts {
        count(&self.results)
    }

    /// Planned combinations that were never attempted.
    pub fn not_attempted(&self) -> usize {
        self.planned.saturating_sub(self.results.len())
    }

    /// Process exit code for the run.
    ///
    /// Strict mode fails on any FAILED or TIMED_OUT job; otherwise only an
    /// unreachable server or an aborted run fails.
    pub fn exit_code(&self, strict: bool) -> i32 {
        if self.cancelled {
            return 130;
        }
        let counts = self.counts();
        if self.unreachable || self.aborted.is_some() {
            return 1;
        }
        if strict && (counts.failed > 0 || counts.timed_out > 0) {
            return 1;
        }
        0
    }
}

pub(crate) fn count(results: &[RunResult]) -> StatusCounts {
    let mut counts = StatusCounts::default();
    for r in results {
        match r.status {
            RunStatus::Succeeded => counts.succeeded += 1,
            RunStatus::Failed => counts.failed += 1,
            RunStatus::TimedOut => counts.timed_out += 1,
            RunStatus::Skipped => counts.skipped += 1,
        }
    }
    counts
}

/// `1h 2m 3.4s` style rendering for logs and summaries.
pub fn format_duration(d: Duration) -> String {
    let total = d.as_secs_f64();
    let hours = (total / 3600.0).floor() as u64;
    let minutes = ((total % 3600.0) / 60.0).floor() as u64;
    let seconds = total % 60.0;
    format!("{}h {}m {:.1}s", hours, minutes, seconds)
}
