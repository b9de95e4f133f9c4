//! Submission Orchestrator
//!
//! Runs a sweep one combination at a time, in enumeration order: plan the job,
//! submit it, optionally watch it to a terminal state, then record the outcome
//! and the running ETA. Only one job is ever in flight. Cancellation is checked
//! between jobs and while waiting on the network; the in-flight job is recorded
//! as skipped and a report is still produced.

use crate::config::WedgeSettings;
use crate::error::{TransportError, WedgeError};
use crate::naming;
use crate::progress::{JobFinishedData, ProgressBus, RunEvent};
use crate::transport::{JobEvent, JobRequest, Submission, Transport};
use futures::StreamExt;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod job;
pub mod tracker;

pub use crate::config::ResolutionPolicy;
pub use job::{Job, Sweep};
pub use tracker::{format_duration, EtaTracker, RunReport, RunResult, RunStatus};

/// Per-run policy, resolved from settings and CLI flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub limit: Option<usize>,
    pub stream: bool,
    pub strict: bool,
    pub stop_on_first_failure: bool,
    pub resolution_policy: ResolutionPolicy,
    pub job_timeout: Duration,
    pub retries: u32,
    pub retry_backoff: Duration,
    /// Title preferred when picking the output node.
    pub output_title: Option<String>,
    pub save_class: String,
    pub max_axis_values: usize,
    pub eta_window: usize,
}

impl RunOptions {
    pub fn from_settings(settings: &WedgeSettings) -> Self {
        let title = settings.run.output_title.trim();
        Self {
            limit: None,
            stream: settings.run.stream,
            strict: settings.run.strict,
            stop_on_first_failure: settings.run.stop_on_first_failure,
            resolution_policy: settings.run.resolution_policy,
            job_timeout: Duration::from_secs(settings.transport.job_timeout_secs),
            retries: settings.transport.retries,
            retry_backoff: Duration::from_millis(settings.transport.retry_backoff_ms),
            output_title: (!title.is_empty()).then(|| title.to_string()),
            save_class: settings.run.save_class.clone(),
            max_axis_values: settings.limits.max_axis_values,
            eta_window: settings.run.eta_window,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_settings(&WedgeSettings::default())
    }
}

pub struct Orchestrator<T> {
    transport: T,
    sweep: Sweep,
    options: RunOptions,
    progress: Option<ProgressBus>,
    results: Vec<RunResult>,
    eta: EtaTracker,
}

impl<T: Transport> Orchestrator<T> {
    pub fn new(transport: T, sweep: Sweep, options: RunOptions) -> Self {
        let eta = EtaTracker::new(options.eta_window);
        Self {
            transport,
            sweep,
            options,
            progress: None,
            results: Vec::new(),
            eta,
        }
    }

    pub fn with_progress(mut self, bus: ProgressBus) -> Self {
        self.progress = Some(bus);
        self
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Results recorded so far by the current (or last) run.
    pub fn results(&self) -> &[RunResult] {
        &self.results
    }

    /// Submit every planned combination.
    ///
    /// Returns `Err` only when the run cannot start: the first combination
    /// does not resolve, or patching hits a configuration error before
    /// anything was submitted. Later failures are recorded in the report.
    pub async fn run(&mut self, cancel: CancellationToken) -> Result<RunReport, WedgeError> {
        self.results.clear();
        self.eta = EtaTracker::new(self.options.eta_window);
        let started_at = chrono::Utc::now().to_rfc3339();

        let total = self.sweep.plan().total();
        let planned = self.sweep.plan().planned();
        info!(
            total,
            planned,
            endpoint = self.transport.endpoint(),
            stream = self.options.stream,
            "Starting sweep"
        );
        if planned < total {
            info!("Limit applied: running {} of {} combinations", planned, total);
        }
        self.emit(RunEvent::RunStarted { total, planned });

        let mut cancelled = false;
        let mut unreachable = false;
        let mut aborted = None;

        for combo in self.sweep.plan().iter() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            let index = combo.index;

            let job = match self.sweep.plan_job(&combo, &self.options) {
                Ok(job) => job,
                Err(err) => {
                    // Node and parameter lookup ignores the values, so a resolution
                    // error shows up on combination 1 and is fatal there. `Skip`
                    // only changes the outcome for failures on later combinations.
                    let fatal = index == 1
                        || !err.is_resolution()
                        || self.options.resolution_policy == ResolutionPolicy::Abort;
                    if fatal && self.results.is_empty() {
                        error!(index, error = %err, "Combination does not resolve; nothing submitted");
                        return Err(err);
                    }
                    let result = RunResult {
                        index,
                        combination: combo.describe(),
                        output_name: Some(naming::output_name(
                            &combo,
                            &self.sweep.config().filename_prefix,
                        )),
                        status: RunStatus::Skipped,
                        elapsed: Duration::ZERO,
                        job_id: None,
                        error: Some(err.to_string()),
                        output: None,
                    };
                    self.emit(finished_event(&result));
                    self.results.push(result);
                    if fatal {
                        error!(index, error = %err, "Aborting run");
                        aborted = Some(err.to_string());
                        break;
                    }
                    warn!(index, error = %err, "Skipping combination that does not resolve");
                    self.emit_summary(planned);
                    continue;
                }
            };

            info!(
                "[{}/{}] {} -> {}",
                index,
                planned,
                job.combination.describe(),
                job.output_name
            );

            let execution = execute(
                &self.transport,
                &job,
                &self.options,
                self.progress.as_ref(),
                &cancel,
                planned,
            )
            .await;
            let result = execution.result;

            if result.job_id.is_some() && result.status != RunStatus::Skipped {
                self.eta.record(result.elapsed);
            }
            log_result(&result);
            self.emit(finished_event(&result));
            let failed = result.status == RunStatus::Failed;
            self.results.push(result);
            unreachable |= execution.unreachable;
            self.emit_summary(planned);

            if execution.cancelled {
                cancelled = true;
                break;
            }
            if failed && self.options.stop_on_first_failure {
                warn!(index, "Stopping after first failure");
                aborted = Some(format!("combination {} failed", index));
                break;
            }
        }

        let report = RunReport {
            results: self.results.clone(),
            total,
            planned,
            cancelled,
            unreachable,
            aborted,
            started_at,
            finished_at: chrono::Utc::now().to_rfc3339(),
        };
        let counts = report.counts();
        if cancelled {
            warn!(not_attempted = report.not_attempted(), "Run cancelled");
        }
        info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            timed_out = counts.timed_out,
            skipped = counts.skipped,
            not_attempted = report.not_attempted(),
            "Sweep finished"
        );
        self.emit(RunEvent::RunFinished { cancelled });
        Ok(report)
    }

    fn emit(&self, event: RunEvent) {
        if let Some(bus) = &self.progress {
            bus.emit_best_effort(event);
        }
    }

    fn emit_summary(&self, planned: usize) {
        let counts = tracker::count(&self.results);
        let remaining = planned.saturating_sub(self.results.len());
        let eta = self.eta.eta(remaining);
        info!(
            "Progress: {}/{} done ({} ok, {} failed, {} timed out, {} skipped), ETA {}",
            self.results.len(),
            planned,
            counts.succeeded,
            counts.failed,
            counts.timed_out,
            counts.skipped,
            eta.map(format_duration).unwrap_or_else(|| "-".to_string())
        );
        self.emit(RunEvent::Summary {
            counts,
            remaining,
            eta_ms: eta.map(|d| d.as_millis()),
        });
    }
}

struct Execution {
    result: RunResult,
    cancelled: bool,
    unreachable: bool,
}

enum Wait {
    Completed(Vec<String>),
    Failed(String),
    Lost(TransportError),
    TimedOut,
    Cancelled,
}

async fn execute<T: Transport>(
    transport: &T,
    job: &Job,
    options: &RunOptions,
    progress: Option<&ProgressBus>,
    cancel: &CancellationToken,
    planned: usize,
) -> Execution {
    let started = Instant::now();
    let mut result = RunResult {
        index: job.index,
        combination: job.combination.describe(),
        output_name: Some(job.output_name.clone()),
        status: RunStatus::Failed,
        elapsed: Duration::ZERO,
        job_id: None,
        error: None,
        output: None,
    };
    let mut cancelled = false;
    let mut unreachable = false;

    let request = match job.request() {
        Ok(request) => request,
        Err(err) => {
            result.error = Some(err.to_string());
            result.elapsed = started.elapsed();
            return Execution {
                result,
                cancelled,
                unreachable,
            };
        }
    };

    match submit_with_retries(transport, &request, options, cancel, job.index).await {
        Err(err) => {
            unreachable = err.is_unreachable();
            result.error = Some(err.to_string());
        }
        Ok(None) => {
            cancelled = true;
            result.status = RunStatus::Skipped;
            result.error = Some("cancelled".to_string());
        }
        Ok(Some(submission)) => {
            debug!(index = job.index, job_id = %submission.job_id, queue = ?submission.queue_number, "Job accepted");
            if let Some(bus) = progress {
                bus.emit_best_effort(RunEvent::JobSubmitted {
                    index: job.index,
                    planned,
                    job_id: submission.job_id.clone(),
                    combination: result.combination.clone(),
                });
            }
            result.job_id = Some(submission.job_id.clone());

            if !options.stream {
                result.status = RunStatus::Succeeded;
            } else {
                match await_terminal(transport, &submission.job_id, job.index, options, progress, cancel)
                    .await
                {
                    Wait::Completed(outputs) => {
                        result.status = RunStatus::Succeeded;
                        result.output = outputs.last().cloned();
                    }
                    Wait::Failed(message) => result.error = Some(message),
                    Wait::Lost(err) => {
                        unreachable = err.is_unreachable();
                        result.error = Some(err.to_string());
                    }
                    Wait::TimedOut => {
                        result.status = RunStatus::TimedOut;
                        result.error = Some(format!(
                            "no terminal event within {}",
                            format_duration(options.job_timeout)
                        ));
                    }
                    Wait::Cancelled => {
                        cancelled = true;
                        result.status = RunStatus::Skipped;
                        result.error = Some("cancelled".to_string());
                    }
                }
            }
        }
    }

    result.elapsed = started.elapsed();
    Execution {
        result,
        cancelled,
        unreachable,
    }
}

/// Submit, retrying failed attempts with a fixed backoff. `Ok(None)` means
/// the run was cancelled first.
async fn submit_with_retries<T: Transport>(
    transport: &T,
    request: &JobRequest,
    options: &RunOptions,
    cancel: &CancellationToken,
    index: usize,
) -> Result<Option<Submission>, TransportError> {
    let mut attempt = 0u32;
    loop {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            outcome = transport.submit(request) => outcome,
        };
        match outcome {
            Ok(submission) => return Ok(Some(submission)),
            Err(err) if attempt < options.retries => {
                attempt += 1;
                warn!(
                    index,
                    attempt,
                    retries = options.retries,
                    error = %err,
                    "Submission failed, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Ok(None),
                    _ = tokio::time::sleep(options.retry_backoff) => {}
                }
            }
            Err(err) => return Err(err),
        }
    }
}

async fn await_terminal<T: Transport>(
    transport: &T,
    job_id: &str,
    index: usize,
    options: &RunOptions,
    progress: Option<&ProgressBus>,
    cancel: &CancellationToken,
) -> Wait {
    let deadline = tokio::time::sleep(options.job_timeout);
    tokio::pin!(deadline);

    let mut events = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Wait::Cancelled,
        _ = &mut deadline => return Wait::TimedOut,
        events = transport.events(job_id) => match events {
            Ok(events) => events,
            Err(err) => return Wait::Lost(err),
        },
    };

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Wait::Cancelled,
            _ = &mut deadline => return Wait::TimedOut,
            next = events.next() => next,
        };
        match next {
            Some(Ok(JobEvent::Queued)) => debug!(index, job_id, "Job queued"),
            Some(Ok(JobEvent::Running { value, max })) => {
                if let Some(bus) = progress {
                    bus.emit_best_effort(RunEvent::JobProgress { index, value, max });
                }
            }
            Some(Ok(JobEvent::Completed { outputs })) => return Wait::Completed(outputs),
            Some(Ok(JobEvent::Failed { message })) => return Wait::Failed(message),
            Some(Err(err)) => return Wait::Lost(err),
            None => return Wait::Failed("event stream ended before the job finished".to_string()),
        }
    }
}

fn finished_event(result: &RunResult) -> RunEvent {
    RunEvent::JobFinished(JobFinishedData {
        index: result.index,
        status: result.status.as_str().to_string(),
        duration_ms: result.elapsed.as_millis(),
        job_id: result.job_id.clone(),
        error: result.error.clone(),
        output: result.output.clone(),
    })
}

fn log_result(result: &RunResult) {
    let elapsed = format_duration(result.elapsed);
    match result.status {
        RunStatus::Succeeded => info!(
            index = result.index,
            job_id = result.job_id.as_deref().unwrap_or(""),
            output = result.output.as_deref().unwrap_or(""),
            "Combination {} succeeded in {}",
            result.index,
            elapsed
        ),
        RunStatus::Skipped => warn!(index = result.index, "Combination {} skipped", result.index),
        status => warn!(
            index = result.index,
            error = result.error.as_deref().unwrap_or(""),
            "Combination {} {} after {}",
            result.index,
            status.as_str(),
            elapsed
        ),
    }
}
