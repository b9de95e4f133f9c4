//! Configuration System
//!
//! Two layers feed a run. The wedge config (JSON, one per sweep) declares what to
//! sweep and where outputs go; it is parsed by [`WedgeConfig`]. Tool settings
//! (TOML and environment) tune transport timeouts, run policy, limits, and
//! logging; they are merged by [`ConfigLoader`].

use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

mod loader;
mod merge;
mod sources;
mod wedge;

pub use loader::{ConfigLoader, ENV_PREFIX};
pub use sources::global_file::global_config_path;
pub use sources::workflow_file::WORKFLOW_SETTINGS_FILE;
pub use wedge::{normalize_base_url, WedgeConfig, ADJACENT_CONFIG_NAME};

/// Root settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WedgeSettings {
    #[serde(default)]
    pub transport: TransportSettings,

    #[serde(default)]
    pub run: RunSettings,

    #[serde(default)]
    pub limits: LimitSettings,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP client and event-stream tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportSettings {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// Timeout for a single HTTP request (submit, queue, history).
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Interval between event polls while a job is being watched.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long to wait for a terminal event before marking a job timed out.
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    /// Extra submission attempts after a rejected or failed submit.
    #[serde(default)]
    pub retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Follow the server's `/ws` event socket for step progress; polling is
    /// used when it is off or the socket cannot be opened.
    #[serde(default = "default_websocket")]
    pub websocket: bool,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_job_timeout_secs() -> u64 {
    600
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_websocket() -> bool {
    true
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            websocket: default_websocket(),
        }
    }
}

/// What to do when a combination cannot be resolved against the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPolicy {
    /// Stop the run at the first resolution failure.
    #[default]
    Abort,
    /// Record the combination as skipped and move on.
    Skip,
}

/// Run-level policy defaults; CLI flags override these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    #[serde(default = "default_save_class")]
    pub save_class: String,

    #[serde(default = "default_output_title")]
    pub output_title: String,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub strict: bool,

    #[serde(default)]
    pub stop_on_first_failure: bool,

    #[serde(default)]
    pub resolution_policy: ResolutionPolicy,

    /// Number of recent job durations averaged for the ETA.
    #[serde(default = "default_eta_window")]
    pub eta_window: usize,
}

fn default_save_class() -> String {
    crate::workflow::DEFAULT_SAVE_CLASS.to_string()
}

fn default_output_title() -> String {
    crate::workflow::DEFAULT_OUTPUT_TITLE.to_string()
}

fn default_eta_window() -> usize {
    20
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            save_class: default_save_class(),
            output_title: default_output_title(),
            stream: false,
            strict: false,
            stop_on_first_failure: false,
            resolution_policy: ResolutionPolicy::default(),
            eta_window: default_eta_window(),
        }
    }
}

/// Safety ceilings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitSettings {
    #[serde(default = "default_max_axis_values")]
    pub max_axis_values: usize,
}

fn default_max_axis_values() -> usize {
    crate::axis::DEFAULT_MAX_AXIS_VALUES
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_axis_values: default_max_axis_values(),
        }
    }
}

/// Settings validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    Transport(String),
    Run(String),
    Limits(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::Transport(msg) => write!(f, "transport: {}", msg),
            ValidationError::Run(msg) => write!(f, "run: {}", msg),
            ValidationError::Limits(msg) => write!(f, "limits: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

impl WedgeSettings {
    /// Validate every section, collecting all problems.
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.transport.poll_interval_ms == 0 {
            errors.push(ValidationError::Transport(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.transport.job_timeout_secs == 0 {
            errors.push(ValidationError::Transport(
                "job_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.transport.request_timeout_secs == 0 {
            errors.push(ValidationError::Transport(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.run.save_class.trim().is_empty() {
            errors.push(ValidationError::Run("save_class cannot be empty".to_string()));
        }
        if self.run.eta_window == 0 {
            errors.push(ValidationError::Run("eta_window must be at least 1".to_string()));
        }
        if self.limits.max_axis_values == 0 {
            errors.push(ValidationError::Limits(
                "max_axis_values must be at least 1".to_string(),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, crate::error::ConfigError> {
        toml::to_string_pretty(self).map_err(|e| crate::error::ConfigError::Settings(e.to_string()))
    }
}
