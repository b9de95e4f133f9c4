//! Submission transport
//!
//! The orchestrator talks to the inference server only through [`Transport`]:
//! submit a resolved job graph, then optionally watch its events until a
//! terminal one arrives. [`ComfyClient`] implements it over HTTP.

use crate::error::TransportError;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

pub mod comfy;

pub use comfy::ComfyClient;

/// One job ready to send: the resolved graph plus metadata stored alongside outputs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRequest {
    pub prompt: Value,
    pub extra_pnginfo: Value,
}

/// Server acknowledgment of an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_number: Option<u64>,
}

/// Lifecycle events for a submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobEvent {
    Queued,
    Running {
        #[serde(default)]
        value: u64,
        #[serde(default)]
        max: u64,
    },
    Completed {
        #[serde(default)]
        outputs: Vec<String>,
    },
    Failed {
        message: String,
    },
}

impl JobEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobEvent::Completed { .. } | JobEvent::Failed { .. })
    }
}

/// Stream of job events, ending after a terminal event.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<JobEvent, TransportError>> + Send>>;

/// Capability the orchestrator submits through.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a job; returns the server-assigned id once accepted.
    async fn submit(&self, request: &JobRequest) -> Result<Submission, TransportError>;

    /// Watch events for an accepted job.
    async fn events(&self, job_id: &str) -> Result<EventStream, TransportError>;

    /// Base URL, for logs.
    fn endpoint(&self) -> &str;
}
