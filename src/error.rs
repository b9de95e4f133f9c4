//! Error types for the wedge sweep submitter.
//!
//! Errors are grouped by the layer that raises them: configuration problems are
//! fatal before anything is submitted, resolution problems are fatal for one
//! combination, and transport problems are recorded against a single job.

use thiserror::Error;

/// Malformed or contradictory sweep configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid axis {node}.{param}: {reason}")]
    InvalidAxis {
        node: String,
        param: String,
        reason: String,
    },

    #[error("Wedges were declared but no axis could be built from them")]
    EmptyWedge,

    #[error("Conflicting axes: more than one wedge targets {node}.{param}")]
    ConflictingAxis { node: String, param: String },

    #[error("Malformed wedge config: {0}")]
    Malformed(String),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("Config I/O error on {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::Settings(err.to_string())
    }
}

/// A target named by the config could not be located in the workflow graph.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("Node not found: '{target}' matches neither a node id nor a node title")]
    NodeNotFound { target: String },

    #[error("Node title '{target}' is ambiguous, matching nodes: {}", list(.candidates))]
    AmbiguousNode {
        target: String,
        candidates: Vec<String>,
    },

    #[error("Parameter '{param}' not found on node '{target}' (id {node_id})")]
    ParameterNotFound {
        target: String,
        node_id: String,
        param: String,
    },

    #[error(
        "Output node is ambiguous; candidates: {}. Rename the desired node to match --output-node.",
        list(.candidates)
    )]
    AmbiguousOutputNode { candidates: Vec<String> },

    #[error(
        "No output node found (candidates: {}). Title a node to match --output-node or keep exactly one save node.",
        list(.candidates)
    )]
    OutputNodeNotFound { candidates: Vec<String> },
}

fn list(candidates: &[String]) -> String {
    if candidates.is_empty() {
        "none".to_string()
    } else {
        candidates.join(", ")
    }
}

/// Failures talking to the inference server.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Server unreachable at {url}: {message}")]
    Unreachable { url: String, message: String },

    #[error("Submission rejected (status {status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timeout: {0}")]
    Timeout(String),
}

impl TransportError {
    /// True when the server could not be contacted at all.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, TransportError::Unreachable { .. })
    }
}

/// Top-level error for sweep runs.
#[derive(Debug, Error)]
pub enum WedgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Combination {index}: {source}")]
    Job {
        index: usize,
        #[source]
        source: Box<WedgeError>,
    },

    #[error("Workflow error: {0}")]
    Workflow(String),
}

impl WedgeError {
    /// Attach the 1-based combination index to an error raised while handling it.
    pub fn at(index: usize, err: impl Into<WedgeError>) -> Self {
        WedgeError::Job {
            index,
            source: Box::new(err.into()),
        }
    }

    /// Strip any `Job` wrappers to reach the underlying error.
    pub fn root(&self) -> &WedgeError {
        match self {
            WedgeError::Job { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_config(&self) -> bool {
        matches!(self.root(), WedgeError::Config(_))
    }

    pub fn is_resolution(&self) -> bool {
        matches!(self.root(), WedgeError::Resolution(_))
    }
}
