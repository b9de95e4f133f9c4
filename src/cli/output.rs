//! CLI output: error mapping from domain errors to stable CLI surface.

use crate::error::{ConfigError, TransportError, WedgeError};

/// Map run errors to a single line for stderr, prefixed by a stable category.
pub fn map_error(e: &WedgeError) -> String {
    let category = match e.root() {
        WedgeError::Config(ConfigError::Io { .. }) => "io",
        WedgeError::Config(_) => "config",
        WedgeError::Resolution(_) => "resolution",
        WedgeError::Transport(TransportError::Unreachable { .. }) => "unreachable",
        WedgeError::Transport(_) => "transport",
        WedgeError::Workflow(_) => "workflow",
        WedgeError::Job { .. } => "job",
    };
    format!("error[{}]: {}", category, e)
}
