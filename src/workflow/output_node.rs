//! Locating the node that receives the output path.

use crate::error::ResolutionError;
use crate::workflow::graph::WorkflowGraph;
use serde_json::Value;

/// Node class treated as the save/output node when no title matches.
pub const DEFAULT_SAVE_CLASS: &str = "SaveImage";

/// Title looked up first when none is given on the command line.
pub const DEFAULT_OUTPUT_TITLE: &str = "OUT_image";

/// Input on the output node that receives the output path.
pub const OUTPUT_PREFIX_PARAM: &str = "filename_prefix";

/// Pick the output node: a uniquely titled node first, otherwise the only node
/// of `save_class`.
pub fn resolve_output_node(
    graph: &WorkflowGraph,
    preferred_title: Option<&str>,
    save_class: &str,
) -> Result<String, ResolutionError> {
    let mut titled = preferred_title
        .map(|title| graph.ids_with_title(title))
        .unwrap_or_default();
    if titled.len() == 1 {
        return Ok(titled.remove(0));
    }

    let mut saves = graph.ids_of_class(save_class);
    match saves.len() {
        1 => Ok(saves.remove(0)),
        0 if titled.len() > 1 => Err(ResolutionError::AmbiguousOutputNode { candidates: titled }),
        0 => Err(ResolutionError::OutputNodeNotFound { candidates: titled }),
        _ => Err(ResolutionError::AmbiguousOutputNode { candidates: saves }),
    }
}

/// Write the output path into the resolved node.
pub fn set_output_prefix(
    graph: &mut WorkflowGraph,
    node_id: &str,
    output_path: &str,
) -> Result<(), ResolutionError> {
    graph.set_input_by_id(
        node_id,
        node_id,
        OUTPUT_PREFIX_PARAM,
        Value::String(output_path.to_string()),
    )
}
