//! Workflow graph model, patching, and output-node resolution.

mod graph;
mod output_node;
mod patch;

pub use graph::{NodeMeta, NodeRecord, WorkflowGraph};
pub use output_node::{
    resolve_output_node, set_output_prefix, DEFAULT_OUTPUT_TITLE, DEFAULT_SAVE_CLASS,
    OUTPUT_PREFIX_PARAM,
};
pub use patch::{annotate, patch, Override};
