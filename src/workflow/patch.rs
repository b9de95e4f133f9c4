//! Per-combination graph patching.

use crate::axis::AxisTarget;
use crate::combination::Combination;
use crate::error::{ConfigError, WedgeError};
use crate::workflow::graph::WorkflowGraph;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;

/// A static value written to every combination before any wedge value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    pub target: AxisTarget,
    pub value: Value,
}

impl Override {
    pub fn new(node: impl Into<String>, param: impl Into<String>, value: Value) -> Self {
        Self {
            target: AxisTarget::new(node, param),
            value,
        }
    }
}

/// Produce the job graph for one combination.
///
/// The base graph is cloned, never modified. Overrides apply in declaration
/// order, then the combination's values in axis order, so a wedge replaces an
/// override on the same parameter. Two axes landing on the same resolved
/// `(node, parameter)` are a configuration error.
pub fn patch(
    base: &WorkflowGraph,
    overrides: &[Override],
    combo: &Combination,
) -> Result<WorkflowGraph, WedgeError> {
    let mut graph = base.clone();

    for o in overrides {
        graph.set_input(&o.target.node, &o.target.param, o.value.clone())?;
    }

    let mut written: HashSet<(String, String)> = HashSet::new();
    for (target, value) in &combo.values {
        let node_id = graph.resolve_node(&target.node)?;
        if !written.insert((node_id.clone(), target.param.clone())) {
            return Err(ConfigError::ConflictingAxis {
                node: target.node.clone(),
                param: target.param.clone(),
            }
            .into());
        }
        graph.set_input_by_id(&target.node, &node_id, &target.param, value.clone())?;
    }

    Ok(graph)
}

/// Metadata stored with each job's outputs: the sweep config and this
/// combination's position in the run.
pub fn annotate(config: &Value, combo: &Combination, planned: usize, output_name: &str) -> Value {
    json!({
        "wedge_config": config,
        "wedge_iteration": {
            "index": combo.index,
            "of": planned,
            "combination": combo.to_json(),
            "output": output_name,
        },
    })
}
