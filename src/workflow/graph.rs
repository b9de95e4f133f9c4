//! Workflow graph document: node id → node record.

use crate::error::{ResolutionError, WedgeError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// ComfyUI keeps display titles under `_meta`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One node of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub class_type: String,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(rename = "_meta", default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<NodeMeta>,
    /// Fields the patcher does not interpret; carried through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NodeRecord {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            class_type: class_type.into(),
            inputs: Map::new(),
            title: None,
            meta: None,
            extra: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.meta = Some(NodeMeta {
            title: Some(title.into()),
            extra: Map::new(),
        });
        self
    }

    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        self.inputs.insert(name.into(), value);
        self
    }

    /// Display title: a top-level `title` wins over `_meta.title`.
    pub fn title(&self) -> Option<&str> {
        self.title
            .as_deref()
            .or_else(|| self.meta.as_ref().and_then(|m| m.title.as_deref()))
    }
}

/// Mapping from node identifier to node record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: BTreeMap<String, NodeRecord>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, WedgeError> {
        serde_json::from_str(raw)
            .map_err(|e| WedgeError::Workflow(format!("Failed to parse workflow JSON: {}", e)))
    }

    pub fn load(path: &Path) -> Result<Self, WedgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WedgeError::Workflow(format!("Failed to read workflow {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn to_json(&self) -> Result<Value, WedgeError> {
        serde_json::to_value(self)
            .map_err(|e| WedgeError::Workflow(format!("Failed to serialize workflow: {}", e)))
    }

    pub fn insert(&mut self, id: impl Into<String>, node: NodeRecord) {
        self.nodes.insert(id.into(), node);
    }

    pub fn node(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NodeRecord)> {
        self.nodes.iter()
    }

    /// Ids of every node carrying exactly this title.
    pub fn ids_with_title(&self, title: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.title() == Some(title))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Ids of every node of the given class.
    pub fn ids_of_class(&self, class_type: &str) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.class_type == class_type)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Resolve a node target: exact id first, then a unique case-sensitive title.
    pub fn resolve_node(&self, target: &str) -> Result<String, ResolutionError> {
        if self.nodes.contains_key(target) {
            return Ok(target.to_string());
        }
        let mut titled = self.ids_with_title(target);
        match titled.len() {
            0 => Err(ResolutionError::NodeNotFound {
                target: target.to_string(),
            }),
            1 => Ok(titled.remove(0)),
            _ => Err(ResolutionError::AmbiguousNode {
                target: target.to_string(),
                candidates: titled,
            }),
        }
    }

    /// Overwrite an existing input on the node with the given id.
    pub(crate) fn set_input_by_id(
        &mut self,
        target: &str,
        node_id: &str,
        param: &str,
        value: Value,
    ) -> Result<(), ResolutionError> {
        let node = self
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| ResolutionError::NodeNotFound {
                target: target.to_string(),
            })?;
        match node.inputs.get_mut(param) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ResolutionError::ParameterNotFound {
                target: target.to_string(),
                node_id: node_id.to_string(),
                param: param.to_string(),
            }),
        }
    }

    /// Resolve `target` and overwrite its `param` input. Returns the resolved node id.
    pub fn set_input(&mut self, target: &str, param: &str, value: Value) -> Result<String, ResolutionError> {
        let node_id = self.resolve_node(target)?;
        self.set_input_by_id(target, &node_id, param, value)?;
        Ok(node_id)
    }

    pub fn input(&self, node_id: &str, param: &str) -> Option<&Value> {
        self.nodes.get(node_id).and_then(|n| n.inputs.get(param))
    }
}
