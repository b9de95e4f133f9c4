//! Wedge config: the JSON document describing one sweep.
//!
//! Accepts the current schema (`param_overrides` keyed by node, `param_wedges`
//! keyed by node) as well as the older forms (list-form overrides, wedges keyed
//! by parameter, `project_name` instead of `output_folder`). Everything is
//! normalized into typed [`Override`]s and [`AxisSpec`]s once, at load time.

use crate::axis::AxisSpec;
use crate::error::ConfigError;
use crate::workflow::Override;
use serde_json::{json, Map, Value};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Config file picked up next to the workflow when no path is given.
pub const ADJACENT_CONFIG_NAME: &str = "wedge_config.json";

#[derive(Debug, Clone, PartialEq)]
pub struct WedgeConfig {
    pub output_folder: String,
    pub filename_prefix: String,
    pub url: String,
    pub overrides: Vec<Override>,
    pub axes: Vec<AxisSpec>,
    /// Number of node entries under `param_wedges`, whether or not they held any axis.
    pub declared_wedges: usize,
}

impl WedgeConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let data: Value = serde_json::from_str(raw)
            .map_err(|e| ConfigError::Malformed(format!("invalid JSON: {}", e)))?;
        Self::from_value(&data)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn from_value(data: &Value) -> Result<Self, ConfigError> {
        let obj = data
            .as_object()
            .ok_or_else(|| ConfigError::Malformed("config must be a JSON object".to_string()))?;

        let output_folder = non_empty(obj, "output_folder")
            .or_else(|| non_empty(obj, "project_name"))
            .ok_or_else(|| {
                ConfigError::Malformed("output_folder must be a non-empty string".to_string())
            })?;
        let filename_prefix = non_empty(obj, "filename_prefix").ok_or_else(|| {
            ConfigError::Malformed("filename_prefix must be a non-empty string".to_string())
        })?;
        let url = non_empty(obj, "url")
            .ok_or_else(|| ConfigError::Malformed("url must be a non-empty string".to_string()))?;

        let overrides = parse_overrides(obj.get("param_overrides"))?;
        let (axes, declared_wedges) = parse_wedges(obj.get("param_wedges"))?;

        let mut seen = HashSet::new();
        for axis in &axes {
            if !seen.insert(&axis.target) {
                return Err(ConfigError::ConflictingAxis {
                    node: axis.target.node.clone(),
                    param: axis.target.param.clone(),
                });
            }
        }

        Ok(Self {
            output_folder,
            filename_prefix,
            url,
            overrides,
            axes,
            declared_wedges,
        })
    }

    /// Locate the config for a workflow.
    ///
    /// An explicit path is tried as given, then relative to the workflow's
    /// directory; with no explicit path, `wedge_config.json` next to the
    /// workflow is used.
    pub fn discover(workflow: &Path, explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let workflow_dir = workflow.parent().unwrap_or_else(|| Path::new("."));
        if let Some(explicit) = explicit {
            if explicit.exists() {
                return Ok(explicit.to_path_buf());
            }
            let candidate = workflow_dir.join(explicit);
            if candidate.exists() {
                return Ok(candidate);
            }
            return Err(ConfigError::Malformed(format!(
                "config file {} not found (also tried {})",
                explicit.display(),
                candidate.display()
            )));
        }
        let adjacent = workflow_dir.join(ADJACENT_CONFIG_NAME);
        if adjacent.exists() {
            return Ok(adjacent);
        }
        Err(ConfigError::Malformed(format!(
            "a {} is required next to the workflow, or pass --config",
            ADJACENT_CONFIG_NAME
        )))
    }

    /// Server URL with a scheme.
    pub fn base_url(&self) -> String {
        normalize_base_url(&self.url)
    }

    /// `<output_folder>/images`
    pub fn images_dir(&self) -> PathBuf {
        Path::new(&self.output_folder).join(crate::naming::IMAGES_DIR)
    }

    /// Normalized current-schema form, embedded in job metadata.
    pub fn to_json(&self) -> Value {
        let mut overrides = Map::new();
        for o in &self.overrides {
            push_entry(&mut overrides, &o.target.node, json!([o.target.param, o.value]));
        }
        let mut wedges = Map::new();
        for axis in &self.axes {
            let entry = match &axis.kind {
                crate::axis::AxisKind::Explicit { values } => {
                    json!([axis.target.param, values, "explicit"])
                }
                crate::axis::AxisKind::MinMax { min, max, step } => {
                    json!([axis.target.param, [min, max, step], "minmax"])
                }
            };
            push_entry(&mut wedges, &axis.target.node, entry);
        }
        json!({
            "output_folder": self.output_folder,
            "filename_prefix": self.filename_prefix,
            "url": self.url,
            "param_overrides": overrides,
            "param_wedges": wedges,
        })
    }
}

fn push_entry(map: &mut Map<String, Value>, node: &str, entry: Value) {
    if let Value::Array(list) = map
        .entry(node.to_string())
        .or_insert_with(|| Value::Array(Vec::new()))
    {
        list.push(entry);
    }
}

/// Prepend `http://` to a scheme-less `host:port`.
pub fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

fn non_empty(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_overrides(raw: Option<&Value>) -> Result<Vec<Override>, ConfigError> {
    match raw {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Object(by_node)) => {
            let mut overrides = Vec::new();
            for (node, entries) in by_node {
                let entries = entries.as_array().ok_or_else(|| {
                    ConfigError::Malformed(format!("param_overrides[{:?}] must be a list", node))
                })?;
                for entry in entries {
                    match entry.as_array().map(Vec::as_slice) {
                        Some([Value::String(param), value]) => {
                            overrides.push(Override::new(node.clone(), param.clone(), value.clone()))
                        }
                        _ => {
                            return Err(ConfigError::Malformed(format!(
                                "param_overrides[{:?}] entries must be [param, value] lists",
                                node
                            )))
                        }
                    }
                }
            }
            Ok(overrides)
        }
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| match entry.as_array().map(Vec::as_slice) {
                Some([Value::String(node), Value::String(param), value]) => {
                    Ok(Override::new(node.clone(), param.clone(), value.clone()))
                }
                _ => Err(ConfigError::Malformed(
                    "list-form param_overrides entries must be [node, param, value]".to_string(),
                )),
            })
            .collect(),
        Some(_) => Err(ConfigError::Malformed(
            "param_overrides must be an object or a list".to_string(),
        )),
    }
}

fn parse_wedges(raw: Option<&Value>) -> Result<(Vec<AxisSpec>, usize), ConfigError> {
    let by_key = match raw {
        None | Some(Value::Null) => return Ok((Vec::new(), 0)),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ConfigError::Malformed(
                "param_wedges must be an object".to_string(),
            ))
        }
    };

    let mut axes = Vec::new();
    for (key, value) in by_key {
        let list = value.as_array().ok_or_else(|| {
            ConfigError::Malformed(format!("param_wedges[{:?}] must be a list", key))
        })?;

        // Legacy form: param -> [node, values, mode]
        if let [Value::String(node), values, Value::String(mode)] = list.as_slice() {
            axes.push(AxisSpec::parse(node, key, values, mode)?);
            continue;
        }

        // Current form: node -> [[param, values, mode], ...]
        for entry in list {
            match entry.as_array().map(Vec::as_slice) {
                Some([Value::String(param), values, Value::String(mode)]) => {
                    axes.push(AxisSpec::parse(key, param, values, mode)?);
                }
                _ => {
                    return Err(ConfigError::Malformed(format!(
                        "param_wedges[{:?}] entries must be [param, values, wedge_type] lists",
                        key
                    )))
                }
            }
        }
    }
    Ok((axes, by_key.len()))
}
