//! Wedge axes: one swept parameter and the values it takes.
//!
//! An axis is declared either as an explicit list of values or as a numeric
//! `[min, max, step]` range. Both forms are validated when the config is loaded
//! and expanded into a concrete, ordered value list by [`expand`].

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashMap;
use std::fmt;

/// Default ceiling on the number of values a single axis may expand to.
pub const DEFAULT_MAX_AXIS_VALUES: usize = 100_000;

/// Relative tolerance used when deciding whether `max` lies on a step boundary.
const STEP_TOLERANCE: f64 = 1e-9;

/// Decimal places kept on float axis values.
const FLOAT_DECIMALS: i32 = 10;

/// A (node-target, parameter) pair. The node target is a node id or a node title.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AxisTarget {
    pub node: String,
    pub param: String,
}

impl AxisTarget {
    pub fn new(node: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            param: param.into(),
        }
    }
}

impl fmt::Display for AxisTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.param)
    }
}

/// How an axis describes its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AxisKind {
    Explicit { values: Vec<Value> },
    MinMax { min: f64, max: f64, step: f64 },
}

impl AxisKind {
    pub fn name(&self) -> &'static str {
        match self {
            AxisKind::Explicit { .. } => "explicit",
            AxisKind::MinMax { .. } => "minmax",
        }
    }
}

/// One declared wedge axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub target: AxisTarget,
    pub kind: AxisKind,
}

impl AxisSpec {
    pub fn explicit(target: AxisTarget, values: Vec<Value>) -> Result<Self, ConfigError> {
        let spec = Self {
            target,
            kind: AxisKind::Explicit { values },
        };
        spec.validate()?;
        Ok(spec)
    }

    pub fn min_max(target: AxisTarget, min: f64, max: f64, step: f64) -> Result<Self, ConfigError> {
        let spec = Self {
            target,
            kind: AxisKind::MinMax { min, max, step },
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Build an axis from the loosely typed `[param, values, wedge_type]` config triple.
    pub fn parse(node: &str, param: &str, values: &Value, wedge_type: &str) -> Result<Self, ConfigError> {
        let target = AxisTarget::new(node, param);
        match wedge_type {
            "explicit" => {
                let values = values.as_array().ok_or_else(|| {
                    invalid(&target, "explicit wedge values must be a list")
                })?;
                Self::explicit(target, values.clone())
            }
            "minmax" => {
                let triple = values
                    .as_array()
                    .filter(|items| items.len() == 3)
                    .ok_or_else(|| invalid(&target, "minmax wedge expects [min, max, step]"))?;
                let mut numbers = [0.0f64; 3];
                for (slot, item) in numbers.iter_mut().zip(triple) {
                    *slot = item.as_f64().ok_or_else(|| {
                        invalid(&target, &format!("minmax bound {} is not a number", item))
                    })?;
                }
                Self::min_max(target, numbers[0], numbers[1], numbers[2])
            }
            other => Err(invalid(
                &target,
                &format!("unsupported wedge type '{}' (expected 'explicit' or 'minmax')", other),
            )),
        }
    }

    /// Check the structural invariants of the axis without expanding it.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.kind {
            AxisKind::Explicit { values } => {
                if values.is_empty() {
                    return Err(invalid(&self.target, "explicit wedge must contain at least one value"));
                }
                if let Some(bad) = values.iter().find(|v| v.is_array() || v.is_object() || v.is_null()) {
                    return Err(invalid(
                        &self.target,
                        &format!("explicit wedge values must be scalars, got {}", bad),
                    ));
                }
                distinct_renderings(&self.target, values)
            }
            AxisKind::MinMax { min, max, step } => {
                if !min.is_finite() || !max.is_finite() || !step.is_finite() {
                    return Err(invalid(&self.target, "minmax bounds must be finite numbers"));
                }
                if *step == 0.0 {
                    return Err(invalid(&self.target, "minmax step must be non-zero"));
                }
                if min != max && (max - min).signum() != step.signum() {
                    return Err(invalid(
                        &self.target,
                        &format!(
                            "step {} does not move from {} towards {}",
                            format_f64(*step),
                            format_f64(*min),
                            format_f64(*max)
                        ),
                    ));
                }
                Ok(())
            }
        }
    }

    /// True when a minmax axis yields integer values.
    pub fn is_integral(&self) -> bool {
        match &self.kind {
            AxisKind::MinMax { min, max, step } => is_whole(*min) && is_whole(*max) && is_whole(*step),
            AxisKind::Explicit { values } => values.iter().all(|v| v.is_i64() || v.is_u64()),
        }
    }
}

fn invalid(target: &AxisTarget, reason: &str) -> ConfigError {
    ConfigError::InvalidAxis {
        node: target.node.clone(),
        param: target.param.clone(),
        reason: reason.to_string(),
    }
}

fn is_whole(v: f64) -> bool {
    v.fract() == 0.0 && v.abs() < i64::MAX as f64
}

fn format_f64(v: f64) -> String {
    format!("{}", v)
}

/// Expand an axis into its ordered values using the default safety ceiling.
pub fn expand(spec: &AxisSpec) -> Result<Vec<Value>, ConfigError> {
    expand_with_ceiling(spec, DEFAULT_MAX_AXIS_VALUES)
}

/// Expand an axis, refusing to produce more than `ceiling` values.
pub fn expand_with_ceiling(spec: &AxisSpec, ceiling: usize) -> Result<Vec<Value>, ConfigError> {
    spec.validate()?;
    match &spec.kind {
        AxisKind::Explicit { values } => {
            if values.len() > ceiling {
                return Err(invalid(
                    &spec.target,
                    &format!("{} values exceed the ceiling of {}", values.len(), ceiling),
                ));
            }
            Ok(values.clone())
        }
        AxisKind::MinMax { min, max, step } => {
            let count = step_count(*min, *max, *step);
            if count > ceiling as f64 {
                return Err(invalid(
                    &spec.target,
                    &format!(
                        "range {}..{} by {} expands to more than {} values",
                        format_f64(*min),
                        format_f64(*max),
                        format_f64(*step),
                        ceiling
                    ),
                ));
            }
            let count = count as usize;
            if spec.is_integral() {
                Ok(integer_range(*min as i64, *step as i64, count))
            } else {
                let values = float_range(spec, *min, *step, count)?;
                distinct_renderings(&spec.target, &values)?;
                Ok(values)
            }
        }
    }
}

/// `floor((max - min) / step) + 1`, with `max` counted when it sits on a step boundary.
fn step_count(min: f64, max: f64, step: f64) -> f64 {
    if min == max {
        return 1.0;
    }
    let span = (max - min) / step;
    (span + span.abs().max(1.0) * STEP_TOLERANCE).floor() + 1.0
}

fn integer_range(min: i64, step: i64, count: usize) -> Vec<Value> {
    (0..count as i64)
        .map(|i| Value::from(min + i * step))
        .collect()
}

/// Output names embed each value's rendering, so two values that render the
/// same (`1` and `"1"`, `3` and `3.0`) would overwrite each other's outputs.
fn distinct_renderings(target: &AxisTarget, values: &[Value]) -> Result<(), ConfigError> {
    let mut seen: HashMap<String, &Value> = HashMap::with_capacity(values.len());
    for value in values {
        let rendered = crate::naming::render_value(value);
        if let Some(previous) = seen.insert(rendered.clone(), value) {
            return Err(invalid(
                target,
                &format!(
                    "values {} and {} both name outputs as '{}'",
                    previous, value, rendered
                ),
            ));
        }
    }
    Ok(())
}

fn float_range(spec: &AxisSpec, min: f64, step: f64, count: usize) -> Result<Vec<Value>, ConfigError> {
    let scale = 10f64.powi(FLOAT_DECIMALS);
    (0..count)
        .map(|i| {
            let raw = min + i as f64 * step;
            let rounded = (raw * scale).round() / scale;
            Number::from_f64(rounded)
                .map(Value::Number)
                .ok_or_else(|| invalid(&spec.target, &format!("value {} is not representable", raw)))
        })
        .collect()
}
