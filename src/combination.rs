//! Cartesian expansion of wedge axes.
//!
//! Combinations are enumerated in odometer order: the first axis varies slowest
//! and the last axis fastest. Output names and progress indices depend on this
//! order, so it must not change between runs given the same axes.

use crate::axis::{expand_with_ceiling, AxisSpec, AxisTarget, DEFAULT_MAX_AXIS_VALUES};
use crate::error::ConfigError;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;

/// One resolved assignment of a value to every axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Combination {
    /// 1-based position in enumeration order.
    pub index: usize,
    pub values: Vec<(AxisTarget, Value)>,
}

impl Combination {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, node: &str, param: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(t, _)| t.node == node && t.param == param)
            .map(|(_, v)| v)
    }

    /// Human-readable `node.param=value` list for logs.
    pub fn describe(&self) -> String {
        if self.values.is_empty() {
            return "<no wedges>".to_string();
        }
        self.values
            .iter()
            .map(|(target, value)| format!("{}={}", target, display_value(value)))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Nested `{node: {param: value}}` form embedded in job metadata.
    pub fn to_json(&self) -> Value {
        let mut root = serde_json::Map::new();
        for (target, value) in &self.values {
            let node = root
                .entry(target.node.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            if let Value::Object(params) = node {
                params.insert(target.param.clone(), value.clone());
            }
        }
        Value::Object(root)
    }
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expanded axes plus an optional cap on how many combinations to run.
#[derive(Debug, Clone)]
pub struct CombinationPlan {
    axes: Vec<(AxisTarget, Vec<Value>)>,
    limit: Option<usize>,
}

impl CombinationPlan {
    /// Expand every axis once and check the axis set as a whole.
    pub fn new(specs: &[AxisSpec], limit: Option<usize>) -> Result<Self, ConfigError> {
        Self::with_ceiling(specs, limit, DEFAULT_MAX_AXIS_VALUES)
    }

    pub fn with_ceiling(
        specs: &[AxisSpec],
        limit: Option<usize>,
        ceiling: usize,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut axes = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(&spec.target) {
                return Err(ConfigError::ConflictingAxis {
                    node: spec.target.node.clone(),
                    param: spec.target.param.clone(),
                });
            }
            let values = expand_with_ceiling(spec, ceiling)?;
            if values.is_empty() {
                return Err(ConfigError::EmptyWedge);
            }
            axes.push((spec.target.clone(), values));
        }
        Ok(Self {
            axes,
            limit: limit.filter(|l| *l > 0),
        })
    }

    /// Build a plan for a config that declared `declared` wedges.
    ///
    /// Zero axes is only legitimate when nothing was declared; a declared wedge
    /// set that produced no axes is an error rather than a silent single run.
    pub fn for_declared(
        specs: &[AxisSpec],
        declared: usize,
        limit: Option<usize>,
        ceiling: usize,
    ) -> Result<Self, ConfigError> {
        if declared > 0 && specs.is_empty() {
            return Err(ConfigError::EmptyWedge);
        }
        Self::with_ceiling(specs, limit, ceiling)
    }

    pub fn axes(&self) -> &[(AxisTarget, Vec<Value>)] {
        &self.axes
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Size of the full product, ignoring the limit.
    pub fn total(&self) -> usize {
        self.axes
            .iter()
            .map(|(_, values)| values.len())
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }

    /// Number of combinations that will actually be enumerated.
    pub fn planned(&self) -> usize {
        match self.limit {
            Some(limit) => limit.min(self.total()),
            None => self.total(),
        }
    }

    /// Start a fresh enumeration from the first combination.
    pub fn iter(&self) -> Combinations<'_> {
        Combinations {
            plan: self,
            odometer: vec![0; self.axes.len()],
            emitted: 0,
            remaining: self.planned(),
        }
    }
}

/// Lazy odometer over a [`CombinationPlan`].
pub struct Combinations<'a> {
    plan: &'a CombinationPlan,
    odometer: Vec<usize>,
    emitted: usize,
    remaining: usize,
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        if self.remaining == 0 {
            return None;
        }
        let values = self
            .plan
            .axes
            .iter()
            .zip(&self.odometer)
            .map(|((target, values), &pos)| (target.clone(), values[pos].clone()))
            .collect();

        // Advance the last wheel, carrying leftwards.
        for axis in (0..self.odometer.len()).rev() {
            self.odometer[axis] += 1;
            if self.odometer[axis] < self.plan.axes[axis].1.len() {
                break;
            }
            self.odometer[axis] = 0;
        }

        self.remaining -= 1;
        self.emitted += 1;
        Some(Combination {
            index: self.emitted,
            values,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for Combinations<'_> {}
