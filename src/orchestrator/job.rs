//! Job planning: everything that happens to a combination before it touches
//! the network.

use crate::combination::{Combination, CombinationPlan};
use crate::config::WedgeConfig;
use crate::error::WedgeError;
use crate::naming;
use crate::orchestrator::RunOptions;
use crate::transport::JobRequest;
use crate::workflow::{annotate, patch, resolve_output_node, set_output_prefix, WorkflowGraph};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A combination resolved into a submittable graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub index: usize,
    pub combination: Combination,
    pub output_name: String,
    pub output_path: PathBuf,
    pub output_node: String,
    pub graph: WorkflowGraph,
    pub metadata: Value,
}

impl Job {
    pub fn request(&self) -> Result<JobRequest, WedgeError> {
        Ok(JobRequest {
            prompt: self.graph.to_json()?,
            extra_pnginfo: self.metadata.clone(),
        })
    }
}

/// Base workflow, wedge config, and the combination plan they produce.
#[derive(Debug, Clone)]
pub struct Sweep {
    base: WorkflowGraph,
    config: WedgeConfig,
    plan: CombinationPlan,
    config_json: Value,
}

impl Sweep {
    /// Expand the config's axes under `options`. Axis and wedge errors surface
    /// here, before anything is submitted.
    pub fn new(
        base: WorkflowGraph,
        config: WedgeConfig,
        options: &RunOptions,
    ) -> Result<Self, WedgeError> {
        let plan = CombinationPlan::for_declared(
            &config.axes,
            config.declared_wedges,
            options.limit,
            options.max_axis_values,
        )?;
        let config_json = config.to_json();
        Ok(Self {
            base,
            config,
            plan,
            config_json,
        })
    }

    pub fn plan(&self) -> &CombinationPlan {
        &self.plan
    }

    pub fn config(&self) -> &WedgeConfig {
        &self.config
    }

    pub fn base(&self) -> &WorkflowGraph {
        &self.base
    }

    /// Resolve one combination into a job. Pure: the base graph is only read.
    pub fn plan_job(&self, combo: &Combination, options: &RunOptions) -> Result<Job, WedgeError> {
        let index = combo.index;
        let mut graph =
            patch(&self.base, &self.config.overrides, combo).map_err(|e| WedgeError::at(index, e))?;

        let output_node =
            resolve_output_node(&graph, options.output_title.as_deref(), &options.save_class)
                .map_err(|e| WedgeError::at(index, e))?;

        let output_name = naming::output_name(combo, &self.config.filename_prefix);
        let output_path = naming::output_path(
            Path::new(&self.config.output_folder),
            combo,
            &self.config.filename_prefix,
        );
        set_output_prefix(&mut graph, &output_node, &path_string(&output_path))
            .map_err(|e| WedgeError::at(index, e))?;

        let metadata = annotate(&self.config_json, combo, self.plan.planned(), &output_name);

        Ok(Job {
            index,
            combination: combo.clone(),
            output_name,
            output_path,
            output_node,
            graph,
            metadata,
        })
    }

    /// Every planned job, computed without any transport. Stops at the first
    /// combination that cannot be resolved.
    pub fn dry_run(&self, options: &RunOptions) -> Result<Vec<Job>, WedgeError> {
        self.plan
            .iter()
            .map(|combo| self.plan_job(&combo, options))
            .collect()
    }
}

/// Server-side prefixes always use forward slashes.
fn path_string(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
