//! Wedge: Parameter Sweeps for ComfyUI-compatible Servers
//!
//! Expands declared parameter axes into the Cartesian product of value
//! combinations, patches a base workflow graph once per combination, and
//! submits each patched graph to a remote inference server while tracking
//! per-job status, output names, and an ETA for the rest of the sweep.

pub mod axis;
pub mod cli;
pub mod combination;
pub mod config;
pub mod error;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod progress;
pub mod transport;
pub mod workflow;
