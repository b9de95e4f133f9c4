//! Settings sources, lowest precedence first.

pub mod global_file;
pub mod workflow_file;
