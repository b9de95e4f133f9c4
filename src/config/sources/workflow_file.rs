//! Per-project settings: wedge.toml next to the workflow file.

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use std::path::Path;

pub const WORKFLOW_SETTINGS_FILE: &str = "wedge.toml";

/// Add `<workflow_dir>/wedge.toml` to the builder when present.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    workflow_dir: &Path,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let path = workflow_dir.join(WORKFLOW_SETTINGS_FILE);
    if path.exists() {
        Ok(builder.add_source(File::from(path).required(false)))
    } else {
        Ok(builder)
    }
}
