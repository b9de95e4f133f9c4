//! Settings loader: defaults ← global file ← workflow file ← environment.

use crate::config::{merge, sources, WedgeSettings};
use crate::error::ConfigError;
use config::{Environment, File};
use std::path::Path;
use tracing::debug;

/// Environment prefix; `WEDGE__TRANSPORT__RETRIES=3` sets `transport.retries`.
pub const ENV_PREFIX: &str = "WEDGE";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load settings for a run whose workflow lives in `workflow_dir`.
    pub fn load(workflow_dir: Option<&Path>) -> Result<WedgeSettings, ConfigError> {
        let mut builder = merge::builder_with_defaults()?;
        builder = sources::global_file::add_to_builder(builder)?;
        if let Some(dir) = workflow_dir {
            builder = sources::workflow_file::add_to_builder(builder, dir)?;
        }
        let settings: WedgeSettings = builder
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Self::checked(settings)
    }

    /// Load settings from an explicit file, skipping the global and workflow files.
    pub fn load_from_file(path: &Path) -> Result<WedgeSettings, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Settings(format!(
                "Settings file not found: {}",
                path.display()
            )));
        }
        let settings: WedgeSettings = merge::builder_with_defaults()?
            .add_source(File::from(path).required(true))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Self::checked(settings)
    }

    fn checked(settings: WedgeSettings) -> Result<WedgeSettings, ConfigError> {
        if let Err(errors) = settings.validate() {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(ConfigError::Settings(joined));
        }
        debug!(?settings, "Settings loaded");
        Ok(settings)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}
