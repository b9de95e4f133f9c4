//! Merge rules: defaults, override order, conflict handling.

use config::Config;
use config::ConfigBuilder;
use config::ConfigError;

/// Create a Config builder with merge policy defaults applied.
///
/// Later sources (global file, workflow file, environment) override these.
pub fn builder_with_defaults() -> Result<ConfigBuilder<config::builder::DefaultState>, ConfigError>
{
    Config::builder()
        .set_default("transport.poll_interval_ms", 500)?
        .set_default("transport.job_timeout_secs", 600)?
        .set_default("run.save_class", "SaveImage")?
        .set_default("run.output_title", "OUT_image")?
        .set_default("limits.max_axis_values", 100_000)
}
