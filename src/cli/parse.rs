//! CLI parse: clap types for wedge. No behavior; definitions only.

use clap::Parser;
use std::path::PathBuf;

/// Wedge CLI - parameter sweeps against a ComfyUI-compatible server
#[derive(Parser, Debug)]
#[command(name = "wedge")]
#[command(about = "Expand parameter wedges and submit one job per combination to ComfyUI")]
pub struct Cli {
    /// Base workflow (ComfyUI API-format JSON)
    #[arg(long)]
    pub workflow: PathBuf,

    /// Wedge config JSON (tried as given, then relative to the workflow directory)
    #[arg(long, conflicts_with = "config_stdin")]
    pub config: Option<PathBuf>,

    /// Read the wedge config JSON from stdin
    #[arg(long)]
    pub config_stdin: bool,

    /// Tool settings file (TOML); replaces the global and workflow-adjacent settings
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Preferred title of the output node (default from settings: OUT_image)
    #[arg(long)]
    pub output_node: Option<String>,

    /// Submit at most this many combinations
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub limit: Option<u64>,

    /// List the jobs that would run without submitting anything
    #[arg(long)]
    pub dry_run: bool,

    /// Print each combination before submitting
    #[arg(long)]
    pub print_combinations: bool,

    /// Watch each job until it finishes instead of trusting the acknowledgment
    #[arg(long)]
    pub stream: bool,

    /// Exit non-zero when any job failed or timed out
    #[arg(long)]
    pub strict: bool,

    /// Ask for confirmation before submitting
    #[arg(long, conflicts_with = "no_confirm")]
    pub confirm: bool,

    /// Never ask for confirmation
    #[arg(long)]
    pub no_confirm: bool,

    /// Seconds to wait for a streamed job before marking it timed out
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_secs: Option<u64>,

    /// Extra submission attempts per job
    #[arg(long)]
    pub retries: Option<u32>,

    /// Skip combinations that do not resolve against the workflow instead of aborting
    #[arg(long)]
    pub skip_unresolved: bool,

    /// Stop the run at the first failed job
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Print the resolved settings as TOML and exit
    #[arg(long)]
    pub show_settings: bool,

    /// Output format for the run summary (text or json)
    #[arg(long, default_value = "text", value_parser = ["text", "json"])]
    pub format: String,

    /// Enable verbose logging and the per-job table
    #[arg(long, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Disable logging
    #[arg(long)]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn workflow_dir(&self) -> Option<&std::path::Path> {
        match self.workflow.parent() {
            Some(dir) if dir.as_os_str().is_empty() => Some(std::path::Path::new(".")),
            other => other,
        }
    }
}
