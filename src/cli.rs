//! CLI domain: parse, route, output, and presentation only.
//! Sweep semantics live in the orchestrator; the CLI wires inputs to it.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::Cli;
pub use presentation::{
    confirmation_prompt, format_combinations, format_dry_run_json, format_dry_run_text,
    format_progress_event, format_report_json, format_report_text,
};
pub use route::{load_settings, run_options, RunContext, RunOutcome};
