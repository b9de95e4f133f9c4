//! CLI route: run context. Loads inputs once, then either answers locally
//! (dry run, listing, declined confirmation) or drives the orchestrator.

use crate::cli::parse::Cli;
use crate::cli::presentation::{
    confirmation_prompt, format_combinations, format_dry_run_json, format_dry_run_text,
    format_progress_event, format_report_json, format_report_text,
};
use crate::config::{ConfigLoader, WedgeConfig, WedgeSettings};
use crate::error::{ConfigError, WedgeError};
use crate::orchestrator::{Orchestrator, ResolutionPolicy, RunOptions, Sweep};
use crate::progress::ProgressBus;
use crate::transport::ComfyClient;
use crate::workflow::WorkflowGraph;
use std::io::Read;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What the binary prints to stdout and the code it exits with.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub output: String,
    pub exit_code: i32,
}

impl RunOutcome {
    fn done(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: 0,
        }
    }
}

/// Settings for an invocation: `--settings` alone, or the layered sources
/// around the workflow.
pub fn load_settings(cli: &Cli) -> Result<WedgeSettings, ConfigError> {
    match &cli.settings {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(cli.workflow_dir()),
    }
}

/// Settings first, CLI flags on top.
pub fn run_options(cli: &Cli, settings: &WedgeSettings) -> RunOptions {
    let mut options = RunOptions::from_settings(settings);
    options.limit = cli.limit.map(|l| l as usize);
    options.stream |= cli.stream;
    options.strict |= cli.strict;
    options.stop_on_first_failure |= cli.stop_on_failure;
    if cli.skip_unresolved {
        options.resolution_policy = ResolutionPolicy::Skip;
    }
    if let Some(secs) = cli.timeout_secs {
        options.job_timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = cli.retries {
        options.retries = retries;
    }
    if let Some(title) = &cli.output_node {
        let title = title.trim();
        options.output_title = (!title.is_empty()).then(|| title.to_string());
    }
    options
}

pub struct RunContext {
    settings: WedgeSettings,
    options: RunOptions,
    sweep: Sweep,
    dry_run: bool,
    print_combinations: bool,
    confirm: bool,
    json: bool,
    verbose: bool,
    progress_lines: bool,
}

impl RunContext {
    /// Load settings, the base workflow, and the wedge config, and expand the plan.
    pub fn new(cli: &Cli) -> Result<Self, WedgeError> {
        let settings = load_settings(cli)?;
        let options = run_options(cli, &settings);

        let base = WorkflowGraph::load(&cli.workflow)?;
        let config = if cli.config_stdin {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .map_err(|source| ConfigError::Io {
                    path: "<stdin>".into(),
                    source,
                })?;
            info!("Loaded config from stdin");
            WedgeConfig::from_json_str(&raw)?
        } else {
            let path = WedgeConfig::discover(&cli.workflow, cli.config.as_deref())?;
            info!(path = %path.display(), "Loaded config file");
            WedgeConfig::load(&path)?
        };
        info!(
            "Config for output '{}': {} override(s), {} axis(es)",
            config.output_folder,
            config.overrides.len(),
            config.axes.len()
        );

        let sweep = Sweep::new(base, config, &options)?;
        Ok(Self {
            settings,
            options,
            sweep,
            dry_run: cli.dry_run,
            print_combinations: cli.print_combinations,
            confirm: cli.confirm && !cli.no_confirm,
            json: cli.format == "json",
            verbose: cli.verbose,
            progress_lines: false,
        })
    }

    /// Print per-job progress lines to stderr while the run proceeds.
    pub fn with_progress_lines(mut self, enabled: bool) -> Self {
        self.progress_lines = enabled;
        self
    }

    pub fn settings(&self) -> &WedgeSettings {
        &self.settings
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn sweep(&self) -> &Sweep {
        &self.sweep
    }

    /// Everything that happens before the first submission. Returns an
    /// outcome when the invocation ends here.
    pub fn preflight(&self) -> Result<Option<RunOutcome>, WedgeError> {
        let plan = self.sweep.plan();

        if self.dry_run {
            let jobs = self.sweep.dry_run(&self.options)?;
            let output = if self.json {
                format_dry_run_json(&jobs, plan.total())?
            } else {
                format_dry_run_text(&jobs, plan.total())
            };
            info!("Dry run complete; nothing submitted");
            return Ok(Some(RunOutcome::done(output)));
        }

        if self.print_combinations && !self.json {
            println!("{}", format_combinations(plan));
        }

        if self.confirm {
            use dialoguer::Confirm;
            let prompt = confirmation_prompt(plan.planned(), &self.sweep.config().images_dir());
            let confirmed = Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .map_err(|e| ConfigError::Settings(format!("Failed to get user input: {}", e)))?;
            if !confirmed {
                info!("Submission cancelled by user");
                return Ok(Some(RunOutcome::done("Submission cancelled.")));
            }
        }

        Ok(None)
    }

    /// Submit the sweep to the configured server.
    pub async fn submit(self, cancel: CancellationToken) -> Result<RunOutcome, WedgeError> {
        let url = self.sweep.config().base_url();
        let client = ComfyClient::new(url.clone(), &self.settings.transport)?;
        info!(url = %url, client_id = client.client_id(), "Using ComfyUI server");

        let strict = self.options.strict;
        let mut orchestrator = Orchestrator::new(client, self.sweep, self.options);

        let printer = if self.progress_lines {
            let (bus, rx) = ProgressBus::new_pair();
            orchestrator = orchestrator.with_progress(bus);
            let color = self.settings.logging.color && is_terminal();
            Some(std::thread::spawn(move || {
                for event in rx {
                    if let Some(line) = format_progress_event(&event, color) {
                        eprintln!("{}", line);
                    }
                }
            }))
        } else {
            None
        };

        let result = orchestrator.run(cancel).await;
        drop(orchestrator);
        if let Some(handle) = printer {
            if handle.join().is_err() {
                tracing::warn!("Progress printer thread panicked");
            }
        }
        let report = result?;

        let output = if self.json {
            format_report_json(&report)?
        } else {
            format_report_text(&report, self.verbose)
        };
        Ok(RunOutcome {
            output,
            exit_code: report.exit_code(strict),
        })
    }
}

fn is_terminal() -> bool {
    use std::io::IsTerminal;
    std::io::stderr().is_terminal()
}
