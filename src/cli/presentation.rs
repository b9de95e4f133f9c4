//! CLI presentation: text and json formatters for plans, dry runs, progress, and reports.

use crate::combination::CombinationPlan;
use crate::error::WedgeError;
use crate::orchestrator::{format_duration, Job, RunReport, RunStatus};
use crate::progress::RunEvent;
use comfy_table::{presets, Table};
use owo_colors::OwoColorize;
use serde_json::json;
use std::time::Duration;

fn to_json_string(value: &impl serde::Serialize) -> Result<String, WedgeError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| WedgeError::Workflow(format!("Failed to render JSON: {}", e)))
}

/// `[i/planned] node.param=value, ...` per planned combination.
pub fn format_combinations(plan: &CombinationPlan) -> String {
    let planned = plan.planned();
    let mut lines = vec![format!(
        "Listing {} of {} combination(s):",
        planned,
        plan.total()
    )];
    for combo in plan.iter() {
        lines.push(format!("  [{}/{}] {}", combo.index, planned, combo.describe()));
    }
    lines.join("\n")
}

pub fn format_dry_run_text(jobs: &[Job], total: usize) -> String {
    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL);
    table.set_header(vec!["#", "Combination", "Output node", "Output prefix"]);
    for job in jobs {
        table.add_row(vec![
            job.index.to_string(),
            job.combination.describe(),
            job.output_node.clone(),
            job.output_path.display().to_string(),
        ]);
    }
    format!(
        "Dry run: {} of {} combination(s), nothing submitted.\n{}",
        jobs.len(),
        total,
        table
    )
}

pub fn format_dry_run_json(jobs: &[Job], total: usize) -> Result<String, WedgeError> {
    let jobs: Vec<serde_json::Value> = jobs
        .iter()
        .map(|job| {
            json!({
                "index": job.index,
                "combination": job.combination.to_json(),
                "output_name": job.output_name,
                "output_path": job.output_path.display().to_string(),
                "output_node": job.output_node,
            })
        })
        .collect();
    to_json_string(&json!({ "total": total, "planned": jobs.len(), "jobs": jobs }))
}

/// Counts table, plus the per-job table when `verbose`.
pub fn format_report_text(report: &RunReport, verbose: bool) -> String {
    let counts = report.counts();
    let mut summary = Table::new();
    summary.load_preset(presets::UTF8_FULL);
    summary.set_header(vec!["Status", "Jobs"]);
    summary.add_row(vec!["SUCCEEDED".to_string(), counts.succeeded.to_string()]);
    summary.add_row(vec!["FAILED".to_string(), counts.failed.to_string()]);
    summary.add_row(vec!["TIMED_OUT".to_string(), counts.timed_out.to_string()]);
    summary.add_row(vec!["SKIPPED".to_string(), counts.skipped.to_string()]);
    summary.add_row(vec![
        "NOT ATTEMPTED".to_string(),
        report.not_attempted().to_string(),
    ]);

    let mut out = format!(
        "Sweep summary ({} planned of {} total)\n{}",
        report.planned, report.total, summary
    );

    if verbose && !report.results.is_empty() {
        let mut jobs = Table::new();
        jobs.load_preset(presets::UTF8_FULL);
        jobs.set_header(vec!["#", "Combination", "Status", "Elapsed", "Job id", "Detail"]);
        for r in &report.results {
            let detail = r
                .error
                .clone()
                .or_else(|| r.output.clone())
                .unwrap_or_default();
            jobs.add_row(vec![
                r.index.to_string(),
                r.combination.clone(),
                r.status.as_str().to_string(),
                format_duration(r.elapsed),
                r.job_id.clone().unwrap_or_else(|| "-".to_string()),
                detail,
            ]);
        }
        out.push('\n');
        out.push_str(&jobs.to_string());
    }

    if report.cancelled {
        out.push_str("\nRun cancelled.");
    }
    if let Some(reason) = &report.aborted {
        out.push_str(&format!("\nRun aborted: {}", reason));
    }
    out
}

pub fn format_report_json(report: &RunReport) -> Result<String, WedgeError> {
    let value = json!({
        "counts": report.counts(),
        "not_attempted": report.not_attempted(),
        "report": report,
    });
    to_json_string(&value)
}

pub fn confirmation_prompt(planned: usize, output_dir: &std::path::Path) -> String {
    let plural = if planned == 1 { "" } else { "s" };
    format!(
        "Submit {} run{} and write outputs under '{}'?",
        planned,
        plural,
        output_dir.display()
    )
}

/// One progress line per interesting event; `None` for events not worth printing.
pub fn format_progress_event(event: &RunEvent, color: bool) -> Option<String> {
    match event {
        RunEvent::JobFinished(data) => {
            let status = paint_status(&data.status, color);
            let detail = data
                .error
                .as_deref()
                .or(data.output.as_deref())
                .map(|d| format!(" ({})", d))
                .unwrap_or_default();
            Some(format!(
                "  #{} {} in {}{}",
                data.index,
                status,
                format_duration(Duration::from_millis(data.duration_ms as u64)),
                detail
            ))
        }
        RunEvent::Summary {
            counts,
            remaining,
            eta_ms,
        } if *remaining > 0 => {
            let eta = eta_ms
                .map(|ms| format_duration(Duration::from_millis(ms as u64)))
                .unwrap_or_else(|| "-".to_string());
            let line = format!(
                "  {} done, {} remaining, ETA {}",
                counts.attempted(),
                remaining,
                eta
            );
            Some(if color { line.dimmed().to_string() } else { line })
        }
        _ => None,
    }
}

fn paint_status(status: &str, color: bool) -> String {
    if !color {
        return status.to_string();
    }
    match status {
        s if s == RunStatus::Succeeded.as_str() => s.green().to_string(),
        s if s == RunStatus::Skipped.as_str() => s.yellow().to_string(),
        s => s.red().to_string(),
    }
}
