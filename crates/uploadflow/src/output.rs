//! Terminal output for progress and the final report

use crate::OutputFormat;
use colored::Colorize;
use uploadflow_cloud::{ActionType, RunReport, RunStatus, StepRecord, StepStatus};

fn step_line(record: &StepRecord) -> String {
    let label = format!("{} {}", record.action, record.kind);
    match &record.status {
        StepStatus::Succeeded { outcome } if *outcome == ActionType::NoOp => {
            format!("  - {}: {}", label, outcome.to_string().dimmed())
        }
        StepStatus::Succeeded { outcome } => {
            format!("  ✓ {}: {}", label, outcome.to_string().green())
        }
        StepStatus::Failed(failure) => format!(
            "  ✗ {}: {} {}",
            label,
            failure.kind.to_string().red().bold(),
            failure.message
        ),
        StepStatus::Skipped => format!("  ⊘ {}: {}", label, "skipped".yellow()),
    }
}

/// One line per finished step, in plan order
pub fn print_step(record: &StepRecord) {
    println!("{}", step_line(record));
}

pub fn print_report(report: &RunReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        OutputFormat::Text => {
            println!();
            let status = match report.status {
                RunStatus::Complete => report.status.to_string().green().bold(),
                RunStatus::Failed => report.status.to_string().red().bold(),
            };
            println!(
                "{} {} ({} change(s), {} ms)",
                report.operation.to_string().to_uppercase().bold(),
                status,
                report.mutations(),
                report.duration_ms
            );
            if let Some(application) = &report.application {
                println!("  function: {}", application.arn.cyan());
            }
            for failed in report.failures() {
                println!("  {}", failed.to_string().red());
            }
        }
    }
    Ok(())
}
