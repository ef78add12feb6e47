//! Output rendering for run reports.
//!
//! Supports `human` (default) and `json` outputs. The JSON form includes
//! the resolved labels, the full plan, and a top-level summary.

use owo_colors::OwoColorize;
use serde_json::json;
use serde_json::Value as JsonVal;

use crate::sync::RunReport;

fn use_colors(output: &str) -> bool {
    output != "json" && std::env::var_os("NO_COLOR").is_none()
}

/// Print a run report in the requested format.
pub fn print_report(report: &RunReport, output: &str, executed: bool) {
    match output {
        "json" => println!(
            "{}",
            serde_json::to_string_pretty(&compose_report_json(report, executed)).unwrap()
        ),
        _ => print_human(report, output, executed),
    }
}

fn print_human(report: &RunReport, output: &str, executed: bool) {
    let color = use_colors(output);

    for label in &report.labels {
        let desc = label.description.as_deref().unwrap_or("");
        if color {
            println!(
                "{} {} {} {}",
                "◆".blue(),
                label.name.clone().bold(),
                format!("#{}", label.color).bright_black(),
                desc
            );
        } else {
            println!("◆ {} #{} {}", label.name, label.color, desc);
        }
    }

    let verb = if executed { "applied" } else { "planned" };
    for op in &report.plan {
        if color {
            println!("{} {}", format!("{verb}:").green().bold(), op.describe());
        } else {
            println!("{verb}: {}", op.describe());
        }
    }

    for warning in &report.warnings {
        if color {
            println!("{} {}", "▲ warn:".yellow().bold(), warning);
        } else {
            println!("▲ warn: {warning}");
        }
    }
    for failure in &report.failed_targets {
        if color {
            println!(
                "{} {}: {}",
                "✖ target failed:".red().bold(),
                failure.target,
                failure.error
            );
        } else {
            println!("✖ target failed: {}: {}", failure.target, failure.error);
        }
    }
    for failure in &report.failed_ops {
        if color {
            println!(
                "{} {}: {}",
                "✖ op failed:".red().bold(),
                failure.op.describe(),
                failure.error
            );
        } else {
            println!("✖ op failed: {}: {}", failure.op.describe(), failure.error);
        }
    }

    let summary = format!(
        "— Summary — labels={} ops={} executed={} failed_ops={} failed_targets={} warnings={}",
        report.labels.len(),
        report.plan.len(),
        report.executed,
        report.failed_ops.len(),
        report.failed_targets.len(),
        report.warnings.len()
    );
    if color {
        println!("{}", summary.bold());
    } else {
        println!("{summary}");
    }
}

/// Compose the report JSON object (pure) for testing/snapshot purposes.
pub fn compose_report_json(report: &RunReport, executed: bool) -> JsonVal {
    let ops: Vec<JsonVal> = report
        .plan
        .iter()
        .map(|op| serde_json::to_value(op).unwrap())
        .collect();
    json!({
        "labels": report.labels,
        "plan": ops,
        "failed_ops": report.failed_ops,
        "failed_targets": report.failed_targets,
        "warnings": report.warnings,
        "summary": {
            "labels": report.labels.len(),
            "ops": report.plan.len(),
            "executed": if executed { report.executed } else { 0 },
            "failed_ops": report.failed_ops.len(),
            "failed_targets": report.failed_targets.len(),
            "warnings": report.warnings.len(),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::label::{LabelSpec, PlanOp};

    #[test]
    fn test_compose_report_json_shape() {
        let mut report = RunReport::default();
        report.labels.push(LabelSpec {
            name: "bug".into(),
            color: "d73a4a".into(),
            description: None,
        });
        report.plan.push(PlanOp::AssignLabel {
            number: 7,
            name: "bug".into(),
        });
        report.executed = 1;
        report.warnings.push("something minor".into());

        let out = compose_report_json(&report, true);
        assert_eq!(out["summary"]["labels"], 1);
        assert_eq!(out["summary"]["executed"], 1);
        assert_eq!(out["plan"][0]["op"], "assign_label");
        assert_eq!(out["labels"][0]["name"], "bug");
        assert_eq!(out["warnings"][0], "something minor");

        // Generate runs report zero executed regardless of plan size.
        let preview = compose_report_json(&report, false);
        assert_eq!(preview["summary"]["executed"], 0);
    }
}
