//! Output helpers for the CLI

use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use netforge_provision::{ApplyReport, CheckStatus, HealthReport};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_success(message: &str) {
    println!("{} {}", "ok:".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "error:".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "warning:".yellow().bold(), message);
}

/// Summarise a delivery run for humans.
pub fn print_apply_report(report: &ApplyReport) {
    if report.dry_run {
        println!(
            "{} {} change(s) planned on {}; re-run with -x to apply",
            "dry-run:".cyan().bold(),
            report.total,
            report.device
        );
        return;
    }
    print_success(&format!(
        "{}: applied {}/{} change(s) in {} ms{}{}",
        report.device,
        report.applied,
        report.total,
        report.duration_ms,
        if report.saved { ", config saved" } else { "" },
        if report.reloaded { ", config reloaded" } else { "" },
    ));
    for warning in &report.warnings {
        print_warning(warning);
    }
}

fn status_cell(status: CheckStatus) -> String {
    match status {
        CheckStatus::Pass => "pass".green().to_string(),
        CheckStatus::Warn => "warn".yellow().to_string(),
        CheckStatus::Fail => "FAIL".red().bold().to_string(),
    }
}

/// Render a health report as a table plus its violation detail.
pub fn print_health_report(report: &HealthReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["Check", "Status", "Detail"]);
    for check in &report.checks {
        table.add_row(vec![
            check.name.clone(),
            status_cell(check.status),
            check.message.clone(),
        ]);
    }
    println!("{table}");

    for check in &report.checks {
        if check.violations.is_empty() {
            continue;
        }
        println!("\n{} violations:", check.name.bold());
        let mut detail = Table::new();
        detail
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);
        detail.set_header(vec!["Table", "Key", "Field", "Expected", "Actual"]);
        for violation in &check.violations {
            detail.add_row(vec![
                violation.table.clone(),
                violation.key.clone(),
                violation.field.clone(),
                violation.expected.clone(),
                violation.actual.clone(),
            ]);
        }
        println!("{detail}");
    }

    println!(
        "\noverall: {}",
        status_cell(report.overall)
    );
}
