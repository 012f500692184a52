use anyhow::Result;
use colored::*;
use provisioning::{ItemStatus, Outcome, StageReport};

/// Print a stage report to stdout as `json` or coloured text.
pub fn print_report(report: &StageReport, format: &str) -> Result<()> {
    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(report)?);
        }
        _ => print_report_text(report),
    }
    Ok(())
}

fn print_report_text(report: &StageReport) {
    println!("{}", format!("=== {} ===", report.stage).bold());
    println!();

    let outcome = match report.outcome {
        Outcome::Succeeded => "SUCCEEDED".green().bold(),
        Outcome::SucceededWithWarnings => "SUCCEEDED WITH WARNINGS".yellow().bold(),
        Outcome::PartiallyFailed => "PARTIALLY FAILED".red().bold(),
    };
    println!("Outcome: {}", outcome);
    println!(
        "Granted/created: {}  Already in place: {}  Failed: {}  Warnings: {}",
        report.count(ItemStatus::Succeeded),
        report.count(ItemStatus::AlreadySatisfied),
        report.count(ItemStatus::Failed),
        report.count(ItemStatus::Warning)
    );
    println!();

    println!("{}", "Results:".bold());
    println!("{}", "─".repeat(50));
    for item in &report.items {
        let icon = match item.status {
            ItemStatus::Succeeded => "✓".green(),
            ItemStatus::AlreadySatisfied => "○".white(),
            ItemStatus::Failed => "✗".red(),
            ItemStatus::Warning => "⚠".yellow(),
        };
        println!("{} {}", icon, item.label);
        if let Some(detail) = &item.detail {
            println!("  {}", detail.dimmed());
        }
    }

    if !report.verification.is_empty() {
        println!();
        println!("{}", "Verification:".bold());
        println!("{}", "─".repeat(50));
        for line in &report.verification {
            println!("  {}", line);
        }
    }

    if !report.facts.is_empty() {
        println!();
        println!("{}", "Details:".bold());
        println!("{}", "─".repeat(50));
        for fact in &report.facts {
            println!("  {}: {}", fact.name.cyan(), fact.value);
        }
    }

    if !report.manual_follow_up.is_empty() {
        println!();
        println!("{}", "Manual follow-up:".yellow().bold());
        for step in &report.manual_follow_up {
            println!("  • {}", step);
        }
    }

    if !report.next_steps.is_empty() {
        println!();
        println!("{}", "Next steps:".bold());
        for (i, step) in report.next_steps.iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }
}
