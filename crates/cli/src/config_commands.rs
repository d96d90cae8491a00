use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use wabridge_config::{
    ConfigStatus, Severity,
    validate::{self, ValidationReport},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn handle_config(action: ConfigAction, config: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check { json } => check(config, json),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const GREEN: &str = "\x1b[32m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config: Option<&Path>, json: bool) -> Result<()> {
    let report = validate::validate(config);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    if !report.valid {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &ValidationReport) {
    if let Some(ref path) = report.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults and environment.\n");
    }

    for d in report.errors.iter().chain(&report.warnings) {
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
        };
        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!(
                "  {BOLD}{color}{}{RESET} {}: {}",
                d.severity, d.path, d.message
            );
        }
    }

    let errors = report.errors.len();
    let warnings = report.warnings.len();
    if errors + warnings > 0 {
        eprintln!();
    }

    let status = report.status();
    let color = match status {
        ConfigStatus::Healthy => GREEN,
        ConfigStatus::Degraded => YELLOW,
        ConfigStatus::Unhealthy => RED,
    };
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found. Status: {BOLD}{color}{}{RESET}", status.as_str());
    } else {
        eprintln!(
            "{errors} error(s), {warnings} warning(s). Status: {BOLD}{color}{}{RESET}",
            status.as_str()
        );
    }
}
