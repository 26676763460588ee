//! `migrate check`: static round-trip lint of every change unit

use anyhow::Result;
use st_core::{lint_units, Finding, Severity};

use crate::cli::GlobalArgs;
use crate::commands::common::{self, load_project, ExitCode};

/// Execute the check command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    common::verbose(
        global,
        &format!("Linting {} change units", project.units().len()),
    );

    let findings = lint_units(project.units());
    for finding in &findings {
        println!("  {} {}", marker(finding), finding);
    }

    let errors = count(&findings, Severity::Error);
    let warnings = count(&findings, Severity::Warning);
    if !findings.is_empty() {
        println!();
    }
    println!(
        "Checked {} change units: {} error(s), {} warning(s)",
        project.units().len(),
        errors,
        warnings
    );

    if errors > 0 {
        return Err(ExitCode(1).into());
    }
    Ok(())
}

fn marker(finding: &Finding) -> &'static str {
    match finding.severity {
        Severity::Error => "✗",
        Severity::Warning => "!",
        Severity::Info => "-",
    }
}

fn count(findings: &[Finding], severity: Severity) -> usize {
    findings.iter().filter(|f| f.severity == severity).count()
}
