//! Check a BibTeX file and write the health report.

use anyhow::{bail, Context, Result};
use bibsync_core::report::write_report;
use bibsync_core::health::{run_with, CheckOptions};
use bibsync_core::{extract_usage, Config, Snapshot, UsageScan};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

pub struct HealthOptions {
    pub sources: Option<PathBuf>,
    pub extensions: Vec<String>,
    pub details: bool,
    pub rules: CheckOptions,
}

pub fn health(config: &Config, bib: &Path, opts: HealthOptions) -> Result<ExitCode> {
    if !bib.is_file() {
        bail!("BibTeX file '{}' does not exist.", bib.display());
    }

    let parsed = Snapshot::load(bib, config.parse_mode)
        .with_context(|| format!("Failed to parse {}", bib.display()))?;

    let usage = match &opts.sources {
        Some(dir) => {
            let scan = extract_usage(dir, &opts.extensions)
                .with_context(|| format!("Failed to scan {}", dir.display()))?;
            if let UsageScan::NoCitations { files_scanned } = &scan {
                println!(
                    "No citations found in {} source file(s); checking every entry.",
                    files_scanned
                );
            }
            scan.into_filter()
        }
        None => None,
    };

    let report =
        run_with(&parsed.snapshot, usage.as_ref(), opts.rules).with_parse_warnings(parsed.warnings);
    let report_path = config.report_path();
    write_report(&report_path, &report)?;

    println!();
    println!("=== BIB Health Report ===");
    println!("Entries checked: {}", report.entries_checked);

    for warning in &report.structural {
        println!("Structural problem: {}", warning);
    }
    for key in &report.missing_citations {
        println!("Cited but not in the bibliography: {}", key);
    }

    if report.is_success() {
        println!("No issues found. Your library looks healthy!");
        println!();
        return Ok(ExitCode::SUCCESS);
    }

    println!("Entries with issues: {}", report.entries_with_issues);
    for issue in &report.issues {
        println!(" - {}: {} issue(s)", issue.citation_key, issue.issues.len());
        if opts.details {
            for message in &issue.issues {
                println!("     * {}", message);
            }
        }
    }
    println!("Detailed report written to '{}'", report_path.display());
    println!();

    Ok(ExitCode::from(1))
}
