//! List the citation keys a source tree uses.

use anyhow::{Context, Result};
use bibsync_core::{extract_usage, UsageScan};
use bibsync_types::CitationKey;
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;

#[derive(Serialize)]
struct UsageSummary<'a> {
    files_scanned: usize,
    keys: Vec<&'a CitationKey>,
}

pub fn usage(dir: &Path, extensions: &[String], json: bool) -> Result<ExitCode> {
    let scan = extract_usage(dir, extensions)
        .with_context(|| format!("Failed to scan {}", dir.display()))?;

    let keys: Vec<&CitationKey> = match &scan {
        UsageScan::Found(usage) => usage.keys().iter().collect(),
        UsageScan::NoCitations { .. } => Vec::new(),
    };

    if json {
        let summary = UsageSummary {
            files_scanned: scan.files_scanned(),
            keys,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else if keys.is_empty() {
        println!(
            "No citations found in {} file(s).",
            scan.files_scanned()
        );
    } else {
        for key in &keys {
            println!("{}", key);
        }
        println!(
            "{} key(s) cited across {} file(s).",
            keys.len(),
            scan.files_scanned()
        );
    }

    Ok(ExitCode::SUCCESS)
}
