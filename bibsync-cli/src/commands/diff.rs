//! Compare two exports by citation key.

use anyhow::{Context, Result};
use bibsync_core::{compare_with, Config, Delta, Equality, Snapshot};
use bibsync_types::CitationKey;
use std::path::Path;
use std::process::ExitCode;

pub fn diff(config: &Config, old: &Path, new: &Path, semantic: bool, json: bool) -> Result<ExitCode> {
    let load = |path: &Path| {
        Snapshot::load(path, config.parse_mode)
            .with_context(|| format!("Failed to read {}", path.display()))
    };
    let old_snapshot = load(old)?;
    let new_snapshot = load(new)?;

    let equality = if semantic {
        Equality::Semantic
    } else {
        Equality::RawText
    };
    let delta = compare_with(&old_snapshot.snapshot, &new_snapshot.snapshot, equality);

    if json {
        println!("{}", serde_json::to_string_pretty(&delta)?);
    } else {
        print_delta(&delta, true);
        println!("{} unchanged", delta.unchanged.len());
    }

    Ok(ExitCode::SUCCESS)
}

/// Print added/updated (and optionally removed) keys.
pub(crate) fn print_delta(delta: &Delta, include_removals: bool) {
    if delta.added.is_empty() {
        println!("No new citekeys found in this update.");
    } else {
        println!("New citekeys added:");
        print_keys(delta.added.iter());
    }

    if !delta.updated.is_empty() {
        println!("Updated sources:");
        print_keys(delta.updated.keys());
    }

    if include_removals && !delta.removed.is_empty() {
        println!("Removed citekeys:");
        print_keys(delta.removed.iter());
    }
}

fn print_keys<'a>(keys: impl Iterator<Item = &'a CitationKey>) {
    for key in keys {
        println!("  - {}", key);
    }
}
