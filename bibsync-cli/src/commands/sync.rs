//! One publish cycle against the configured repository.

use anyhow::{bail, Context, Result};
use bibsync_core::publish::NoChangeReason;
use bibsync_core::{Config, GitCli, HttpFetcher, Orchestrator, PublishOutcome, RepoLock};
use std::process::ExitCode;

use super::diff::print_delta;
use crate::presence::ProcessProbe;

pub struct SyncOptions {
    pub require_running: Option<String>,
    pub dry_run: bool,
}

pub fn sync(config: &Config, probe: &dyn ProcessProbe, opts: SyncOptions) -> Result<ExitCode> {
    if let Some(name) = &opts.require_running {
        let running = probe
            .is_running(name)
            .context("Failed to check running processes")?;
        if !running {
            bail!("{} is not running. Start it and try again.", name);
        }
    }

    let settings = config
        .sync_settings()
        .context("Incomplete sync configuration")?;
    let fetcher = HttpFetcher::new(&settings.api_endpoint, settings.fetch_timeout)
        .context("Failed to set up export fetcher")?;
    let vcs = GitCli::new(&settings.repo_path, &settings.remote);

    if opts.dry_run {
        let orchestrator = Orchestrator::new(&settings, fetcher, vcs);
        let delta = orchestrator.preview().context("Dry run failed")?;
        print_delta(&delta, true);
        println!("Dry run: export and repository left untouched.");
        return Ok(ExitCode::SUCCESS);
    }

    let _lock = RepoLock::acquire(&settings.repo_path)
        .context("Failed to lock repository working copy")?;

    println!("Pulling latest changes from remote...");
    let mut orchestrator = Orchestrator::new(&settings, fetcher, vcs);
    let outcome = orchestrator.run()?;
    println!("Exported library to {}", settings.export_path().display());

    match outcome {
        PublishOutcome::NoChange { delta, reason } => {
            match reason {
                NoChangeReason::NothingToPublish if !delta.removed.is_empty() => println!(
                    "No new or updated citekeys ({} removed, not published). Skipping commit.",
                    delta.removed.len()
                ),
                NoChangeReason::NothingToPublish => {
                    println!("No new or updated citekeys. Skipping commit.")
                }
                NoChangeReason::NothingStaged => {
                    println!("Export matches the repository. Skipping commit.")
                }
            }
        }
        PublishOutcome::Pushed {
            delta,
            push_attempts,
            ..
        } => {
            print_delta(&delta, settings.publish_removals);
            println!(
                "Repository successfully updated ({} push attempt{}).",
                push_attempts,
                if push_attempts == 1 { "" } else { "s" }
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
