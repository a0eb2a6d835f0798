//! The publish cycle: fetch, diff, commit, rebase, push.
//!
//! One [`Orchestrator::run`] moves through
//! `Start → Fetched → Diffed → (NoChange | Committing → Rebased → Pushed)`,
//! ending in `Failed` on the first unrecoverable error. The only retry is a
//! rejected push, which goes back to the rebase step a bounded number of
//! times. Remote operations run with credentials injected into the remote URL
//! only for their duration.
//!
//! A cycle that fails after writing the export puts the working copy back:
//! the local commit is undone, the export is unstaged and the previous export
//! is restored, so the next run sees the same delta again.
//!
//! The orchestrator assumes it owns the working copy; callers serialize runs
//! (see [`crate::lock::RepoLock`]).

use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::bibliography::{ParseOutcome, Snapshot};
use crate::config::SyncSettings;
use crate::delta::{compare, Delta};
use crate::error::{FilesystemError, SyncError};
use crate::fetch::ExportFetcher;
use crate::vcs::{has_staged_change, with_credentials, VersionControl, VersionControlError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishState {
    Start,
    Fetched,
    Diffed,
    NoChange,
    Committing,
    Rebased,
    Pushed,
    Failed,
}

impl PublishState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishState::Start => "start",
            PublishState::Fetched => "fetched",
            PublishState::Diffed => "diffed",
            PublishState::NoChange => "no_change",
            PublishState::Committing => "committing",
            PublishState::Rebased => "rebased",
            PublishState::Pushed => "pushed",
            PublishState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PublishState::NoChange | PublishState::Pushed | PublishState::Failed
        )
    }
}

impl fmt::Display for PublishState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoChangeReason {
    /// The delta had nothing to publish.
    NothingToPublish,
    /// The delta was non-empty but staging produced no change.
    NothingStaged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    NoChange {
        delta: Delta,
        reason: NoChangeReason,
    },
    Pushed {
        delta: Delta,
        commit_message: String,
        push_attempts: u32,
    },
}

impl PublishOutcome {
    pub fn state(&self) -> PublishState {
        match self {
            PublishOutcome::NoChange { .. } => PublishState::NoChange,
            PublishOutcome::Pushed { .. } => PublishState::Pushed,
        }
    }

    pub fn delta(&self) -> &Delta {
        match self {
            PublishOutcome::NoChange { delta, .. } | PublishOutcome::Pushed { delta, .. } => delta,
        }
    }
}

/// A cycle that ended in [`PublishState::Failed`].
#[derive(Error, Debug)]
#[error("publish failed in state {failed_in}: {source}")]
pub struct PublishError {
    /// The state the cycle was in when the error occurred.
    pub failed_in: PublishState,
    #[source]
    pub source: SyncError,
}

/// How the previous export was kept aside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Backup {
    /// The previous export was moved to the backup path.
    Moved,
    /// There was no previous export; the backup is an empty placeholder.
    Placeholder,
}

/// Working-copy changes made by the current cycle.
#[derive(Debug, Default)]
struct Progress {
    backup: Option<Backup>,
    staged: bool,
    committed: bool,
}

pub struct Orchestrator<'a, F, V> {
    settings: &'a SyncSettings,
    fetcher: F,
    vcs: V,
    state: PublishState,
    trace: Vec<PublishState>,
    progress: Progress,
}

impl<'a, F, V> Orchestrator<'a, F, V>
where
    F: ExportFetcher,
    V: VersionControl,
{
    pub fn new(settings: &'a SyncSettings, fetcher: F, vcs: V) -> Self {
        Self {
            settings,
            fetcher,
            vcs,
            state: PublishState::Start,
            trace: vec![PublishState::Start],
            progress: Progress::default(),
        }
    }

    pub fn state(&self) -> PublishState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn trace(&self) -> &[PublishState] {
        &self.trace
    }

    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Run one publish cycle to a terminal state.
    pub fn run(&mut self) -> Result<PublishOutcome, PublishError> {
        match self.cycle() {
            Ok(outcome) => Ok(outcome),
            Err(source) => {
                let failed_in = self.state;
                error!(state = %failed_in, error = %source, "publish cycle failed");
                self.roll_back();
                self.transition(PublishState::Failed);
                Err(PublishError { failed_in, source })
            }
        }
    }

    /// Fetch and diff against the current export without touching the
    /// working copy.
    pub fn preview(&self) -> Result<Delta, SyncError> {
        let bytes = self.fetcher.fetch()?;
        let export = self.settings.export_path();
        let old = if export.exists() {
            Snapshot::load(&export, self.settings.parse_mode)?
        } else {
            ParseOutcome::default()
        };
        let new = Snapshot::parse(&String::from_utf8_lossy(&bytes), self.settings.parse_mode)?;
        Ok(compare(&old.snapshot, &new.snapshot))
    }

    fn transition(&mut self, next: PublishState) {
        info!(from = %self.state, to = %next, "publish state");
        self.state = next;
        self.trace.push(next);
    }

    fn cycle(&mut self) -> Result<PublishOutcome, SyncError> {
        let settings = self.settings;
        let credentials = settings.credentials.as_ref();

        info!(repo = %settings.repo_path.display(), "pulling latest changes from remote");
        with_credentials(&self.vcs, credentials, |v| v.pull())?;

        let bytes = self.fetcher.fetch()?;
        let backup = replace_export(&settings.export_path(), &settings.backup_path(), &bytes)?;
        self.progress.backup = Some(backup);
        self.transition(PublishState::Fetched);

        let old = load_logged(&settings.backup_path(), settings)?;
        let new = load_logged(&settings.export_path(), settings)?;
        let delta = compare(&old, &new);
        self.transition(PublishState::Diffed);
        info!(
            added = delta.added.len(),
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            unchanged = delta.unchanged.len(),
            "computed bibliography delta"
        );

        if !delta.has_publishable_changes(settings.publish_removals) {
            self.transition(PublishState::NoChange);
            return Ok(PublishOutcome::NoChange {
                delta,
                reason: NoChangeReason::NothingToPublish,
            });
        }

        self.transition(PublishState::Committing);
        let export_rel = Path::new(&settings.export_filename);
        self.progress.staged = true;
        self.vcs.add(export_rel)?;
        if !has_staged_change(&self.vcs.status_porcelain(export_rel)?) {
            warn!("export matches the repository after staging; skipping commit");
            self.transition(PublishState::NoChange);
            return Ok(PublishOutcome::NoChange {
                delta,
                reason: NoChangeReason::NothingStaged,
            });
        }

        let commit_message = delta.commit_message(settings.publish_removals);
        self.vcs.commit(&commit_message)?;
        self.progress.committed = true;

        let mut push_attempts = 0;
        loop {
            push_attempts += 1;
            self.rebase()?;
            self.transition(PublishState::Rebased);

            match with_credentials(&self.vcs, credentials, |v| v.push()) {
                Ok(()) => break,
                Err(VersionControlError::PushRejected { .. })
                    if push_attempts < settings.max_push_attempts =>
                {
                    warn!(
                        attempt = push_attempts,
                        max = settings.max_push_attempts,
                        "push rejected; rebasing onto the new remote history"
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }

        self.transition(PublishState::Pushed);
        Ok(PublishOutcome::Pushed {
            delta,
            commit_message,
            push_attempts,
        })
    }

    /// Undo the working-copy changes of a failed cycle. Problems are logged;
    /// the original error is what gets reported.
    fn roll_back(&mut self) {
        let progress = std::mem::take(&mut self.progress);
        let export_rel = Path::new(&self.settings.export_filename);

        if progress.committed {
            if let Err(err) = self.vcs.undo_commit() {
                warn!(error = %err, "failed to undo the local commit");
            }
        }
        if progress.staged {
            if let Err(err) = self.vcs.unstage(export_rel) {
                warn!(error = %err, "failed to unstage the export");
            }
        }
        if let Some(backup) = progress.backup {
            let export = self.settings.export_path();
            match restore_export(&export, &self.settings.backup_path(), backup) {
                Ok(()) => info!(path = %export.display(), "restored previous export"),
                Err(err) => warn!(error = %err, "failed to restore previous export"),
            }
        }
    }

    fn rebase(&self) -> Result<(), VersionControlError> {
        let credentials = self.settings.credentials.as_ref();
        if let Err(err) = with_credentials(&self.vcs, credentials, |v| v.pull_rebase()) {
            if let Err(abort) = self.vcs.abort_rebase() {
                warn!(error = %abort, "rebase --abort failed");
            }
            return Err(err);
        }
        Ok(())
    }
}

fn load_logged(path: &Path, settings: &SyncSettings) -> Result<Snapshot, SyncError> {
    let outcome = Snapshot::load(path, settings.parse_mode)?;
    for warning in &outcome.warnings {
        warn!(path = %path.display(), "{}", warning);
    }
    Ok(outcome.snapshot)
}

/// Move the current export aside as `backup` and write `bytes` in its place.
fn replace_export(export: &Path, backup: &Path, bytes: &[u8]) -> Result<Backup, FilesystemError> {
    let kind = if export.exists() {
        fs::rename(export, backup).map_err(|e| FilesystemError::new("back up", export, e))?;
        Backup::Moved
    } else {
        fs::write(backup, b"").map_err(|e| FilesystemError::new("write", backup, e))?;
        Backup::Placeholder
    };

    if let Err(e) = fs::write(export, bytes) {
        if let Err(err) = restore_export(export, backup, kind) {
            warn!(error = %err, "failed to restore previous export");
        }
        return Err(FilesystemError::new("write", export, e));
    }
    Ok(kind)
}

/// Put the working copy's export back the way it was before `replace_export`.
fn restore_export(export: &Path, backup: &Path, kind: Backup) -> Result<(), FilesystemError> {
    match kind {
        Backup::Moved => {
            fs::rename(backup, export).map_err(|e| FilesystemError::new("restore", export, e))
        }
        Backup::Placeholder => {
            if export.exists() {
                fs::remove_file(export).map_err(|e| FilesystemError::new("remove", export, e))?;
            }
            fs::remove_file(backup).map_err(|e| FilesystemError::new("remove", backup, e))
        }
    }
}
