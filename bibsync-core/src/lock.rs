//! Exclusive ownership of a repository working copy for one sync run.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum LockError {
    #[error("Repository not found: {0:?}")]
    RepoNotFound(PathBuf),

    #[error("Another bibsync run holds {0:?}")]
    AlreadyRunning(PathBuf),

    #[error("Failed to acquire lockfile: {0}")]
    Acquire(#[from] std::io::Error),
}

/// Advisory lock held for the lifetime of this value.
///
/// The lock lives in `.git/` when the repository has one, so it never shows
/// up as an untracked file.
#[derive(Debug)]
pub struct RepoLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl RepoLock {
    pub fn acquire(repo: &Path) -> Result<Self, LockError> {
        if !repo.is_dir() {
            return Err(LockError::RepoNotFound(repo.to_path_buf()));
        }

        let git_dir = repo.join(".git");
        let path = if git_dir.is_dir() {
            git_dir.join("bibsync.lock")
        } else {
            repo.join(".bibsync.lock")
        };
        debug!(?path, "acquiring lockfile");

        let mut file = File::create(&path)?;
        file.try_lock_exclusive().map_err(|e| {
            if e.kind() == std::io::ErrorKind::WouldBlock {
                LockError::AlreadyRunning(path.clone())
            } else {
                LockError::Acquire(e)
            }
        })?;

        writeln!(file, "{}", std::process::id())?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RepoLock {
    fn drop(&mut self) {
        // The lock itself is released when the file handle closes.
        if let Err(e) = fs::remove_file(&self.path) {
            debug!(path = ?self.path, error = %e, "failed to remove lockfile");
        }
    }
}
