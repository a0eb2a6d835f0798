//! Error types shared across the sync cycle.

use std::path::PathBuf;
use thiserror::Error;

use crate::bibliography::ParseError;
use crate::fetch::FetchError;
use crate::vcs::VersionControlError;

/// A missing or unreadable input path.
#[derive(Error, Debug)]
#[error("{action} {path:?}: {source}")]
pub struct FilesystemError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl FilesystemError {
    pub fn new(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Any error that aborts a sync cycle.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("Version control failed: {0}")]
    VersionControl(#[from] VersionControlError),

    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
