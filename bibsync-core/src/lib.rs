//! # bibsync-core
//!
//! Core library for bibsync.
//!
//! This crate parses bibliography exports into snapshots, diffs snapshots,
//! extracts citation usage from document sources, checks entry health, and
//! drives the publish cycle that mirrors an export into a git repository.

pub mod bibliography;
pub mod citations;
pub mod config;
pub mod delta;
pub mod error;
pub mod fetch;
pub mod health;
pub mod lock;
pub mod publish;
pub mod report;
pub mod vcs;

pub use bibliography::{BibEntry, BibParser, BibtexParser, ParseMode, ParseOutcome, Snapshot};
pub use citations::{extract_usage, CitationUsage, LatexCitationScanner, UsageScan};
pub use config::{Config, SyncSettings};
pub use delta::{compare, compare_with, Delta, Equality};
pub use error::{FilesystemError, SyncError};
pub use fetch::{ExportFetcher, HttpFetcher};
pub use health::{check, run, HealthIssue, HealthReport};
pub use lock::RepoLock;
pub use publish::{NoChangeReason, Orchestrator, PublishError, PublishOutcome, PublishState};
pub use vcs::{GitCli, VersionControl};
