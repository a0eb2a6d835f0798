//! Citation usage extraction from LaTeX document sources.

use bibsync_types::CitationKey;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::FilesystemError;

/// Citation keys referenced by a document-source tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CitationUsage {
    keys: BTreeSet<CitationKey>,
    files_scanned: usize,
}

impl CitationUsage {
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<CitationKey>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            files_scanned: 0,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn keys(&self) -> &BTreeSet<CitationKey> {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn files_scanned(&self) -> usize {
        self.files_scanned
    }
}

/// Outcome of scanning a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageScan {
    Found(CitationUsage),
    /// No citation matched anywhere in the tree.
    NoCitations { files_scanned: usize },
}

impl UsageScan {
    /// The usage set to filter by, or `None` to check everything.
    pub fn into_filter(self) -> Option<CitationUsage> {
        match self {
            UsageScan::Found(usage) => Some(usage),
            UsageScan::NoCitations { .. } => None,
        }
    }

    pub fn files_scanned(&self) -> usize {
        match self {
            UsageScan::Found(usage) => usage.files_scanned,
            UsageScan::NoCitations { files_scanned } => *files_scanned,
        }
    }
}

/// A scanner for one citation syntax.
pub trait CitationScanner {
    /// Add every key cited in `source` to `keys`.
    fn scan(&self, source: &str, keys: &mut BTreeSet<CitationKey>);
}

/// Scanner for LaTeX `\cite`-family macros (natbib and biblatex).
#[derive(Debug, Clone, Copy, Default)]
pub struct LatexCitationScanner;

impl CitationScanner for LatexCitationScanner {
    fn scan(&self, source: &str, keys: &mut BTreeSet<CitationKey>) {
        // Arguments may wrap across lines, so match over the whole file.
        let code = source
            .lines()
            .map(strip_comment)
            .collect::<Vec<_>>()
            .join("\n");
        for caps in CITE_RE.captures_iter(&code) {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            keys.extend(
                inner
                    .split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty() && *k != "*")
                    .map(CitationKey::from),
            );
        }
    }
}

/// Walk `root` and collect cited keys from files with one of `extensions`.
pub fn extract_usage(root: &Path, extensions: &[String]) -> Result<UsageScan, FilesystemError> {
    extract_usage_with(&LatexCitationScanner, root, extensions)
}

pub fn extract_usage_with<S: CitationScanner>(
    scanner: &S,
    root: &Path,
    extensions: &[String],
) -> Result<UsageScan, FilesystemError> {
    let meta = fs::metadata(root).map_err(|e| FilesystemError::new("read", root, e))?;
    if !meta.is_dir() {
        return Err(FilesystemError::new(
            "scan",
            root,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
        ));
    }

    let mut keys = BTreeSet::new();
    let mut files_scanned = 0;

    for entry in WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let matches_ext = entry
            .path()
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)));
        if !matches_ext {
            continue;
        }

        let bytes = fs::read(entry.path()).map_err(|e| FilesystemError::new("read", entry.path(), e))?;
        let source = String::from_utf8_lossy(&bytes);
        let before = keys.len();
        scanner.scan(&source, &mut keys);
        files_scanned += 1;
        debug!(
            path = %entry.path().display(),
            new_keys = keys.len() - before,
            "scanned document source"
        );
    }

    if keys.is_empty() {
        warn!(root = %root.display(), files_scanned, "no citations found in document sources");
        return Ok(UsageScan::NoCitations { files_scanned });
    }

    info!(root = %root.display(), files_scanned, keys = keys.len(), "collected citation usage");
    Ok(UsageScan::Found(CitationUsage {
        keys,
        files_scanned,
    }))
}

/// Drop a trailing `%` comment, keeping escaped `\%`.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    let mut idx = 0;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            b'%' => return &line[..idx],
            _ => idx += 1,
        }
    }
    line
}

static CITE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\\(?:[cC]ite|citep|citet|[tT]extcite|[pP]arencite|[aA]utocite|[fF]ootcite|citeauthor|citeyear|citealp|[sS]martcite|nocite)\*?\s*(?:\[[^\]]*\]\s*){0,2}\{([^}]*)\}",
    )
    .expect("valid citation regex")
});
