//! Style and completeness checks for bibliography entries.

use bibsync_types::{CitationKey, EntryType};
use serde::Serialize;
use tracing::{debug, info};

use crate::bibliography::{BibEntry, ParseWarning, Snapshot};
use crate::citations::CitationUsage;

/// Issues found on a single entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthIssue {
    pub citation_key: CitationKey,
    pub issues: Vec<String>,
}

/// Aggregated result of checking a snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthReport {
    pub issues: Vec<HealthIssue>,
    pub entries_checked: usize,
    pub entries_with_issues: usize,
    /// Structural problems carried over from parsing.
    pub structural: Vec<ParseWarning>,
    /// Keys cited in the sources but absent from the snapshot.
    pub missing_citations: Vec<CitationKey>,
}

impl HealthReport {
    pub fn with_parse_warnings(mut self, warnings: Vec<ParseWarning>) -> Self {
        self.structural.extend(warnings);
        self
    }

    /// True when no entry has issues and the input parsed cleanly.
    pub fn is_success(&self) -> bool {
        self.issues.is_empty() && self.structural.is_empty()
    }
}

fn mandatory_fields(entry_type: &EntryType) -> &'static [&'static str] {
    match entry_type {
        EntryType::Article => &["author", "year", "title", "journal"],
        EntryType::Book => &["author", "year", "title", "publisher"],
        EntryType::InProceedings => &["author", "year", "title", "booktitle"],
        EntryType::Misc => &["author", "year", "title"],
        EntryType::Other(_) => &[],
    }
}

/// Optional relaxations of the rules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Accept a title whose period sits inside trailing protective braces,
    /// as in `{{The {TeX}book.}}`.
    pub period_inside_braces: bool,
}

/// Run every rule against one entry, in order.
pub fn check(entry: &BibEntry) -> Vec<String> {
    check_with(entry, CheckOptions::default())
}

pub fn check_with(entry: &BibEntry, options: CheckOptions) -> Vec<String> {
    let mut issues = Vec::new();

    for field in mandatory_fields(entry.entry_type()) {
        if !entry.has_field(field) {
            issues.push(format!("Missing mandatory field: {}", field));
        }
    }

    if let Some(title) = entry.field("title").filter(|t| !t.is_empty()) {
        if title
            .chars()
            .find(|c| c.is_alphabetic())
            .is_some_and(|c| c.is_ascii_lowercase())
        {
            issues.push("First word of title should be capitalized".to_string());
        }
        let ending = if options.period_inside_braces {
            title.trim_end().trim_end_matches('}').trim_end()
        } else {
            title
        };
        if !ending.ends_with('.') {
            issues.push("Title should end with a period (.)".to_string());
        }
    }

    if let Some(authors) = entry.field("author") {
        if !authors.split(" and ").all(|a| a.contains(',')) {
            issues.push(
                "Author names likely not formatted correctly (surname first, initials after comma)"
                    .to_string(),
            );
        }
    }

    if *entry.entry_type() == EntryType::Article && !entry.has_field("doi") {
        issues.push("Missing DOI for article entry (recommended)".to_string());
    }

    issues
}

/// Check every entry of `snapshot`, or only the cited ones when `usage` is given.
pub fn run(snapshot: &Snapshot, usage: Option<&CitationUsage>) -> HealthReport {
    run_with(snapshot, usage, CheckOptions::default())
}

pub fn run_with(
    snapshot: &Snapshot,
    usage: Option<&CitationUsage>,
    options: CheckOptions,
) -> HealthReport {
    let mut report = HealthReport::default();

    for entry in snapshot.iter() {
        if usage.is_some_and(|u| !u.contains(entry.key().as_str())) {
            continue;
        }
        report.entries_checked += 1;

        let issues = check_with(entry, options);
        if !issues.is_empty() {
            debug!(key = %entry.key(), count = issues.len(), "entry has issues");
            report.issues.push(HealthIssue {
                citation_key: entry.key().clone(),
                issues,
            });
        }
    }

    if let Some(usage) = usage {
        report.missing_citations = usage
            .keys()
            .iter()
            .filter(|k| !snapshot.contains(k.as_str()))
            .cloned()
            .collect();
    }

    report.entries_with_issues = report.issues.len();
    info!(
        checked = report.entries_checked,
        with_issues = report.entries_with_issues,
        "bibliography health check complete"
    );
    report
}
