//! Key-level classification of changes between two snapshots.

use bibsync_types::CitationKey;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;

use crate::bibliography::{BibEntry, Snapshot};

/// How two entries sharing a key are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Equality {
    /// Byte-for-byte raw text.
    #[default]
    RawText,
    /// Same entry type and same fields, ignoring whitespace runs in values.
    Semantic,
}

/// Both versions of an updated entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdatedEntry {
    pub old_raw: String,
    pub new_raw: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Delta {
    pub added: BTreeSet<CitationKey>,
    pub removed: BTreeSet<CitationKey>,
    pub updated: BTreeMap<CitationKey, UpdatedEntry>,
    pub unchanged: BTreeSet<CitationKey>,
}

impl Delta {
    /// Whether the delta warrants a commit.
    pub fn has_publishable_changes(&self, include_removals: bool) -> bool {
        !self.added.is_empty()
            || !self.updated.is_empty()
            || (include_removals && !self.removed.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        !self.has_publishable_changes(true)
    }

    /// Commit message listing the added and updated keys (and removed ones
    /// when `include_removals` is set).
    pub fn commit_message(&self, include_removals: bool) -> String {
        let mut summary = format!(
            "Sync bibliography export: {} added, {} updated",
            self.added.len(),
            self.updated.len()
        );
        if include_removals {
            let _ = write!(summary, ", {} removed", self.removed.len());
        }

        let mut message = summary;
        message.push('\n');
        push_section(&mut message, "added", self.added.iter());
        push_section(&mut message, "updated", self.updated.keys());
        if include_removals {
            push_section(&mut message, "removed", self.removed.iter());
        }
        message
    }
}

fn push_section<'a>(out: &mut String, label: &str, keys: impl Iterator<Item = &'a CitationKey>) {
    let _ = write!(out, "\n{}:\n", label);
    let mut any = false;
    for key in keys {
        let _ = writeln!(out, "  - {}", key);
        any = true;
    }
    if !any {
        out.push_str("  (none)\n");
    }
}

/// Classify keys of `old` and `new` by raw-text comparison.
pub fn compare(old: &Snapshot, new: &Snapshot) -> Delta {
    compare_with(old, new, Equality::RawText)
}

pub fn compare_with(old: &Snapshot, new: &Snapshot, equality: Equality) -> Delta {
    let mut delta = Delta::default();

    for entry in new.iter() {
        match old.get(entry.key().as_str()) {
            None => {
                delta.added.insert(entry.key().clone());
            }
            Some(previous) if same(previous, entry, equality) => {
                delta.unchanged.insert(entry.key().clone());
            }
            Some(previous) => {
                delta.updated.insert(
                    entry.key().clone(),
                    UpdatedEntry {
                        old_raw: previous.raw().to_string(),
                        new_raw: entry.raw().to_string(),
                    },
                );
            }
        }
    }

    delta.removed = old
        .keys()
        .filter(|k| !new.contains(k.as_str()))
        .cloned()
        .collect();

    delta
}

fn same(a: &BibEntry, b: &BibEntry, equality: Equality) -> bool {
    match equality {
        Equality::RawText => a.raw() == b.raw(),
        Equality::Semantic => {
            a.entry_type() == b.entry_type()
                && a.fields().len() == b.fields().len()
                && a.fields().iter().all(|(name, value)| {
                    b.field(name)
                        .is_some_and(|other| normalize_ws(value) == normalize_ws(other))
                })
        }
    }
}

fn normalize_ws(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}
