//! Shared types for bibsync
//!
//! This crate provides the identifiers used across the bibsync workspace:
//! citation keys and bibliography entry types.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Citation key naming a bibliography entry (e.g. `smith2020deep`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CitationKey(pub String);

impl CitationKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CitationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CitationKey {
    fn from(key: &str) -> Self {
        CitationKey(key.to_string())
    }
}

impl From<String> for CitationKey {
    fn from(key: String) -> Self {
        CitationKey(key)
    }
}

impl Borrow<str> for CitationKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Bibliography entry type
///
/// Only the types with mandatory-field rules get their own variant; anything
/// else keeps its lowercased name in [`EntryType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Article,
    Book,
    InProceedings,
    Misc,
    Other(String),
}

impl EntryType {
    /// Parse an entry type name, case-insensitively.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "article" => EntryType::Article,
            "book" => EntryType::Book,
            "inproceedings" => EntryType::InProceedings,
            "misc" => EntryType::Misc,
            other => EntryType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntryType::Article => "article",
            EntryType::Book => "book",
            EntryType::InProceedings => "inproceedings",
            EntryType::Misc => "misc",
            EntryType::Other(name) => name,
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
