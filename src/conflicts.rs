//! Cross-organization name-conflict tracking for migration planning.
//!
//! Two independent registries are kept per run, one over repository names
//! and one over team slugs. A name becomes reportable once it has been
//! contributed more than once, whoever the contributors were.

use std::collections::HashMap;

use serde::Serialize;

/// One tracked name with every organization that contributed it, in
/// recording order. Contributors are not de-duplicated: the same
/// organization appearing twice is still a migration conflict.
#[derive(Clone, Debug, PartialEq)]
pub struct ConflictEntry {
    pub name: String,
    pub contributors: Vec<String>,
}

impl ConflictEntry {
    pub fn count(&self) -> usize {
        self.contributors.len()
    }
}

/// Registry of name to contributing organizations, kept in first-seen
/// order so reports are stable across runs with the same input order.
#[derive(Debug, Default)]
pub struct ConflictTracker {
    index: HashMap<String, usize>,
    entries: Vec<ConflictEntry>,
}

impl ConflictTracker {
    pub fn new() -> ConflictTracker {
        ConflictTracker::default()
    }

    /// Records one occurrence of `name` contributed by `source_org`.
    pub fn record(&mut self, name: &str, source_org: &str) {
        match self.index.get(name) {
            Some(&position) => self.entries[position]
                .contributors
                .push(source_org.to_string()),
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push(ConflictEntry {
                    name: name.to_string(),
                    contributors: vec![source_org.to_string()],
                });
            }
        }
    }

    /// Entries with more than one contribution, in first-seen order.
    pub fn conflicts(&self) -> Vec<&ConflictEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.count() > 1)
            .collect()
    }

    /// The reportable entries as CSV rows.
    pub fn rows(&self) -> Vec<ConflictRow> {
        self.conflicts().into_iter().map(ConflictRow::from).collect()
    }
}

/// One row of a conflict report. The field renames produce the report
/// header `conflict qty,name,org names`.
#[derive(Debug, PartialEq, Serialize)]
pub struct ConflictRow {
    #[serde(rename = "conflict qty")]
    pub qty: usize,
    pub name: String,
    #[serde(rename = "org names")]
    pub org_names: String,
}

impl From<&ConflictEntry> for ConflictRow {
    fn from(entry: &ConflictEntry) -> ConflictRow {
        ConflictRow {
            qty: entry.count(),
            name: entry.name.clone(),
            org_names: entry.contributors.join(" "),
        }
    }
}
