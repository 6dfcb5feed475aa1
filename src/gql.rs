//! Typed GraphQL documents and their response shapes.
//!
//! Each submodule carries one static query document, a `Variables` struct
//! bound to it, and the response types it deserializes into. Values are
//! always passed as GraphQL variables; nothing is spliced into query text.

pub mod org_repos;
pub mod org_teams;
pub mod pull_reviews;
pub mod repo_issues;
pub mod repo_pulls;

use serde::Deserialize;

/// A bare `{ totalCount }` selection.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalCount {
    pub total_count: i64,
}

/// Folds an optional count field to a number. Connections the token is not
/// allowed to see come back null and count as zero.
pub fn total(field: &Option<TotalCount>) -> i64 {
    field.as_ref().map(|count| count.total_count).unwrap_or(0)
}

/// GraphQL lists are doubly optional, the list itself and each element;
/// flatten down to the nodes that are actually present.
pub fn flatten_nodes<T>(nodes: Option<Vec<Option<T>>>) -> Vec<T> {
    nodes.unwrap_or_default().into_iter().flatten().collect()
}
