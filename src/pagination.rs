//! Cursor pagination over GraphQL connections.
//!
//! Every list this tool reads (repositories, issues, pull requests,
//! reviews, teams) arrives as a connection with a `pageInfo` block. The
//! walk is a plain loop around [`Pages::try_next`]: one call, one fetch,
//! no recursion, so a connection of any length costs constant memory here.

use std::future::Future;

use serde::Deserialize;

use crate::api::{ApiError, MalformedPagination};

/// The `pageInfo { hasNextPage endCursor }` selection every connection
/// query includes. Both fields are optional so that a degraded response
/// still deserializes; absence is then diagnosed by
/// [`Page::from_connection`] instead of a generic JSON error.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: Option<bool>,
    pub end_cursor: Option<String>,
}

/// One fetched page of a connection: its nodes plus where to resume.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub nodes: Vec<T>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

impl<T> Page<T> {
    /// Builds a page from a connection's parts, rejecting any response that
    /// does not say whether (and where) the connection continues. `what`
    /// names the connection for the error message, e.g. ``repositories of
    /// organization `acme` ``.
    pub fn from_connection(
        what: &str,
        page_info: Option<PageInfo>,
        nodes: Vec<T>,
    ) -> Result<Page<T>, ApiError> {
        let page_info = match page_info {
            Some(page_info) => page_info,
            None => {
                return MalformedPagination {
                    context: format!("{}: the response carries no `pageInfo`", what),
                }
                .fail()
            }
        };
        let has_next_page = match page_info.has_next_page {
            Some(flag) => flag,
            None => {
                return MalformedPagination {
                    context: format!("{}: the response carries no `hasNextPage`", what),
                }
                .fail()
            }
        };
        if has_next_page && page_info.end_cursor.is_none() {
            return MalformedPagination {
                context: format!("{}: a next page is reported without an end cursor", what),
            }
            .fail();
        }
        Ok(Page {
            nodes,
            has_next_page,
            end_cursor: page_info.end_cursor,
        })
    }
}

/// Pull-based walk over one connection. The fetch closure receives the
/// cursor to resume from (`None` for the first page) and performs exactly
/// one query, so callers can interleave page fetches of several
/// connections without holding more than one page at a time.
pub struct Pages<F> {
    fetch: F,
    cursor: Option<String>,
    exhausted: bool,
}

impl<F> Pages<F> {
    pub fn new(fetch: F) -> Pages<F> {
        Pages {
            fetch,
            cursor: None,
            exhausted: false,
        }
    }

    /// The next page, or `None` once the connection has reported its end.
    /// A failed fetch leaves the cursor in place, so retrying the call
    /// refetches the same page instead of restarting the walk. A page
    /// claiming a successor without a cursor would resume from the start
    /// and loop forever, so it is treated as malformed.
    pub async fn try_next<T, Fut>(&mut self) -> Result<Option<Page<T>>, ApiError>
    where
        F: FnMut(Option<String>) -> Fut,
        Fut: Future<Output = Result<Page<T>, ApiError>>,
    {
        if self.exhausted {
            return Ok(None);
        }
        let cursor = self.cursor.take();
        let page = match (self.fetch)(cursor.clone()).await {
            Ok(page) => page,
            Err(err) => {
                self.cursor = cursor;
                return Err(err);
            }
        };
        if page.has_next_page {
            match &page.end_cursor {
                Some(cursor) => self.cursor = Some(cursor.clone()),
                None => {
                    self.exhausted = true;
                    return MalformedPagination {
                        context: "a connection page that reports a successor without a cursor",
                    }
                    .fail();
                }
            }
        } else {
            self.exhausted = true;
        }
        Ok(Some(page))
    }
}

/// Fetches every page and concatenates the nodes. For connections expected
/// to stay small, like an organization's team list.
pub async fn accumulate_pages<T, F, Fut>(fetch: F) -> Result<Vec<T>, ApiError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<T>, ApiError>>,
{
    let mut pages = Pages::new(fetch);
    let mut nodes = Vec::new();
    while let Some(page) = pages.try_next().await? {
        nodes.extend(page.nodes);
    }
    Ok(nodes)
}
