//! Per-issue timeline and comment totals, folded a page at a time.

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, GithubApi, MalformedPagination};
use crate::gql::{flatten_nodes, TotalCount};
use crate::pagination::{Page, PageInfo};

pub const OPERATION: &str = "RepoIssues";

pub const QUERY: &str = "
query RepoIssues($org: String!, $repo: String!, $pageSize: Int!, $cursor: String) {
  repository(owner: $org, name: $repo) {
    issues(first: $pageSize, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes {
        timelineItems { totalCount }
        comments { totalCount }
      }
    }
  }
}
";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables<'a> {
    pub org: &'a str,
    pub repo: &'a str,
    pub page_size: i64,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseData {
    pub repository: Option<Repository>,
}

#[derive(Debug, Deserialize)]
pub struct Repository {
    pub issues: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub page_info: Option<PageInfo>,
    pub nodes: Option<Vec<Option<Issue>>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub timeline_items: Option<TotalCount>,
    pub comments: Option<TotalCount>,
}

pub async fn fetch(
    api: &GithubApi,
    org: &str,
    repo: &str,
    page_size: i64,
    cursor: Option<String>,
) -> Result<Page<Issue>, ApiError> {
    let data: ResponseData = api
        .graphql(
            QUERY,
            OPERATION,
            Variables {
                org,
                repo,
                page_size,
                cursor,
            },
        )
        .await?;
    into_page(data, org, repo)
}

fn into_page(data: ResponseData, org: &str, repo: &str) -> Result<Page<Issue>, ApiError> {
    let what = format!("issues of `{}/{}`", org, repo);
    match data.repository {
        Some(repository) => {
            let connection = repository.issues;
            Page::from_connection(&what, connection.page_info, flatten_nodes(connection.nodes))
        }
        None => MalformedPagination {
            context: format!("{}: the repository is not visible to this token", what),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_issue_totals() {
        let data: ResponseData = serde_json::from_value(json!({
            "repository": {
                "issues": {
                    "pageInfo": { "hasNextPage": false, "endCursor": null },
                    "nodes": [
                        { "timelineItems": { "totalCount": 5 }, "comments": { "totalCount": 2 } },
                        null
                    ]
                }
            }
        }))
        .unwrap();
        let page = into_page(data, "acme", "api").unwrap();
        assert_eq!(page.nodes.len(), 1);
        assert_eq!(page.nodes[0].timeline_items.unwrap().total_count, 5);
        assert_eq!(page.nodes[0].comments.unwrap().total_count, 2);
    }

    #[test]
    fn missing_repository_is_an_error() {
        let data: ResponseData = serde_json::from_value(json!({ "repository": null })).unwrap();
        assert!(into_page(data, "acme", "gone").is_err());
    }
}
