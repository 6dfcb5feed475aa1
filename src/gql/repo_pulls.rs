//! Per-pull-request totals. The node keeps its number so review pagination
//! can drill into the pulls that actually have reviews.

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, GithubApi, MalformedPagination};
use crate::gql::{flatten_nodes, TotalCount};
use crate::pagination::{Page, PageInfo};

pub const OPERATION: &str = "RepoPulls";

pub const QUERY: &str = "
query RepoPulls($org: String!, $repo: String!, $pageSize: Int!, $cursor: String) {
  repository(owner: $org, name: $repo) {
    pullRequests(first: $pageSize, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes {
        number
        timelineItems { totalCount }
        comments { totalCount }
        commits { totalCount }
        reviews { totalCount }
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
#[serde(rename_all = "camelCase")]
pub struct Repository {
    pub pull_requests: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub page_info: Option<PageInfo>,
    pub nodes: Option<Vec<Option<Pull>>>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pull {
    pub number: i64,
    pub timeline_items: Option<TotalCount>,
    pub comments: Option<TotalCount>,
    pub commits: Option<TotalCount>,
    pub reviews: Option<TotalCount>,
}

pub async fn fetch(
    api: &GithubApi,
    org: &str,
    repo: &str,
    page_size: i64,
    cursor: Option<String>,
) -> Result<Page<Pull>, ApiError> {
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

fn into_page(data: ResponseData, org: &str, repo: &str) -> Result<Page<Pull>, ApiError> {
    let what = format!("pull requests of `{}/{}`", org, repo);
    match data.repository {
        Some(repository) => {
            let connection = repository.pull_requests;
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
    fn parses_pull_totals_and_number() {
        let data: ResponseData = serde_json::from_value(json!({
            "repository": {
                "pullRequests": {
                    "pageInfo": { "hasNextPage": false, "endCursor": null },
                    "nodes": [{
                        "number": 17,
                        "timelineItems": { "totalCount": 10 },
                        "comments": { "totalCount": 3 },
                        "commits": { "totalCount": 4 },
                        "reviews": { "totalCount": 2 }
                    }]
                }
            }
        }))
        .unwrap();
        let page = into_page(data, "acme", "api").unwrap();
        assert_eq!(page.nodes[0].number, 17);
        assert_eq!(page.nodes[0].reviews.unwrap().total_count, 2);
    }
}
