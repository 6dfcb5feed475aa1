//! Review-comment totals for one pull request.

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, GithubApi, MalformedPagination};
use crate::gql::{flatten_nodes, TotalCount};
use crate::pagination::{Page, PageInfo};

pub const OPERATION: &str = "PullReviews";

pub const QUERY: &str = "
query PullReviews($org: String!, $repo: String!, $number: Int!, $pageSize: Int!, $cursor: String) {
  repository(owner: $org, name: $repo) {
    pullRequest(number: $number) {
      reviews(first: $pageSize, after: $cursor) {
        pageInfo { hasNextPage endCursor }
        nodes {
          comments { totalCount }
        }
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
    pub number: i64,
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
    pub pull_request: Option<Pull>,
}

#[derive(Debug, Deserialize)]
pub struct Pull {
    pub reviews: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub page_info: Option<PageInfo>,
    pub nodes: Option<Vec<Option<Review>>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Review {
    pub comments: Option<TotalCount>,
}

pub async fn fetch(
    api: &GithubApi,
    org: &str,
    repo: &str,
    number: i64,
    page_size: i64,
    cursor: Option<String>,
) -> Result<Page<Review>, ApiError> {
    let data: ResponseData = api
        .graphql(
            QUERY,
            OPERATION,
            Variables {
                org,
                repo,
                number,
                page_size,
                cursor,
            },
        )
        .await?;
    into_page(data, org, repo, number)
}

fn into_page(
    data: ResponseData,
    org: &str,
    repo: &str,
    number: i64,
) -> Result<Page<Review>, ApiError> {
    let what = format!("reviews of `{}/{}#{}`", org, repo, number);
    let pull = data
        .repository
        .and_then(|repository| repository.pull_request);
    match pull {
        Some(pull) => {
            let connection = pull.reviews;
            Page::from_connection(&what, connection.page_info, flatten_nodes(connection.nodes))
        }
        None => MalformedPagination {
            context: format!("{}: the pull request is not visible to this token", what),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_review_comment_totals() {
        let data: ResponseData = serde_json::from_value(json!({
            "repository": {
                "pullRequest": {
                    "reviews": {
                        "pageInfo": { "hasNextPage": false, "endCursor": null },
                        "nodes": [
                            { "comments": { "totalCount": 6 } },
                            { "comments": null }
                        ]
                    }
                }
            }
        }))
        .unwrap();
        let page = into_page(data, "acme", "api", 17).unwrap();
        assert_eq!(page.nodes.len(), 2);
        assert_eq!(page.nodes[0].comments.unwrap().total_count, 6);
        assert!(page.nodes[1].comments.is_none());
    }

    #[test]
    fn vanished_pull_request_is_an_error() {
        let data: ResponseData =
            serde_json::from_value(json!({ "repository": { "pullRequest": null } })).unwrap();
        let err = into_page(data, "acme", "api", 404).unwrap_err();
        assert!(err.to_string().contains("#404"));
    }
}
