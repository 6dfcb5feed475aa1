//! Team slugs for the team-conflict report.

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, GithubApi, MalformedPagination};
use crate::gql::flatten_nodes;
use crate::pagination::{Page, PageInfo};

pub const OPERATION: &str = "OrgTeams";

pub const QUERY: &str = "
query OrgTeams($org: String!, $pageSize: Int!, $cursor: String) {
  organization(login: $org) {
    teams(first: $pageSize, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes { slug }
    }
  }
}
";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Variables<'a> {
    pub org: &'a str,
    pub page_size: i64,
    pub cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseData {
    pub organization: Option<Organization>,
}

#[derive(Debug, Deserialize)]
pub struct Organization {
    pub teams: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub page_info: Option<PageInfo>,
    pub nodes: Option<Vec<Option<Team>>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Team {
    pub slug: String,
}

pub async fn fetch(
    api: &GithubApi,
    org: &str,
    page_size: i64,
    cursor: Option<String>,
) -> Result<Page<Team>, ApiError> {
    let data: ResponseData = api
        .graphql(
            QUERY,
            OPERATION,
            Variables {
                org,
                page_size,
                cursor,
            },
        )
        .await?;
    into_page(data, org)
}

fn into_page(data: ResponseData, org: &str) -> Result<Page<Team>, ApiError> {
    let what = format!("teams of organization `{}`", org);
    match data.organization {
        Some(organization) => {
            let connection = organization.teams;
            Page::from_connection(&what, connection.page_info, flatten_nodes(connection.nodes))
        }
        None => MalformedPagination {
            context: format!("{}: the organization is not visible to this token", what),
        }
        .fail(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_team_slugs() {
        let data: ResponseData = serde_json::from_value(json!({
            "organization": {
                "teams": {
                    "pageInfo": { "hasNextPage": false, "endCursor": null },
                    "nodes": [{ "slug": "platform" }, { "slug": "security" }]
                }
            }
        }))
        .unwrap();
        let page = into_page(data, "acme").unwrap();
        let slugs: Vec<&str> = page.nodes.iter().map(|team| team.slug.as_str()).collect();
        assert_eq!(slugs, vec!["platform", "security"]);
    }
}
