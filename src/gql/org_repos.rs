//! The top-level repository listing: one organization, one page of
//! repositories, every `totalCount` the statistics row needs.

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, GithubApi, MalformedPagination};
use crate::gql::{flatten_nodes, TotalCount};
use crate::pagination::{Page, PageInfo};
use crate::platform::Platform;

pub const OPERATION: &str = "OrgRepoStats";

pub const QUERY: &str = "
query OrgRepoStats($org: String!, $pageSize: Int!, $cursor: String) {
  organization(login: $org) {
    repositories(first: $pageSize, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        diskUsage
        collaborators { totalCount }
        branchProtectionRules { totalCount }
        milestones { totalCount }
        commitComments { totalCount }
        releases { totalCount }
        projects { totalCount }
        issues { totalCount }
        pullRequests { totalCount }
      }
    }
  }
}
";

/// Same selection against the pre-2.17 Enterprise Server schema, where
/// branch protection is still called `protectedBranches`.
pub const QUERY_LEGACY: &str = "
query OrgRepoStats($org: String!, $pageSize: Int!, $cursor: String) {
  organization(login: $org) {
    repositories(first: $pageSize, after: $cursor) {
      pageInfo { hasNextPage endCursor }
      nodes {
        name
        diskUsage
        collaborators { totalCount }
        protectedBranches { totalCount }
        milestones { totalCount }
        commitComments { totalCount }
        releases { totalCount }
        projects { totalCount }
        issues { totalCount }
        pullRequests { totalCount }
      }
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
    pub repositories: Connection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub page_info: Option<PageInfo>,
    pub nodes: Option<Vec<Option<Repo>>>,
}

/// One repository node. Counts are optional because the upstream nulls out
/// connections the token may not see (collaborators in particular); an
/// absent count folds as zero. The alias lets the same struct read both the
/// current and the legacy branch-protection field.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repo {
    pub name: String,
    pub disk_usage: Option<i64>,
    pub collaborators: Option<TotalCount>,
    #[serde(alias = "protectedBranches")]
    pub branch_protection_rules: Option<TotalCount>,
    pub milestones: Option<TotalCount>,
    pub commit_comments: Option<TotalCount>,
    pub releases: Option<TotalCount>,
    pub projects: Option<TotalCount>,
    pub issues: Option<TotalCount>,
    pub pull_requests: Option<TotalCount>,
}

/// Fetches one page of an organization's repositories, choosing the query
/// shape that matches the platform.
pub async fn fetch(
    api: &GithubApi,
    platform: &Platform,
    org: &str,
    page_size: i64,
    cursor: Option<String>,
) -> Result<Page<Repo>, ApiError> {
    let document = if platform.supports_branch_protection_rules() {
        QUERY
    } else {
        QUERY_LEGACY
    };
    let data: ResponseData = api
        .graphql(
            document,
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

fn into_page(data: ResponseData, org: &str) -> Result<Page<Repo>, ApiError> {
    let what = format!("repositories of organization `{}`", org);
    match data.organization {
        Some(organization) => {
            let connection = organization.repositories;
            Page::from_connection(&what, connection.page_info, flatten_nodes(connection.nodes))
        }
        None => MalformedPagination {
            context: format!("{}: the organization is not visible to this token", what),
        }
        .fail(),
    }
}
