//! Per-repository migration statistics for one organization.
//!
//! The walk is depth-first: for each repository page, each repository's
//! issues are paginated to exhaustion, then its pull requests, then the
//! reviews of each pull request that has any, before the next repository
//! is touched. Everything folds into one [`RepoCounters`] per repository.

use std::future::Future;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use log::info;
use stable_eyre::eyre::{self, Error};
use tokio::sync::mpsc::Sender;

use super::Producer;
use crate::api::{ApiError, GithubApi};
use crate::conflicts::ConflictTracker;
use crate::gql::{org_repos, pull_reviews, repo_issues, repo_pulls, total};
use crate::pagination::{Page, Pages};
use crate::platform::Platform;
use crate::util;

pub const COLUMN_NAMES: &[&str] = &[
    "Org Name",
    "Repo Name",
    "Repo Size (mb)",
    "Record Count",
    "Collaborators Count",
    "Protected Branches Count",
    "PR Reviews Count",
    "Milestones Count",
    "Issues Count",
    "PRs Count",
    "PR Review Comments Count",
    "Commit Comments Count",
    "Issue Comments Count",
    "Issue Events Count",
    "Releases Count",
    "Projects Count",
    "Full URL",
];

/// The explicit accumulator for one repository. Eight counters come
/// straight off the repository node; the other four are folded in while
/// paginating issues, pull requests, and reviews.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepoCounters {
    pub size_mb: i64,
    pub collaborators: i64,
    pub protected_branches: i64,
    pub pr_reviews: i64,
    pub milestones: i64,
    pub issues: i64,
    pub pull_requests: i64,
    pub pr_review_comments: i64,
    pub commit_comments: i64,
    pub issue_comments: i64,
    pub issue_events: i64,
    pub releases: i64,
    pub projects: i64,
}

impl RepoCounters {
    fn from_repo(repo: &org_repos::Repo) -> RepoCounters {
        RepoCounters {
            size_mb: util::kb_to_mb(repo.disk_usage.unwrap_or(0)),
            collaborators: total(&repo.collaborators),
            protected_branches: total(&repo.branch_protection_rules),
            milestones: total(&repo.milestones),
            commit_comments: total(&repo.commit_comments),
            releases: total(&repo.releases),
            projects: total(&repo.projects),
            issues: total(&repo.issues),
            pull_requests: total(&repo.pull_requests),
            ..RepoCounters::default()
        }
    }

    /// An issue's timeline count includes its comments; keep the split.
    fn fold_issue(&mut self, timeline: i64, comments: i64) {
        self.issue_events += timeline - comments;
        self.issue_comments += comments;
    }

    /// A pull request's timeline additionally includes its commits, and its
    /// reviews are counted separately.
    fn fold_pull(&mut self, timeline: i64, comments: i64, commits: i64, reviews: i64) {
        self.issue_events += timeline - comments - commits;
        self.issue_comments += comments;
        self.pr_reviews += reviews;
    }

    fn fold_review(&mut self, comments: i64) {
        self.pr_review_comments += comments;
    }

    /// Sum of the twelve individual counters. This is a coarse completeness
    /// and migration-cost heuristic, not an exact record count: it mixes
    /// direct totals with folded timeline deltas.
    pub fn record_count(&self) -> i64 {
        self.collaborators
            + self.protected_branches
            + self.pr_reviews
            + self.milestones
            + self.issues
            + self.pull_requests
            + self.pr_review_comments
            + self.commit_comments
            + self.issue_comments
            + self.issue_events
            + self.releases
            + self.projects
    }
}

async fn fold_issue_pages<F, Fut>(counters: &mut RepoCounters, fetch: F) -> Result<(), ApiError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<repo_issues::Issue>, ApiError>>,
{
    let mut pages = Pages::new(fetch);
    while let Some(page) = pages.try_next().await? {
        for issue in page.nodes {
            counters.fold_issue(total(&issue.timeline_items), total(&issue.comments));
        }
    }
    Ok(())
}

/// Folds pull-request totals and returns the numbers of the pulls that
/// have reviews to drill into.
async fn fold_pull_pages<F, Fut>(
    counters: &mut RepoCounters,
    fetch: F,
) -> Result<Vec<i64>, ApiError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<repo_pulls::Pull>, ApiError>>,
{
    let mut pages = Pages::new(fetch);
    let mut reviewed = Vec::new();
    while let Some(page) = pages.try_next().await? {
        for pull in page.nodes {
            let reviews = total(&pull.reviews);
            counters.fold_pull(
                total(&pull.timeline_items),
                total(&pull.comments),
                total(&pull.commits),
                reviews,
            );
            if reviews > 0 {
                reviewed.push(pull.number);
            }
        }
    }
    Ok(reviewed)
}

async fn fold_review_pages<F, Fut>(counters: &mut RepoCounters, fetch: F) -> Result<(), ApiError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Page<pull_reviews::Review>, ApiError>>,
{
    let mut pages = Pages::new(fetch);
    while let Some(page) = pages.try_next().await? {
        for review in page.nodes {
            counters.fold_review(total(&review.comments));
        }
    }
    Ok(())
}

/// Streams one statistics row per repository of one organization. When a
/// conflict registry is attached, every repository name is recorded into
/// it under this organization.
pub struct OrgRepoStats {
    api: GithubApi,
    platform: Platform,
    org: String,
    repo_page_size: i64,
    item_page_size: i64,
    repo_conflicts: Option<Arc<Mutex<ConflictTracker>>>,
}

impl OrgRepoStats {
    pub fn new(
        api: GithubApi,
        platform: Platform,
        org: String,
        repo_page_size: i64,
        item_page_size: i64,
        repo_conflicts: Option<Arc<Mutex<ConflictTracker>>>,
    ) -> Self {
        Self {
            api,
            platform,
            org,
            repo_page_size,
            item_page_size,
            repo_conflicts,
        }
    }

    /// All counters for one repository: the node's own totals, then the
    /// folded issue, pull-request, and review pages. Repositories with no
    /// issues or pulls cost no extra queries.
    async fn repo_counters(&self, repo: &org_repos::Repo) -> Result<RepoCounters, ApiError> {
        let mut counters = RepoCounters::from_repo(repo);
        let org = self.org.as_str();
        let name = repo.name.as_str();

        if counters.issues > 0 {
            fold_issue_pages(&mut counters, |cursor| {
                repo_issues::fetch(&self.api, org, name, self.item_page_size, cursor)
            })
            .await?;
        }
        if counters.pull_requests > 0 {
            let reviewed = fold_pull_pages(&mut counters, |cursor| {
                repo_pulls::fetch(&self.api, org, name, self.item_page_size, cursor)
            })
            .await?;
            for number in reviewed {
                fold_review_pages(&mut counters, |cursor| {
                    pull_reviews::fetch(&self.api, org, name, number, self.item_page_size, cursor)
                })
                .await?;
            }
        }
        Ok(counters)
    }

    fn row(&self, repo_name: &str, counters: &RepoCounters) -> Vec<String> {
        vec![
            self.org.clone(),
            repo_name.to_string(),
            counters.size_mb.to_string(),
            counters.record_count().to_string(),
            counters.collaborators.to_string(),
            counters.protected_branches.to_string(),
            counters.pr_reviews.to_string(),
            counters.milestones.to_string(),
            counters.issues.to_string(),
            counters.pull_requests.to_string(),
            counters.pr_review_comments.to_string(),
            counters.commit_comments.to_string(),
            counters.issue_comments.to_string(),
            counters.issue_events.to_string(),
            counters.releases.to_string(),
            counters.projects.to_string(),
            self.api.host().repo_url(&self.org, repo_name),
        ]
    }

    fn record_conflict(&self, repo_name: &str) -> Result<(), Error> {
        if let Some(tracker) = &self.repo_conflicts {
            tracker
                .lock()
                .map_err(|_| eyre::eyre!("the repository conflict registry lock was poisoned"))?
                .record(repo_name, &self.org);
        }
        Ok(())
    }
}

#[async_trait]
impl Producer for OrgRepoStats {
    fn column_names(&self) -> Vec<String> {
        COLUMN_NAMES.iter().map(|name| name.to_string()).collect()
    }

    async fn producer_task(self, tx: Sender<Vec<String>>) -> Result<(), Error> {
        let mut pages = Pages::new(|cursor| {
            org_repos::fetch(
                &self.api,
                &self.platform,
                &self.org,
                self.repo_page_size,
                cursor,
            )
        });

        let mut repos_seen = 0usize;
        let mut disk_mb = 0i64;
        while let Some(page) = pages.try_next().await? {
            for repo in page.nodes {
                self.record_conflict(&repo.name)?;
                let counters = self.repo_counters(&repo).await?;
                repos_seen += 1;
                disk_mb += counters.size_mb;
                tx.send(self.row(&repo.name, &counters)).await?;
            }
        }
        info!(
            "organization `{}`: {} repositories, {} MB on disk",
            self.org, repos_seen, disk_mb
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};

    use tokio::sync::mpsc;

    use super::*;
    use crate::api::Host;
    use crate::gql::TotalCount;
    use crate::metrics::{Consumer, Print};
    use crate::pagination::Page;

    /// A writer whose bytes stay reachable after `Print` consumes it.
    #[derive(Clone, Default)]
    struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().write(buf)
        }
        fn flush(&mut self) -> io::Result<()> {
            self.0.lock().unwrap().flush()
        }
    }

    fn count(value: i64) -> Option<TotalCount> {
        Some(TotalCount { total_count: value })
    }

    fn bare_repo(name: &str, disk_kb: i64) -> org_repos::Repo {
        org_repos::Repo {
            name: name.to_string(),
            disk_usage: Some(disk_kb),
            collaborators: count(0),
            branch_protection_rules: count(0),
            milestones: count(0),
            commit_comments: count(0),
            releases: count(0),
            projects: count(0),
            issues: count(0),
            pull_requests: count(0),
        }
    }

    fn single_page<T>(nodes: Vec<T>) -> Page<T> {
        Page {
            nodes,
            has_next_page: false,
            end_cursor: None,
        }
    }

    fn stats_for(org: &str) -> OrgRepoStats {
        let host = Host::parse("github.com").unwrap();
        let api = GithubApi::new(host, String::from("test-token")).unwrap();
        OrgRepoStats::new(api, Platform::Cloud, org.to_string(), 20, 100, None)
    }

    #[test]
    fn record_count_is_the_sum_of_the_twelve_counters() {
        let counters = RepoCounters {
            size_mb: 99,
            collaborators: 1,
            protected_branches: 2,
            pr_reviews: 3,
            milestones: 4,
            issues: 5,
            pull_requests: 6,
            pr_review_comments: 7,
            commit_comments: 8,
            issue_comments: 9,
            issue_events: 10,
            releases: 11,
            projects: 12,
        };
        // Size is a column of its own, never part of the record count.
        assert_eq!(counters.record_count(), 78);
    }

    #[test]
    fn issue_folding_splits_events_from_comments() {
        let mut counters = RepoCounters::default();
        counters.fold_issue(5, 2);
        assert_eq!(counters.issue_events, 3);
        assert_eq!(counters.issue_comments, 2);
        assert_eq!(counters.record_count(), 5);
    }

    #[test]
    fn pull_folding_excludes_commits_and_counts_reviews() {
        let mut counters = RepoCounters::default();
        counters.fold_pull(10, 3, 4, 2);
        assert_eq!(counters.issue_events, 3);
        assert_eq!(counters.issue_comments, 3);
        assert_eq!(counters.pr_reviews, 2);
        counters.fold_review(6);
        assert_eq!(counters.pr_review_comments, 6);
    }

    #[tokio::test]
    async fn issue_pages_fold_across_pages() {
        let mut counters = RepoCounters::default();
        let mut queue = vec![
            Page {
                nodes: vec![repo_issues::Issue {
                    timeline_items: count(5),
                    comments: count(2),
                }],
                has_next_page: true,
                end_cursor: Some(String::from("a")),
            },
            single_page(vec![repo_issues::Issue {
                timeline_items: count(4),
                comments: count(1),
            }]),
        ];
        fold_issue_pages(&mut counters, move |_cursor| {
            let page = queue.remove(0);
            async move { Ok(page) }
        })
        .await
        .unwrap();
        assert_eq!(counters.issue_events, 6);
        assert_eq!(counters.issue_comments, 3);
    }

    #[tokio::test]
    async fn only_reviewed_pulls_are_drilled_into() {
        let mut counters = RepoCounters::default();
        let pulls = vec![
            repo_pulls::Pull {
                number: 1,
                timeline_items: count(6),
                comments: count(1),
                commits: count(2),
                reviews: count(0),
            },
            repo_pulls::Pull {
                number: 2,
                timeline_items: count(8),
                comments: count(2),
                commits: count(1),
                reviews: count(3),
            },
        ];
        let mut queue = vec![single_page(pulls)];
        let reviewed = fold_pull_pages(&mut counters, move |_cursor| {
            let page = queue.remove(0);
            async move { Ok(page) }
        })
        .await
        .unwrap();
        assert_eq!(reviewed, vec![2]);
        assert_eq!(counters.issue_events, 3 + 5);
        assert_eq!(counters.issue_comments, 3);
        assert_eq!(counters.pr_reviews, 3);
    }

    #[tokio::test]
    async fn rows_match_the_expected_report_shape() {
        // Two repositories: "web" is empty apart from its size, "api" has
        // one issue whose timeline is folded in.
        let stats = stats_for("acme");

        let web = bare_repo("web", 2048);
        let web_counters = RepoCounters::from_repo(&web);

        let api_repo = {
            let mut repo = bare_repo("api", 512);
            repo.issues = count(1);
            repo
        };
        let mut api_counters = RepoCounters::from_repo(&api_repo);
        let mut queue = vec![single_page(vec![repo_issues::Issue {
            timeline_items: count(4),
            comments: count(1),
        }])];
        fold_issue_pages(&mut api_counters, move |_cursor| {
            let page = queue.remove(0);
            async move { Ok(page) }
        })
        .await
        .unwrap();

        assert_eq!(api_counters.issue_events, 3);
        assert_eq!(api_counters.issue_comments, 1);
        assert_eq!(api_counters.record_count(), 5);

        let (tx, mut rx) = mpsc::channel(16);
        tx.send(stats.row("web", &web_counters)).await.unwrap();
        tx.send(stats.row("api", &api_counters)).await.unwrap();
        drop(tx);

        let buffer = SharedBuffer::default();
        let print = Print::new(buffer.clone());
        print
            .consume(&mut rx, stats.column_names())
            .await
            .unwrap();
        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();

        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Org Name,Repo Name,Repo Size (mb),Record Count,Collaborators Count,\
             Protected Branches Count,PR Reviews Count,Milestones Count,Issues Count,\
             PRs Count,PR Review Comments Count,Commit Comments Count,Issue Comments Count,\
             Issue Events Count,Releases Count,Projects Count,Full URL"
        );
        assert_eq!(
            lines.next().unwrap(),
            "acme,web,2,0,0,0,0,0,0,0,0,0,0,0,0,0,https://github.com/acme/web"
        );
        assert_eq!(
            lines.next().unwrap(),
            "acme,api,0,5,0,0,0,0,1,0,0,0,1,3,0,0,https://github.com/acme/api"
        );
        assert!(lines.next().is_none());
    }
}
