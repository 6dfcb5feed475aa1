use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use fehler::throws;
use log::{error, info};
use serde::Deserialize;
use stable_eyre::eyre::{self, Error, WrapErr};

use crate::api::{ApiError, GithubApi, Host};
use crate::conflicts::{ConflictRow, ConflictTracker};
use crate::gql::org_teams;
use crate::metrics::{self, Consumer, DiscoverOrgs, OrgRepoStats, Print};
use crate::pagination;
use crate::platform::Platform;
use crate::util;

pub const DEFAULT_HOST: &str = "github.com";
pub const DEFAULT_REPO_PAGE_SIZE: i64 = 20;
pub const DEFAULT_ITEM_PAGE_SIZE: i64 = 100;

/// Optional defaults loaded from a TOML file, flag for flag. Anything the
/// command line sets wins over what is written here.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub host: Option<String>,
    pub org: Option<String>,
    pub input_file: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub repo_conflicts: Option<bool>,
    pub team_conflicts: Option<bool>,
    pub repo_page_size: Option<i64>,
    pub item_page_size: Option<i64>,
}

impl FileConfig {
    #[throws]
    pub fn load(path: &Path) -> FileConfig {
        let text = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read the config file {:?}", path))?;
        toml::from_str(&text)
            .wrap_err_with(|| format!("failed to parse the config file {:?}", path))?
    }
}

/// Where the organizations to aggregate come from.
#[derive(Clone, Debug, PartialEq)]
pub enum OrgSource {
    /// One organization named directly.
    Single(String),
    /// A CSV file with a `login` column, one organization per row.
    File(PathBuf),
}

#[derive(Debug, PartialEq)]
pub enum Mode {
    /// Walk organizations and emit statistics and conflict reports.
    Stats(OrgSource),
    /// List every organization on the instance instead.
    Discover,
}

/// Everything one run needs, after command-line flags have been merged
/// over file configuration and defaults.
#[derive(Debug)]
pub struct RunConfig {
    pub host: Host,
    pub token: String,
    pub mode: Mode,
    pub output_dir: PathBuf,
    pub repo_conflicts: bool,
    pub team_conflicts: bool,
    pub repo_page_size: i64,
    pub item_page_size: i64,
}

/// The driving type for one invocation: probes the endpoint, walks the
/// requested organizations, and writes every report file of the run.
pub struct Report {
    config: RunConfig,
}

impl Report {
    pub fn new(config: RunConfig) -> Report {
        Report { config }
    }

    #[throws]
    pub async fn run(self) {
        let api = GithubApi::new(self.config.host.clone(), self.config.token.clone())?;
        let stamp = util::timestamp(Utc::now());

        tokio::fs::create_dir_all(&self.config.output_dir)
            .await
            .wrap_err_with(|| {
                format!(
                    "failed to create the output directory {:?}",
                    self.config.output_dir
                )
            })?;

        // Connectivity probe before any real query.
        let user = api
            .authenticated_user()
            .await
            .wrap_err("could not reach the API with the given token")?;
        info!("authenticated as `{}`", user.login);

        match &self.config.mode {
            Mode::Discover => self.discover(&api, &stamp).await?,
            Mode::Stats(source) => self.stats(&api, source, &stamp).await?,
        }
    }

    #[throws]
    async fn discover(&self, api: &GithubApi, stamp: &str) {
        let platform = api
            .platform()
            .await
            .wrap_err("failed to probe the platform version")?;
        if platform == Platform::Cloud {
            eyre::bail!(
                "organization discovery enumerates a whole instance and is only \
                 meant for Enterprise Server hosts, not github.com"
            );
        }
        let path = self.config.output_dir.join(organizations_file_name(stamp));
        info!("discovering organizations into {:?}", path);
        produce_csv(&path, DiscoverOrgs::new(api.clone())).await?;
    }

    /// Aggregates every requested organization. In multi-organization runs
    /// an API failure skips the affected organization; anything else (bad
    /// input file, unwritable output) still ends the run.
    #[throws]
    async fn stats(&self, api: &GithubApi, source: &OrgSource, stamp: &str) {
        let platform = api
            .platform()
            .await
            .wrap_err("failed to probe the platform version")?;
        info!("platform: {}", platform);

        let (orgs, run_label, multi) = match source {
            OrgSource::Single(org) => (vec![org.clone()], org.clone(), false),
            OrgSource::File(path) => (read_org_logins(path)?, run_label_for(path), true),
        };

        let repo_conflicts = if self.config.repo_conflicts {
            Some(Arc::new(Mutex::new(ConflictTracker::new())))
        } else {
            None
        };
        let mut team_conflicts = if self.config.team_conflicts {
            Some(ConflictTracker::new())
        } else {
            None
        };

        for org in &orgs {
            let outcome = self
                .process_org(
                    api,
                    &platform,
                    org,
                    stamp,
                    repo_conflicts.clone(),
                    team_conflicts.as_mut(),
                )
                .await;
            if let Err(err) = outcome {
                if multi && err.downcast_ref::<ApiError>().is_some() {
                    error!("skipping organization `{}`: {:#}", org, err);
                } else {
                    fehler::throw!(err);
                }
            }
        }

        if let Some(tracker) = repo_conflicts {
            let tracker = Arc::try_unwrap(tracker)
                .map_err(|_| eyre::eyre!("the repository conflict registry is still shared"))?
                .into_inner()
                .map_err(|_| eyre::eyre!("the repository conflict registry lock was poisoned"))?;
            self.write_conflicts(&tracker, &run_label, "repo", stamp)?;
        }
        if let Some(tracker) = &team_conflicts {
            self.write_conflicts(tracker, &run_label, "team", stamp)?;
        }
    }

    /// Streams one organization's statistics into its CSV file, recording
    /// repository and team names into the conflict registries on the way.
    #[throws]
    async fn process_org(
        &self,
        api: &GithubApi,
        platform: &Platform,
        org: &str,
        stamp: &str,
        repo_conflicts: Option<Arc<Mutex<ConflictTracker>>>,
        team_conflicts: Option<&mut ConflictTracker>,
    ) {
        let path = self.config.output_dir.join(stats_file_name(org, stamp));
        info!("aggregating organization `{}` into {:?}", org, path);
        let producer = OrgRepoStats::new(
            api.clone(),
            platform.clone(),
            org.to_string(),
            self.config.repo_page_size,
            self.config.item_page_size,
            repo_conflicts,
        );
        produce_csv(&path, producer).await?;

        if let Some(tracker) = team_conflicts {
            let teams = pagination::accumulate_pages(|cursor| {
                org_teams::fetch(api, org, self.config.item_page_size, cursor)
            })
            .await?;
            info!("organization `{}`: {} teams", org, teams.len());
            for team in teams {
                tracker.record(&team.slug, org);
            }
        }
    }

    /// Writes one conflict report. The file appears whenever its flag was
    /// given, header included even with nothing to report, so downstream
    /// tooling can rely on its presence.
    #[throws]
    fn write_conflicts(&self, tracker: &ConflictTracker, run_label: &str, kind: &str, stamp: &str) {
        let path = self
            .config
            .output_dir
            .join(conflicts_file_name(run_label, kind, stamp));
        let rows = tracker.rows();
        info!("writing {} {} conflict(s) to {:?}", rows.len(), kind, path);
        let file =
            File::create(&path).wrap_err_with(|| format!("failed to create {:?}", path))?;
        write_conflict_rows(file, &rows)
            .wrap_err_with(|| format!("failed to write {:?}", path))?;
    }
}

fn stats_file_name(org: &str, stamp: &str) -> String {
    format!("{}-all_repos-{}.csv", org, stamp)
}

fn conflicts_file_name(run_label: &str, kind: &str, stamp: &str) -> String {
    format!("{}-{}-conflicts-{}.csv", run_label, kind, stamp)
}

fn organizations_file_name(stamp: &str) -> String {
    format!("organizations-{}.csv", stamp)
}

/// Conflict files of a multi-organization run are labeled by the input
/// file's stem; a single-organization run uses the organization itself.
fn run_label_for(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| String::from("input"))
}

/// Writes one CSV file, header first, from the rows the producer streams,
/// then waits for the producer so its failure is not lost.
#[throws]
async fn produce_csv(path: &Path, producer: impl metrics::Producer + Send + 'static) {
    let (column_names, mut rx, handle) = metrics::run_producer(producer);

    let consumed: Result<(), Error> = async {
        let file =
            File::create(path).wrap_err_with(|| format!("failed to create {:?}", path))?;
        Print::new(file)
            .consume(&mut rx, column_names)
            .await
            .map_err(|message| eyre::eyre!(message))
            .wrap_err_with(|| format!("failed to write {:?}", path))?;
        Ok(())
    }
    .await;

    // Closing the channel stops a still-running producer at its next send.
    drop(rx);
    let produced = handle
        .await
        .wrap_err("the statistics producer panicked")?;
    consumed?;
    produced?;
}

fn write_conflict_rows<W: std::io::Write>(into: W, rows: &[ConflictRow]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(into);
    if rows.is_empty() {
        writer.write_record(&["conflict qty", "name", "org names"])?;
    } else {
        for row in rows {
            writer.serialize(row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct OrgRecord {
    login: String,
}

/// Reads the `login` column of the input file, preserving file order.
#[throws]
fn read_org_logins(path: &Path) -> Vec<String> {
    let file =
        File::open(path).wrap_err_with(|| format!("failed to open the input file {:?}", path))?;
    let logins = parse_org_logins(file)
        .wrap_err_with(|| format!("malformed input file {:?}", path))?;
    if logins.is_empty() {
        eyre::bail!("the input file {:?} lists no organizations", path);
    }
    logins
}

fn parse_org_logins(reader: impl Read) -> Result<Vec<String>, csv::Error> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut logins = Vec::new();
    for record in csv_reader.deserialize() {
        let record: OrgRecord = record?;
        let login = record.login.trim().to_string();
        if !login.is_empty() {
            logins.push(login);
        }
    }
    Ok(logins)
}
