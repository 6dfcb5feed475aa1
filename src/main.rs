use std::path::PathBuf;

use clap::Parser;
use fehler::throws;
use stable_eyre::eyre::{self, Error};

mod api;
mod conflicts;
mod gql;
mod metrics;
mod pagination;
mod platform;
mod report;
mod token;
mod util;

use api::Host;
use report::{FileConfig, Mode, OrgSource, Report, RunConfig};

/// Per-repository migration statistics and name-conflict reports for
/// GitHub organizations, on GitHub.com or Enterprise Server.
#[derive(Debug, Parser)]
#[clap(name = "octostats", version)]
struct Opt {
    /// GitHub host to talk to: `github.com` or an Enterprise Server name.
    #[clap(long)]
    host: Option<String>,

    /// Personal access token; falls back to GITHUB_TOKEN, then to the
    /// `github.oauth-token` git config key.
    #[clap(long)]
    token: Option<String>,

    /// Aggregate a single organization.
    #[clap(long)]
    org: Option<String>,

    /// CSV file with a `login` column naming the organizations to
    /// aggregate, in order.
    #[clap(long)]
    input_file: Option<PathBuf>,

    /// Track repository-name conflicts across the organizations of this run.
    #[clap(long)]
    repo_conflicts: bool,

    /// Track team-slug conflicts across the organizations of this run.
    #[clap(long)]
    team_conflicts: bool,

    /// Repositories per page for the top-level listing (default 20).
    #[clap(long)]
    repo_page_size: Option<i64>,

    /// Items per page for nested issue, pull request, and review listings
    /// (default 100).
    #[clap(long)]
    item_page_size: Option<i64>,

    /// Directory the report files are written into (default `.`).
    #[clap(long)]
    output_dir: Option<PathBuf>,

    /// TOML file supplying defaults for any of the flags above.
    #[clap(long)]
    config: Option<PathBuf>,

    /// List every organization on the instance instead of aggregating.
    #[clap(long)]
    discover_orgs: bool,
}

#[throws]
#[tokio::main]
async fn main() {
    stable_eyre::install()?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opt = Opt::parse();
    let file = match &opt.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let config = merge(opt, file)?;
    Report::new(config).run().await?;
}

/// Command-line flags win over file configuration; defaults fill the rest.
#[throws]
fn merge(opt: Opt, file: FileConfig) -> RunConfig {
    if opt.org.is_some() && opt.input_file.is_some() {
        eyre::bail!("--org and --input-file are mutually exclusive");
    }
    if opt.discover_orgs && (opt.org.is_some() || opt.input_file.is_some()) {
        eyre::bail!("--discover-orgs cannot be combined with --org or --input-file");
    }

    let host_name = opt
        .host
        .or(file.host)
        .unwrap_or_else(|| String::from(report::DEFAULT_HOST));
    let host = Host::parse(&host_name)?;
    let token = token::github_token(opt.token)?;

    let mode = if opt.discover_orgs {
        Mode::Discover
    } else if let Some(org) = opt.org {
        Mode::Stats(OrgSource::Single(validated_org(org)?))
    } else if let Some(path) = opt.input_file {
        Mode::Stats(OrgSource::File(path))
    } else if file.org.is_some() && file.input_file.is_some() {
        eyre::bail!("the config file sets both org and input_file; they are mutually exclusive");
    } else if let Some(org) = file.org {
        Mode::Stats(OrgSource::Single(validated_org(org)?))
    } else if let Some(path) = file.input_file {
        Mode::Stats(OrgSource::File(path))
    } else {
        eyre::bail!(
            "name an organization with --org, provide --input-file, or pass --discover-orgs"
        );
    };

    RunConfig {
        host,
        token,
        mode,
        output_dir: opt
            .output_dir
            .or(file.output_dir)
            .unwrap_or_else(|| PathBuf::from(".")),
        repo_conflicts: opt.repo_conflicts || file.repo_conflicts.unwrap_or(false),
        team_conflicts: opt.team_conflicts || file.team_conflicts.unwrap_or(false),
        repo_page_size: page_size(
            "repository",
            opt.repo_page_size.or(file.repo_page_size),
            report::DEFAULT_REPO_PAGE_SIZE,
        )?,
        item_page_size: page_size(
            "item",
            opt.item_page_size.or(file.item_page_size),
            report::DEFAULT_ITEM_PAGE_SIZE,
        )?,
    }
}

#[throws]
fn validated_org(org: String) -> String {
    let org = org.trim().to_string();
    if org.is_empty() {
        eyre::bail!("the organization name must not be empty");
    }
    org
}

/// GraphQL rejects `first` arguments outside 1..=100.
#[throws]
fn page_size(which: &str, value: Option<i64>, default: i64) -> i64 {
    let value = value.unwrap_or(default);
    if !(1..=100).contains(&value) {
        eyre::bail!(
            "the {} page size must be between 1 and 100, got {}",
            which,
            value
        );
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_opt() -> Opt {
        Opt {
            host: None,
            token: Some("a".repeat(40)),
            org: None,
            input_file: None,
            repo_conflicts: false,
            team_conflicts: false,
            repo_page_size: None,
            item_page_size: None,
            output_dir: None,
            config: None,
            discover_orgs: false,
        }
    }

    #[test]
    fn defaults_fill_everything_the_flags_leave_out() {
        let mut opt = base_opt();
        opt.org = Some(String::from("acme"));
        let config = merge(opt, FileConfig::default()).unwrap();
        assert_eq!(config.host.rest_root, "https://api.github.com");
        assert_eq!(config.mode, Mode::Stats(OrgSource::Single(String::from("acme"))));
        assert_eq!(config.repo_page_size, 20);
        assert_eq!(config.item_page_size, 100);
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert!(!config.repo_conflicts);
        assert!(!config.team_conflicts);
    }

    #[test]
    fn command_line_wins_over_file_config() {
        let mut opt = base_opt();
        opt.org = Some(String::from("acme"));
        opt.repo_page_size = Some(50);
        let file = FileConfig {
            host: Some(String::from("ghes.example.com")),
            org: Some(String::from("globex")),
            repo_page_size: Some(10),
            ..FileConfig::default()
        };
        let config = merge(opt, file).unwrap();
        // The file still supplies what the command line left out.
        assert_eq!(config.host.rest_root, "https://ghes.example.com/api/v3");
        assert_eq!(config.mode, Mode::Stats(OrgSource::Single(String::from("acme"))));
        assert_eq!(config.repo_page_size, 50);
    }

    #[test]
    fn file_config_can_enable_conflict_tracking() {
        let mut opt = base_opt();
        opt.org = Some(String::from("acme"));
        let file = FileConfig {
            repo_conflicts: Some(true),
            team_conflicts: Some(false),
            ..FileConfig::default()
        };
        let config = merge(opt, file).unwrap();
        assert!(config.repo_conflicts);
        assert!(!config.team_conflicts);
    }

    #[test]
    fn an_input_file_selects_multi_org_mode() {
        let mut opt = base_opt();
        opt.input_file = Some(PathBuf::from("orgs.csv"));
        let config = merge(opt, FileConfig::default()).unwrap();
        assert_eq!(
            config.mode,
            Mode::Stats(OrgSource::File(PathBuf::from("orgs.csv")))
        );
    }

    #[test]
    fn org_and_input_file_are_mutually_exclusive() {
        let mut opt = base_opt();
        opt.org = Some(String::from("acme"));
        opt.input_file = Some(PathBuf::from("orgs.csv"));
        assert!(merge(opt, FileConfig::default()).is_err());
    }

    #[test]
    fn the_config_file_cannot_name_both_organization_sources() {
        let file = FileConfig {
            org: Some(String::from("acme")),
            input_file: Some(PathBuf::from("orgs.csv")),
            ..FileConfig::default()
        };
        assert!(merge(base_opt(), file).is_err());

        // A command-line source still overrides the conflicted file.
        let mut opt = base_opt();
        opt.org = Some(String::from("acme"));
        let file = FileConfig {
            org: Some(String::from("globex")),
            input_file: Some(PathBuf::from("orgs.csv")),
            ..FileConfig::default()
        };
        assert_eq!(
            merge(opt, file).unwrap().mode,
            Mode::Stats(OrgSource::Single(String::from("acme")))
        );
    }

    #[test]
    fn discovery_stands_alone() {
        let mut opt = base_opt();
        opt.discover_orgs = true;
        let config = merge(opt, FileConfig::default()).unwrap();
        assert_eq!(config.mode, Mode::Discover);

        let mut opt = base_opt();
        opt.discover_orgs = true;
        opt.org = Some(String::from("acme"));
        assert!(merge(opt, FileConfig::default()).is_err());
    }

    #[test]
    fn blank_organization_names_are_rejected() {
        let mut opt = base_opt();
        opt.org = Some(String::from("   "));
        assert!(merge(opt, FileConfig::default()).is_err());
    }

    #[test]
    fn some_source_of_organizations_is_required() {
        assert!(merge(base_opt(), FileConfig::default()).is_err());
    }

    #[test]
    fn page_sizes_are_bounded() {
        for bad in [0, -5, 101] {
            let mut opt = base_opt();
            opt.org = Some(String::from("acme"));
            opt.repo_page_size = Some(bad);
            assert!(merge(opt, FileConfig::default()).is_err());
        }
        let mut opt = base_opt();
        opt.org = Some(String::from("acme"));
        opt.item_page_size = Some(100);
        assert!(merge(opt, FileConfig::default()).is_ok());
    }
}
