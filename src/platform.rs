use std::fmt;

use log::warn;
use semver::Version;

/// The GitHub flavor a run is talking to, detected from the REST `/meta`
/// probe before any GraphQL query is issued.
///
/// The platform decides which repository query shape to use: GitHub
/// Enterprise Server releases before 2.17 expose branch protection as
/// `protectedBranches`, everything newer (and GitHub.com) as
/// `branchProtectionRules`.
#[derive(Clone, Debug, PartialEq)]
pub enum Platform {
    /// GitHub.com, where `/meta` carries no `installed_version`.
    Cloud,
    /// GitHub Enterprise Server with its reported `installed_version`.
    Server(Version),
    /// A server that reported a version string we could not parse.
    Unknown,
}

impl Platform {
    pub fn from_installed_version(installed_version: Option<&str>) -> Platform {
        match installed_version {
            None => Platform::Cloud,
            Some(raw) => match lenient_version(raw) {
                Some(version) => Platform::Server(version),
                None => {
                    warn!(
                        "could not parse reported server version {:?}; assuming a legacy schema",
                        raw
                    );
                    Platform::Unknown
                }
            },
        }
    }

    /// Whether the repository query may ask for `branchProtectionRules`
    /// rather than the legacy `protectedBranches` connection.
    pub fn supports_branch_protection_rules(&self) -> bool {
        match self {
            Platform::Cloud => true,
            Platform::Server(version) => *version >= Version::new(2, 17, 0),
            Platform::Unknown => false,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Cloud => write!(f, "GitHub.com"),
            Platform::Server(version) => write!(f, "GitHub Enterprise Server {}", version),
            Platform::Unknown => write!(f, "GitHub Enterprise Server (unknown version)"),
        }
    }
}

/// `/meta` version strings are not always full semver (`"3.10"` happens);
/// pad the missing components before giving up.
fn lenient_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    Version::parse(raw)
        .or_else(|_| Version::parse(&format!("{}.0", raw)))
        .or_else(|_| Version::parse(&format!("{}.0.0", raw)))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_version_means_cloud() {
        assert_eq!(Platform::from_installed_version(None), Platform::Cloud);
    }

    #[test]
    fn short_version_strings_are_padded() {
        assert_eq!(
            Platform::from_installed_version(Some("3.10")),
            Platform::Server(Version::new(3, 10, 0))
        );
        assert_eq!(
            Platform::from_installed_version(Some("2.22.6")),
            Platform::Server(Version::new(2, 22, 6))
        );
    }

    #[test]
    fn unparseable_version_is_unknown() {
        assert_eq!(
            Platform::from_installed_version(Some("GitHub AE")),
            Platform::Unknown
        );
    }

    #[test]
    fn branch_protection_selector_cuts_over_at_2_17() {
        assert!(Platform::Cloud.supports_branch_protection_rules());
        assert!(Platform::Server(Version::new(2, 17, 0)).supports_branch_protection_rules());
        assert!(Platform::Server(Version::new(3, 1, 2)).supports_branch_protection_rules());
        assert!(!Platform::Server(Version::new(2, 16, 5)).supports_branch_protection_rules());
        assert!(!Platform::Unknown.supports_branch_protection_rules());
    }
}
