use fehler::throws;
use stable_eyre::eyre::{self, Error};

/// Classic personal access tokens are 40 characters. Anything else still
/// works (fine-grained tokens, OAuth app tokens), it just draws a warning.
const CLASSIC_TOKEN_LEN: usize = 40;

/// Resolves the token for this run, in order of preference: the value
/// given on the command line, the `GITHUB_TOKEN` environment variable,
/// then the `github.oauth-token` git configuration key.
#[throws]
pub fn github_token(explicit: Option<String>) -> String {
    let token = match explicit {
        Some(token) => Some(token),
        None => match get_token_from_env() {
            Some(token) => Some(token),
            None => get_token_from_git_config()?,
        },
    };

    match token {
        Some(token) => validated(token)?,
        None => eyre::bail!(
            "could not find a github token; pass --token, set GITHUB_TOKEN, \
             or set the github.oauth-token git config key"
        ),
    }
}

#[throws]
fn validated(token: String) -> String {
    let token = token.trim().to_string();
    if token.is_empty() {
        eyre::bail!("the github token is empty");
    }
    if token.len() != CLASSIC_TOKEN_LEN {
        log::warn!(
            "the token does not look like a classic 40-character personal access token; \
             proceeding anyway"
        );
    }
    token
}

fn get_token_from_env() -> Option<String> {
    match std::env::var("GITHUB_TOKEN") {
        Ok(v) => Some(v),
        Err(_) => None,
    }
}

#[throws]
fn get_token_from_git_config() -> Option<String> {
    let output = std::process::Command::new("git")
        .arg("config")
        .arg("--get")
        .arg("github.oauth-token")
        .output()?;
    if output.status.success() {
        let git_token = String::from_utf8(output.stdout)?.trim().to_string();
        Some(git_token)
    } else {
        None
    }
}
