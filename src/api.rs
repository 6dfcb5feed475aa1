use fehler::throws;
use graphql_client::{QueryBody, Response};
use log::{debug, warn};
use reqwest::header::ACCEPT;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use stable_eyre::eyre::{self, Error};
use url::Url;

use crate::platform::Platform;

const USER_AGENT: &str = concat!("octostats/", env!("CARGO_PKG_VERSION"));
const REST_ACCEPT: &str = "application/vnd.github.v3+json";

/// How many organizations one `/organizations` discovery call asks for.
const DISCOVERY_PER_PAGE: u32 = 100;

/// Everything that can go wrong between us and the GitHub API.
///
/// There is deliberately no retry or backoff here: every failure is terminal
/// for its scope, and the caller decides whether that scope is one
/// organization or the whole run.
#[derive(Debug, Snafu)]
#[snafu(visibility = "pub(crate)")]
pub enum ApiError {
    /// Any non-200 response, kept with the raw body so it can be logged.
    #[snafu(display("HTTP {} from {}: {}", status, url, body))]
    Transport {
        url: String,
        status: StatusCode,
        body: String,
    },

    /// A 200 whose envelope carried errors and no usable data.
    #[snafu(display("GraphQL reported errors: {}", messages.join("; ")))]
    Graphql { messages: Vec<String> },

    /// A connection we are walking came back without the fields needed to
    /// continue. The upstream drops them when the query was not allowed to
    /// see the connection at all, so no further determination is possible.
    #[snafu(display(
        "malformed pagination state while fetching {}; \
         verify the token, the organization name, and your access level",
        context
    ))]
    MalformedPagination { context: String },

    #[snafu(display("failed to build the HTTP client: {}", source))]
    BuildClient { source: reqwest::Error },

    #[snafu(display("request to {} failed: {}", url, source))]
    Http { url: String, source: reqwest::Error },

    #[snafu(display("invalid JSON from {}: {}", url, source))]
    Json { url: String, source: reqwest::Error },
}

/// Where a run points: the web origin plus the REST root and GraphQL
/// endpoint derived from it. GitHub.com routes API traffic through
/// `api.github.com`; GitHub Enterprise Server nests everything under `/api`.
#[derive(Clone, Debug, PartialEq)]
pub struct Host {
    pub web_base: String,
    pub rest_root: String,
    pub graphql_endpoint: String,
}

impl Host {
    /// Accepts `github.com`, a bare GHES host name, or a full `https://` URL.
    #[throws]
    pub fn parse(input: &str) -> Host {
        // Kept function-local: in this module `.context(...)` must keep
        // resolving to snafu's `ResultExt`, and eyre's `WrapErr` carries a
        // competing `context` method.
        use stable_eyre::eyre::WrapErr;

        let trimmed = input.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            eyre::bail!("host must not be empty");
        }
        let with_scheme = if trimmed.contains("://") {
            trimmed.to_string()
        } else {
            format!("https://{}", trimmed)
        };
        let url =
            Url::parse(&with_scheme).wrap_err_with(|| format!("invalid host {:?}", input))?;
        match url.scheme() {
            "http" | "https" => {}
            other => eyre::bail!("unsupported scheme {:?} for host {:?}", other, input),
        }
        let host_name = match url.host_str() {
            Some(host_name) => host_name.to_string(),
            None => eyre::bail!("host {:?} has no host name", input),
        };
        let authority = match url.port() {
            Some(port) => format!("{}:{}", host_name, port),
            None => host_name.clone(),
        };
        let origin = format!("{}://{}", url.scheme(), authority);

        if host_name == "github.com" || host_name == "api.github.com" {
            Host {
                web_base: String::from("https://github.com"),
                rest_root: String::from("https://api.github.com"),
                graphql_endpoint: String::from("https://api.github.com/graphql"),
            }
        } else {
            Host {
                web_base: origin.clone(),
                rest_root: format!("{}/api/v3", origin),
                graphql_endpoint: format!("{}/api/graphql", origin),
            }
        }
    }

    /// Browse URL for one repository, the last column of the statistics rows.
    pub fn repo_url(&self, org: &str, repo: &str) -> String {
        format!("{}/{}/{}", self.web_base, org, repo)
    }
}

/// The response to the REST `/user` connectivity probe.
#[derive(Debug, Deserialize)]
pub struct AuthenticatedUser {
    pub login: String,
}

/// One entry from REST `/organizations` discovery.
#[derive(Debug, Deserialize)]
pub struct OrgSummary {
    pub id: u64,
    pub login: String,
}

#[derive(Debug, Deserialize)]
struct Meta {
    installed_version: Option<String>,
}

/// Bearer-token client over one GitHub host, speaking GraphQL for the
/// statistics queries and REST for the probes.
#[derive(Clone, Debug)]
pub struct GithubApi {
    client: Client,
    host: Host,
    token: String,
}

impl GithubApi {
    pub fn new(host: Host, token: String) -> Result<GithubApi, ApiError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context(BuildClient)?;
        Ok(GithubApi {
            client,
            host,
            token,
        })
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    /// Execute one GraphQL document with bound variables and hand back the
    /// full response envelope, `data` and `errors` both, so the caller can
    /// decide what to do with a partial payload. Only transport-level
    /// failures are errors here.
    pub async fn execute<V, D>(
        &self,
        document: &'static str,
        operation_name: &'static str,
        variables: V,
    ) -> Result<Response<D>, ApiError>
    where
        V: Serialize,
        D: DeserializeOwned,
    {
        let url = self.host.graphql_endpoint.clone();
        let body = QueryBody {
            variables,
            query: document,
            operation_name,
        };
        debug!("POST {} ({})", url, operation_name);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .context(Http { url: url.clone() })?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Transport { url, status, body }.fail();
        }
        response.json().await.context(Json { url })
    }

    /// The standard policy over [`execute`]: upstream errors are logged, the
    /// payload is still used when it carries data, and the call fails only
    /// when there is no data at all.
    pub async fn graphql<V, D>(
        &self,
        document: &'static str,
        operation_name: &'static str,
        variables: V,
    ) -> Result<D, ApiError>
    where
        V: Serialize,
        D: DeserializeOwned,
    {
        let envelope: Response<D> = self.execute(document, operation_name, variables).await?;
        let mut messages = Vec::new();
        if let Some(errors) = &envelope.errors {
            for error in errors {
                warn!("{}: upstream error: {}", operation_name, error.message);
                messages.push(error.message.clone());
            }
        }
        match envelope.data {
            Some(data) => Ok(data),
            None => {
                if messages.is_empty() {
                    messages.push(String::from("the response carried no data"));
                }
                Graphql { messages }.fail()
            }
        }
    }

    /// REST `/user`: confirms the endpoint is reachable and the token works
    /// before any statistics query runs.
    pub async fn authenticated_user(&self) -> Result<AuthenticatedUser, ApiError> {
        self.rest_get(format!("{}/user", self.host.rest_root)).await
    }

    /// REST `/meta`: detects which platform (and so which query shape) we
    /// are talking to.
    pub async fn platform(&self) -> Result<Platform, ApiError> {
        let meta: Meta = self.rest_get(format!("{}/meta", self.host.rest_root)).await?;
        Ok(Platform::from_installed_version(
            meta.installed_version.as_deref(),
        ))
    }

    /// REST `/organizations`: one page of instance-wide organization
    /// discovery, `since`-id paginated.
    pub async fn organizations_after(
        &self,
        since: Option<u64>,
    ) -> Result<Vec<OrgSummary>, ApiError> {
        let url = match since {
            Some(id) => format!(
                "{}/organizations?per_page={}&since={}",
                self.host.rest_root, DISCOVERY_PER_PAGE, id
            ),
            None => format!(
                "{}/organizations?per_page={}",
                self.host.rest_root, DISCOVERY_PER_PAGE
            ),
        };
        self.rest_get(url).await
    }

    async fn rest_get<D: DeserializeOwned>(&self, url: String) -> Result<D, ApiError> {
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .header(ACCEPT, REST_ACCEPT)
            .send()
            .await
            .context(Http { url: url.clone() })?;
        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Transport { url, status, body }.fail();
        }
        response.json().await.context(Json { url })
    }
}
