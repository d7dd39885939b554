//! CircleCI v1.1 API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use url::Url;

use super::{EnvVarStore, RepoRef};
use crate::errors::{Error, Result};
use crate::http::{build_client, ensure_success, read_json};
use crate::secrets::SecretString;

const SERVICE: &str = "circleci";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct CircleConfig {
    /// Base URL of the v1.1 API (e.g. "https://circleci.com/api/v1.1")
    pub base_url: String,

    /// VCS segment of project paths
    pub vcs_type: String,

    /// API token
    pub token: SecretString,

    pub timeout: Duration,

    /// Enable request logging
    pub verbose: bool,
}

/// Authenticated CircleCI client
pub struct CircleClient {
    http: Client,
    base: Url,
    config: CircleConfig,
}

#[derive(Debug, Deserialize)]
struct Me {
    #[serde(default)]
    login: String,
}

#[derive(Debug, Deserialize)]
struct EnvVar {
    name: String,
}

impl CircleClient {
    /// Build the client and check the token with two cheap reads.
    pub async fn connect(config: CircleConfig) -> Result<Self> {
        let base = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            Error::config(format!("Invalid circle base URL {}: {}", config.base_url, e))
        })?;
        if base.cannot_be_a_base() {
            return Err(Error::config(format!("Invalid circle base URL {}", config.base_url)));
        }
        let http = build_client(config.timeout)?;
        let client = Self { http, base, config };

        let me: Me = client
            .read(client.request(Method::GET, &["me"]), || {
                Error::authentication(SERVICE, "Bad circle token")
            })
            .await
            .map_err(bad_token)?;
        debug!(login = %me.login, "Circle token belongs to user");

        let projects: Vec<serde_json::Value> = client
            .read(client.request(Method::GET, &["projects"]), || {
                Error::authentication(SERVICE, "Problem testing circle token")
            })
            .await
            .map_err(bad_token)?;
        info!(projects = projects.len(), "Circle token verified");

        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        self.base.as_str()
    }

    /// `<base>/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn project_endpoint(&self, repo: &RepoRef, rest: &[&str]) -> Url {
        let mut segments = vec![
            "project",
            self.config.vcs_type.as_str(),
            repo.account.as_str(),
            repo.project.as_str(),
        ];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.request_url(method, self.endpoint(segments))
    }

    fn request_url(&self, method: Method, url: Url) -> RequestBuilder {
        if self.config.verbose {
            debug!("{} {}", method, url);
        }

        self.http
            .request(method, url)
            .header("Circle-Token", self.config.token.expose_secret())
            .header("Accept", "application/json")
    }

    async fn send<F>(&self, request: RequestBuilder, on_not_found: F) -> Result<()>
    where
        F: FnOnce() -> Error,
    {
        let response = request.send().await.map_err(|e| Error::from_reqwest(SERVICE, e))?;
        ensure_success(SERVICE, response, on_not_found).await?;
        Ok(())
    }

    async fn read<T, F>(&self, request: RequestBuilder, on_not_found: F) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
        F: FnOnce() -> Error,
    {
        let response = request.send().await.map_err(|e| Error::from_reqwest(SERVICE, e))?;
        read_json(SERVICE, response, on_not_found).await
    }
}

fn bad_token(error: Error) -> Error {
    match error {
        Error::UnexpectedResponse { status, message, .. } => {
            Error::authentication(SERVICE, format!("Bad circle token (status {status}): {message}"))
        }
        other => other,
    }
}

#[async_trait]
impl EnvVarStore for CircleClient {
    async fn enable_project(&self, repo: &RepoRef) -> Result<()> {
        let url = self.project_endpoint(repo, &["enable"]);
        self.send(self.request_url(Method::POST, url), || Error::repo_not_found(repo.to_string()))
            .await
    }

    async fn list_env_var_names(&self, repo: &RepoRef) -> Result<Vec<String>> {
        let url = self.project_endpoint(repo, &["envvar"]);
        let vars: Vec<EnvVar> = self
            .read(self.request_url(Method::GET, url), || Error::repo_not_found(repo.to_string()))
            .await?;
        Ok(vars.into_iter().map(|v| v.name).collect())
    }

    async fn add_env_var(&self, repo: &RepoRef, name: &str, value: &SecretString) -> Result<()> {
        let url = self.project_endpoint(repo, &["envvar"]);
        let request = self
            .request_url(Method::POST, url)
            .json(&json!({ "name": name, "value": value.expose_secret() }));

        self.send(request, || Error::repo_not_found(repo.to_string())).await.map_err(|e| {
            match e {
                Error::UnexpectedResponse { status, message, .. } => Error::unexpected(
                    SERVICE,
                    status,
                    format!(
                        "Problem adding environment variable {} to {}: {}",
                        name, repo, message
                    ),
                ),
                other => other,
            }
        })
    }

    async fn delete_env_var(&self, repo: &RepoRef, name: &str) -> Result<()> {
        let url = self.project_endpoint(repo, &["envvar", name]);
        self.send(self.request_url(Method::DELETE, url), || {
            Error::unexpected(
                SERVICE,
                404,
                format!("Environment variable {} vanished from {} before delete", name, repo),
            )
        })
        .await
    }
}
