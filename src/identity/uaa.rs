//! HTTP client for a UAA instance.
//!
//! Connecting performs three steps, any of which aborts the run on failure:
//! 1. discover the UAA endpoint from the Cloud Controller root document (unless
//!    configured directly)
//! 2. obtain a token with the client-credentials grant
//! 3. probe reachability with a one-row user listing

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use super::{UaaUser, UserDirectory};
use crate::config::UaaClientCredentials;
use crate::errors::{Error, Result};
use crate::http::{build_client, ensure_success, read_json};
use crate::secrets::SecretString;

const SERVICE: &str = "uaa";

/// Everything needed to connect to one UAA instance.
#[derive(Debug, Clone)]
pub struct UaaConfig {
    pub instance_id: String,
    pub api_href: String,
    pub uaa_href: Option<String>,
    pub origin: String,
    pub credentials: UaaClientCredentials,
    pub timeout: Duration,
    pub verbose: bool,
}

/// Authenticated client for one UAA instance.
pub struct UaaClient {
    http: Client,
    instance_id: String,
    target: String,
    base: Url,
    origin: String,
    token: SecretString,
    verbose: bool,
}

#[derive(Debug, Deserialize)]
struct RootLinks {
    #[serde(default)]
    links: std::collections::HashMap<String, Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserList {
    #[serde(default)]
    resources: Vec<UaaUser>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserCount {
    #[serde(default)]
    total_results: u64,
}

impl UaaClient {
    /// Discover, authenticate against and probe a UAA instance.
    pub async fn connect(config: UaaConfig) -> Result<Self> {
        let http = build_client(config.timeout)?;

        let target = match config.uaa_href {
            Some(href) => href,
            None => discover_uaa_href(&http, &config.api_href, config.verbose).await?,
        };
        let target = target.trim_end_matches('/').to_string();
        let base = Url::parse(&target)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                Error::config(format!(
                    "Invalid UAA URL {} for instance {}",
                    target, config.instance_id
                ))
            })?;

        let token = fetch_token(&http, &target, &config.credentials).await?;

        let client = Self {
            http,
            instance_id: config.instance_id,
            target,
            base,
            origin: config.origin,
            token,
            verbose: config.verbose,
        };
        client.probe().await?;

        Ok(client)
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// `<target>/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .http
            .get(self.endpoint(&["Users"]))
            .bearer_auth(self.token.expose_secret())
            .query(&[("count", "1"), ("attributes", "id")])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(SERVICE, e))?;

        let users: UserCount = read_json(SERVICE, response, || {
            Error::config(format!("UAA at {} has no /Users endpoint", self.target))
        })
        .await?;

        info!(instance = %self.instance_id, users = users.total_results, "Found users in uaa");
        if users.total_results == 0 {
            warn!(
                instance = %self.instance_id,
                "Found 0 users in uaa, something may be wrong. Continuing"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl UserDirectory for UaaClient {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn find_users(&self, user_name: &str) -> Result<Vec<UaaUser>> {
        let filter = format!(
            "userName eq \"{}\" and origin eq \"{}\"",
            escape_filter_value(user_name),
            escape_filter_value(&self.origin)
        );
        if self.verbose {
            debug!(instance = %self.instance_id, filter = %filter, "GET {}/Users", self.target);
        }

        let response = self
            .http
            .get(self.endpoint(&["Users"]))
            .bearer_auth(self.token.expose_secret())
            .query(&[("filter", filter.as_str()), ("attributes", "id,userName,origin")])
            .send()
            .await
            .map_err(|e| Error::from_reqwest(SERVICE, e))?;

        let users: UserList = read_json(SERVICE, response, || {
            Error::identity_not_found(user_name, self.instance_id.as_str())
        })
        .await?;
        Ok(users.resources)
    }

    async fn set_password(&self, user_id: &str, password: &SecretString) -> Result<()> {
        let url = self.endpoint(&["Users", user_id, "password"]);
        if self.verbose {
            debug!(instance = %self.instance_id, "PUT {}", url);
        }

        let response = self
            .http
            .put(url)
            .bearer_auth(self.token.expose_secret())
            .json(&json!({ "password": password.expose_secret() }))
            .send()
            .await
            .map_err(|e| Error::from_reqwest(SERVICE, e))?;

        ensure_success(SERVICE, response, || {
            Error::unexpected(SERVICE, 404, format!("user {} vanished during rotation", user_id))
        })
        .await?;
        Ok(())
    }
}

/// Query a Cloud Controller API root for its UAA link.
pub async fn discover_uaa_href(http: &Client, api_href: &str, verbose: bool) -> Result<String> {
    if verbose {
        debug!("Getting uaa href from {}", api_href);
    }

    let response = http
        .get(api_href)
        .header("Content-Type", "application/json")
        .send()
        .await
        .map_err(|e| Error::from_reqwest("cloud controller", e))?;

    let root: RootLinks = read_json("cloud controller", response, || {
        Error::config(format!("No Cloud Controller API found at {}", api_href))
    })
    .await?;

    let href = root
        .links
        .get("uaa")
        .map(|link| link.href.clone())
        .filter(|href| !href.is_empty())
        .ok_or_else(|| {
            Error::config(format!("API root at {} does not advertise a uaa link", api_href))
        })?;

    if verbose {
        debug!("Got uaa href {}", href);
    }
    Ok(href)
}

async fn fetch_token(
    http: &Client,
    target: &str,
    credentials: &UaaClientCredentials,
) -> Result<SecretString> {
    let response = http
        .post(format!("{}/oauth/token", target))
        .basic_auth(&credentials.client_id, Some(credentials.client_secret.expose_secret()))
        .header("Accept", "application/json")
        .form(&[("grant_type", "client_credentials"), ("token_format", "jwt")])
        .send()
        .await
        .map_err(|e| Error::from_reqwest(SERVICE, e))?;

    // UAA answers a bad client with 401; some deployments use 400 invalid_client.
    let status = response.status().as_u16();
    if status == 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::authentication(SERVICE, format!("token request rejected: {}", body)));
    }

    let token: TokenResponse = read_json(SERVICE, response, || {
        Error::config(format!("UAA at {} has no token endpoint", target))
    })
    .await?;
    Ok(token.access_token)
}

fn escape_filter_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
