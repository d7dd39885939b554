//! # Configuration Settings
//!
//! The YAML document that describes which UAA instances exist and which
//! CircleCI projects deploy into which Cloud Foundry space.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

use crate::errors::Result;
use crate::topology::{IdentityProviderInstance, Organization, Topology};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Origin of the CI users in UAA
    #[serde(default = "default_uaa_origin")]
    #[validate(length(min = 1, message = "uaa_origin cannot be empty"))]
    pub uaa_origin: String,

    /// Per-call timeout for every outbound request
    #[serde(default = "default_timeout_seconds")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be between 1 and 300 seconds"))]
    pub timeout_seconds: u64,

    /// CircleCI endpoint settings
    #[serde(default)]
    #[validate(nested)]
    pub circle: CircleSettings,

    /// Cloud Foundry instances, each with its own UAA
    #[serde(default)]
    #[validate(nested)]
    pub cfs: Vec<IdentityProviderInstance>,

    /// Organizations and their spaces
    #[serde(default)]
    #[validate(nested)]
    pub orgs: Vec<Organization>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            uaa_origin: default_uaa_origin(),
            timeout_seconds: default_timeout_seconds(),
            circle: CircleSettings::default(),
            cfs: vec![],
            orgs: vec![],
        }
    }
}

impl Settings {
    /// Run field validation and the topology invariants.
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self)?;
        self.topology()?;
        Ok(())
    }

    pub fn topology(&self) -> Result<Topology> {
        Topology::new(self.cfs.clone(), self.orgs.clone())
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// CircleCI API settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CircleSettings {
    /// Base URL of the v1.1 API
    #[serde(default = "default_circle_base_url")]
    #[validate(url(message = "circle.base_url must be a valid URL"))]
    pub base_url: String,

    /// VCS segment of project paths (`github` or `bitbucket`)
    #[serde(default = "default_vcs_type")]
    #[validate(length(min = 1, message = "circle.vcs_type cannot be empty"))]
    pub vcs_type: String,
}

impl Default for CircleSettings {
    fn default() -> Self {
        Self { base_url: default_circle_base_url(), vcs_type: default_vcs_type() }
    }
}

fn default_uaa_origin() -> String {
    "uaa".to_string()
}

fn default_timeout_seconds() -> u64 {
    5
}

fn default_circle_base_url() -> String {
    "https://circleci.com/api/v1.1".to_string()
}

fn default_vcs_type() -> String {
    "github".to_string()
}
