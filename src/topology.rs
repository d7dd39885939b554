//! # Topology Model
//!
//! Organizations, spaces and the CircleCI repositories that deploy into each
//! space, plus the UAA instances a space's CI user lives in. Pure data: the
//! only behavior is validation and the derived lookups the orchestrator needs.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ci::RepoRef;
use crate::errors::{Error, Result};

/// One Cloud Foundry deployment and the UAA instance behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct IdentityProviderInstance {
    /// Short identifier, used as the suffix of `CF_API_<ID>` / `CF_PASSWORD_<ID>`
    #[validate(length(min = 1, message = "Instance ID cannot be empty"))]
    pub id: String,

    /// Cloud Controller API endpoint
    #[validate(url(message = "api_href must be a valid URL"))]
    pub api_href: String,

    /// UAA endpoint. Discovered from the API root document when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(url(message = "uaa_href must be a valid URL"))]
    pub uaa_href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Organization {
    #[validate(length(min = 1, message = "Organization name cannot be empty"))]
    pub name: String,

    #[serde(default)]
    #[validate(nested)]
    pub spaces: Vec<Space>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct Space {
    #[validate(length(min = 1, message = "Space name cannot be empty"))]
    pub name: String,

    /// CircleCI projects as `account/project`
    #[serde(default)]
    pub repos: Vec<String>,

    /// Instance IDs this space does not deploy to
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub skip_ids: BTreeSet<String>,
}

impl Space {
    pub fn new(name: impl Into<String>, repos: Vec<String>) -> Self {
        Self { name: name.into(), repos, skip_ids: BTreeSet::new() }
    }

    pub fn with_skip_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.skip_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn skips(&self, instance_id: &str) -> bool {
        self.skip_ids.contains(instance_id)
    }
}

/// The complete, validated set of instances and organizations for one run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Topology {
    instances: Vec<IdentityProviderInstance>,
    orgs: Vec<Organization>,
}

impl Topology {
    /// Build a topology, rejecting it if any invariant does not hold.
    ///
    /// Checked here:
    /// - instance IDs are unique
    /// - every skip ID names a declared instance
    /// - every repo is `account/project`
    pub fn new(instances: Vec<IdentityProviderInstance>, orgs: Vec<Organization>) -> Result<Self> {
        let topology = Self { instances, orgs };
        topology.validate()?;
        Ok(topology)
    }

    fn validate(&self) -> Result<()> {
        let mut declared = HashSet::new();
        for instance in &self.instances {
            if !declared.insert(instance.id.as_str()) {
                return Err(Error::config(format!("duplicate CF ID: {}", instance.id)));
            }
        }

        for (_, space) in self.spaces() {
            let unknown = space.skip_ids.iter().find(|id| !declared.contains(id.as_str()));
            if let Some(unknown) = unknown {
                return Err(Error::config(format!("skipped ID not found in CFs: {}", unknown)));
            }
            for repo in &space.repos {
                RepoRef::parse(repo)?;
            }
        }

        Ok(())
    }

    pub fn instances(&self) -> &[IdentityProviderInstance] {
        &self.instances
    }

    pub fn orgs(&self) -> &[Organization] {
        &self.orgs
    }

    /// Every (organization, space) pair in declaration order.
    pub fn spaces(&self) -> impl Iterator<Item = (&Organization, &Space)> {
        self.orgs.iter().flat_map(|org| org.spaces.iter().map(move |space| (org, space)))
    }

    /// Instances this space rotates and distributes to, in declaration order.
    pub fn applicable_instances<'a>(&'a self, space: &Space) -> Vec<&'a IdentityProviderInstance> {
        self.instances.iter().filter(|instance| !space.skips(&instance.id)).collect()
    }
}

/// Name of the CI user for a space: `ci-<org>-<space>`.
///
/// Case is preserved; callers control normalization.
pub fn service_identity_name(org: &str, space: &str) -> String {
    format!("ci-{}-{}", org, space)
}
