//! # Rotation Orchestrator
//!
//! One run walks every (organization, space) in declaration order. For each
//! space it:
//! 1. enables every repo in CircleCI and pushes the static facts
//!    (`CF_ORG`, `CF_SPACE`, `CF_USERNAME`, `CF_API_<ID>`) create-if-absent
//! 2. for each applicable UAA instance, rotates the CI user's password and
//!    pushes `CF_PASSWORD_<ID>` to every repo, replacing the old value
//!
//! Processing is sequential and stops at the first error. A password is always
//! distributed before the next instance is rotated.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{info, instrument, warn};

use crate::ci::{CiProjectGateway, DesiredEnvVarSet};
use crate::errors::Result;
use crate::identity::IdentityProviderRegistry;
use crate::topology::{
    service_identity_name, IdentityProviderInstance, Organization, Space, Topology,
};

pub const CF_ORG: &str = "CF_ORG";
pub const CF_SPACE: &str = "CF_SPACE";
pub const CF_USERNAME: &str = "CF_USERNAME";

/// `CF_API_<ID>`
pub fn api_var(instance_id: &str) -> String {
    format!("CF_API_{}", instance_id)
}

/// `CF_PASSWORD_<ID>`
pub fn password_var(instance_id: &str) -> String {
    format!("CF_PASSWORD_{}", instance_id)
}

/// Static variables for every repo of a space.
pub fn static_env_vars(
    org: &Organization,
    space: &Space,
    instances: &[&IdentityProviderInstance],
) -> DesiredEnvVarSet {
    let mut desired = DesiredEnvVarSet::new()
        .set_once(CF_ORG, org.name.as_str())
        .set_once(CF_SPACE, space.name.as_str())
        .set_once(CF_USERNAME, service_identity_name(&org.name, &space.name));

    for instance in instances {
        desired = desired.set_once(api_var(&instance.id), instance.api_href.as_str());
    }
    desired
}

/// Run-level counters reported at the end of a successful run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Distinct repositories touched
    pub repos_processed: usize,
    /// One per successful instance rotation
    pub secrets_rotated: usize,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} secrets rotated in {} repos", self.secrets_rotated, self.repos_processed)
    }
}

#[derive(Default)]
struct RunState {
    repos: BTreeSet<String>,
    secrets_rotated: usize,
}

impl RunState {
    fn summary(&self) -> RunSummary {
        RunSummary { repos_processed: self.repos.len(), secrets_rotated: self.secrets_rotated }
    }
}

pub struct Orchestrator {
    identity: IdentityProviderRegistry,
    ci: CiProjectGateway,
}

impl Orchestrator {
    pub fn new(identity: IdentityProviderRegistry, ci: CiProjectGateway) -> Self {
        Self { identity, ci }
    }

    /// Rotate and distribute for every space in `topology`.
    pub async fn run(&self, topology: &Topology) -> Result<RunSummary> {
        let mut state = RunState::default();

        for (org, space) in topology.spaces() {
            self.process_space(topology, org, space, &mut state).await?;
        }

        let summary = state.summary();
        info!(
            repos_processed = summary.repos_processed,
            secrets_rotated = summary.secrets_rotated,
            "Rotation run finished"
        );
        Ok(summary)
    }

    #[instrument(skip_all, fields(org = %org.name, space = %space.name))]
    async fn process_space(
        &self,
        topology: &Topology,
        org: &Organization,
        space: &Space,
        state: &mut RunState,
    ) -> Result<()> {
        let identity = service_identity_name(&org.name, &space.name);
        let instances = topology.applicable_instances(space);
        info!(identity = %identity, instances = instances.len(), "Processing space");

        let statics = static_env_vars(org, space, &instances);
        for repo in &space.repos {
            self.ci.enable_building(repo).await?;
            self.ci.reconcile_env_vars(repo, &statics).await?;
            state.repos.insert(repo.clone());
        }

        if space.repos.is_empty() {
            warn!(
                identity = %identity,
                "Space has no repos, rotated passwords will not be distributed"
            );
        }

        for instance in instances {
            let gateway = self.identity.get(&instance.id)?;
            let password = gateway.rotate_password(&identity).await?;
            state.secrets_rotated += 1;

            let desired = DesiredEnvVarSet::new().overwrite(password_var(&instance.id), password);
            for repo in &space.repos {
                self.ci.reconcile_env_vars(repo, &desired).await?;
            }

            info!(identity = %identity, instance = %instance.id, "Successfully rotated");
        }

        Ok(())
    }
}
