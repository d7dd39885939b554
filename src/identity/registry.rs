//! One [`IdentityProviderGateway`] per configured UAA instance.
//!
//! Built once at startup and handed to the orchestrator; there is no
//! process-wide client map.

use std::sync::Arc;

use tracing::info;

use super::{IdentityProviderGateway, UaaClient, UaaConfig, UserDirectory};
use crate::config::{Credentials, Settings};
use crate::errors::{Error, Result};
use crate::topology::Topology;

#[derive(Debug, Clone, Default)]
pub struct IdentityProviderRegistry {
    gateways: Vec<IdentityProviderGateway>,
}

impl IdentityProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect to every instance in the topology, in declaration order.
    ///
    /// The first instance that cannot be reached or authenticated against
    /// fails the whole call.
    pub async fn connect(
        topology: &Topology,
        settings: &Settings,
        credentials: &Credentials,
        verbose: bool,
    ) -> Result<Self> {
        let mut registry = Self::new();

        for instance in topology.instances() {
            let config = UaaConfig {
                instance_id: instance.id.clone(),
                api_href: instance.api_href.clone(),
                uaa_href: instance.uaa_href.clone(),
                origin: settings.uaa_origin.clone(),
                credentials: credentials.uaa(&instance.id)?.clone(),
                timeout: settings.timeout(),
                verbose,
            };
            let client = UaaClient::connect(config).await?;
            info!(instance = %instance.id, target = %client.target(), "Connected to uaa");

            registry.register(Arc::new(client))?;
        }

        Ok(registry)
    }

    /// Add a directory under its own instance ID.
    pub fn register(&mut self, directory: Arc<dyn UserDirectory>) -> Result<()> {
        if self.gateways.iter().any(|g| g.instance_id() == directory.instance_id()) {
            return Err(Error::config(format!(
                "UAA instance {} registered twice",
                directory.instance_id()
            )));
        }
        self.gateways.push(IdentityProviderGateway::new(directory));
        Ok(())
    }

    pub fn get(&self, instance_id: &str) -> Result<&IdentityProviderGateway> {
        self.gateways.iter().find(|g| g.instance_id() == instance_id).ok_or_else(|| {
            Error::config(format!("No UAA client configured for instance {}", instance_id))
        })
    }

    pub fn len(&self) -> usize {
        self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}
