//! # Torque
//!
//! Rotates the passwords of per-space CI service users in one or more UAA
//! instances and distributes the credentials to CircleCI projects as
//! environment variables.
//!
//! ## Architecture
//!
//! ```text
//! config.yaml → Topology ─┐
//!                         ├→ Orchestrator → IdentityProviderGateway → UAA
//! environment → Credentials┘             → CiProjectGateway        → CircleCI
//! ```
//!
//! ## Core Components
//!
//! - **Topology**: validated view of instances, orgs and spaces
//! - **Identity**: UAA user lookup and password replacement
//! - **CI**: project enablement and env var reconciliation
//! - **Rotation**: one sequential batch over every space

pub mod ci;
pub mod cli;
pub mod config;
pub mod errors;
pub(crate) mod http;
pub mod identity;
pub mod observability;
pub mod rotation;
pub mod secrets;
pub mod topology;

// Re-export commonly used types and traits
pub use config::{Credentials, Settings};
pub use errors::{Error, Result};
pub use rotation::{Orchestrator, RunSummary};
pub use topology::Topology;

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
