//! # Identity Provider Gateway
//!
//! Rotates a service identity's password in one UAA instance.
//!
//! [`UserDirectory`] is the capability a UAA instance has to offer: look up
//! users by name and set a password. [`UaaClient`] is its one HTTP
//! implementation. [`IdentityProviderGateway`] puts the rotation rules on top
//! and [`IdentityProviderRegistry`] holds one gateway per configured instance.

pub mod registry;
pub mod uaa;

pub use registry::IdentityProviderRegistry;
pub use uaa::{UaaClient, UaaConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{Error, Result};
use crate::secrets::{generate_password, SecretString};

/// A user record as returned by a UAA SCIM lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UaaUser {
    pub id: String,

    #[serde(rename = "userName")]
    pub user_name: String,

    #[serde(default)]
    pub origin: Option<String>,
}

/// Lookup and password-set operations of a single UAA instance.
///
/// Implementations MUST NOT log password values.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Configured instance ID (`X` in `CF_PASSWORD_X`).
    fn instance_id(&self) -> &str;

    /// All users whose user name equals `user_name` in the configured origin.
    async fn find_users(&self, user_name: &str) -> Result<Vec<UaaUser>>;

    /// Overwrite the password of `user_id`.
    async fn set_password(&self, user_id: &str, password: &SecretString) -> Result<()>;
}

/// Password rotation for service identities in one UAA instance.
#[derive(Clone)]
pub struct IdentityProviderGateway {
    directory: Arc<dyn UserDirectory>,
}

impl IdentityProviderGateway {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub fn instance_id(&self) -> &str {
        self.directory.instance_id()
    }

    /// Give `identity_name` a freshly generated password and return it.
    ///
    /// Exactly one password change happens on success and none on any error:
    /// - zero matching users is [`Error::IdentityNotFound`]
    /// - more than one is [`Error::IdentityAmbiguous`]
    pub async fn rotate_password(&self, identity_name: &str) -> Result<SecretString> {
        let instance = self.instance_id();
        debug!(identity = identity_name, instance, "Rotating password");

        let mut users = self.directory.find_users(identity_name).await?;
        let user = match users.len() {
            0 => return Err(Error::identity_not_found(identity_name, instance)),
            1 => users.remove(0),
            n => return Err(Error::identity_ambiguous(identity_name, instance, n)),
        };

        let password = generate_password();
        self.directory.set_password(&user.id, &password).await?;

        info!(identity = identity_name, instance, "Set password succeeded");
        Ok(password)
    }
}

impl std::fmt::Debug for IdentityProviderGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityProviderGateway").field("instance_id", &self.instance_id()).finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FakeDirectory;
    use super::*;

    #[tokio::test]
    async fn test_rotate_password_sets_exactly_once() {
        let directory = Arc::new(FakeDirectory::new("X").with_user("ci-acme-staging", "u-1"));
        let gateway = IdentityProviderGateway::new(directory.clone());

        let password = gateway.rotate_password("ci-acme-staging").await.unwrap();

        let changes = directory.password_changes();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].0, "u-1");
        assert_eq!(changes[0].1, password.expose_secret());
        assert_eq!(password.len(), 40);
    }

    #[tokio::test]
    async fn test_rotate_password_not_found_makes_no_change() {
        let directory = Arc::new(FakeDirectory::new("X"));
        let gateway = IdentityProviderGateway::new(directory.clone());

        let err = gateway.rotate_password("ci-acme-staging").await.unwrap_err();
        assert!(matches!(err, Error::IdentityNotFound { ref instance, .. } if instance == "X"));
        assert!(directory.password_changes().is_empty());
    }

    #[tokio::test]
    async fn test_rotate_password_ambiguous_makes_no_change() {
        let directory = Arc::new(
            FakeDirectory::new("Y")
                .with_user("ci-acme-staging", "u-1")
                .with_user("ci-acme-staging", "u-2"),
        );
        let gateway = IdentityProviderGateway::new(directory.clone());

        let err = gateway.rotate_password("ci-acme-staging").await.unwrap_err();
        assert!(matches!(err, Error::IdentityAmbiguous { matches: 2, .. }));
        assert!(directory.password_changes().is_empty());
    }

    #[tokio::test]
    async fn test_successive_rotations_differ() {
        let directory = Arc::new(FakeDirectory::new("X").with_user("ci-a-b", "u-1"));
        let gateway = IdentityProviderGateway::new(directory);

        let first = gateway.rotate_password("ci-a-b").await.unwrap();
        let second = gateway.rotate_password("ci-a-b").await.unwrap();
        assert_ne!(first, second);
    }
}
