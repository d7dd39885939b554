//! Credentials supplied out-of-band through the environment.
//!
//! Each declared UAA instance needs `UAA_CLIENT_ID_<ID>` and
//! `UAA_CLIENT_SECRET_<ID>`; CircleCI needs `CIRCLE_TOKEN`. A missing variable
//! is a configuration error raised before any network call.

use std::collections::BTreeMap;

use crate::errors::{Error, Result};
use crate::secrets::SecretString;
use crate::topology::IdentityProviderInstance;

pub const CIRCLE_TOKEN_VAR: &str = "CIRCLE_TOKEN";

/// Client-credential grant inputs for one UAA instance.
#[derive(Debug, Clone)]
pub struct UaaClientCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    uaa: BTreeMap<String, UaaClientCredentials>,
    circle_token: SecretString,
}

impl Credentials {
    /// Resolve credentials from the process environment.
    pub fn from_env(instances: &[IdentityProviderInstance]) -> Result<Self> {
        Self::from_lookup(instances, |key| std::env::var(key).ok())
    }

    /// Resolve credentials through an arbitrary lookup function.
    pub fn from_lookup<F>(instances: &[IdentityProviderInstance], lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: String| -> Result<String> {
            lookup(&key)
                .ok_or_else(|| Error::config(format!("Must set {} environment variable", key)))
        };

        let mut uaa = BTreeMap::new();
        for instance in instances {
            let client_id = require(client_id_var(&instance.id))?;
            let client_secret = SecretString::new(require(client_secret_var(&instance.id))?);
            uaa.insert(instance.id.clone(), UaaClientCredentials { client_id, client_secret });
        }

        let circle_token = SecretString::new(require(CIRCLE_TOKEN_VAR.to_string())?);

        Ok(Self { uaa, circle_token })
    }

    pub fn uaa(&self, instance_id: &str) -> Result<&UaaClientCredentials> {
        self.uaa.get(instance_id).ok_or_else(|| {
            Error::config(format!("Must set {} environment variable", client_id_var(instance_id)))
        })
    }

    pub fn circle_token(&self) -> &SecretString {
        &self.circle_token
    }
}

pub fn client_id_var(instance_id: &str) -> String {
    format!("UAA_CLIENT_ID_{}", instance_id)
}

pub fn client_secret_var(instance_id: &str) -> String {
    format!("UAA_CLIENT_SECRET_{}", instance_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn instances() -> Vec<IdentityProviderInstance> {
        ["X", "Y"]
            .iter()
            .map(|id| IdentityProviderInstance {
                id: id.to_string(),
                api_href: "https://api.example.com".to_string(),
                uaa_href: None,
            })
            .collect()
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_all_credentials_present() {
        let vars = env(&[
            ("UAA_CLIENT_ID_X", "rotator-x"),
            ("UAA_CLIENT_SECRET_X", "secret-x"),
            ("UAA_CLIENT_ID_Y", "rotator-y"),
            ("UAA_CLIENT_SECRET_Y", "secret-y"),
            ("CIRCLE_TOKEN", "circle"),
        ]);

        let creds = Credentials::from_lookup(&instances(), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(creds.uaa("X").unwrap().client_id, "rotator-x");
        assert_eq!(creds.uaa("Y").unwrap().client_secret.expose_secret(), "secret-y");
        assert_eq!(creds.circle_token().expose_secret(), "circle");
    }

    #[test]
    fn test_missing_instance_secret_names_variable() {
        let vars = env(&[
            ("UAA_CLIENT_ID_X", "rotator-x"),
            ("UAA_CLIENT_SECRET_X", "secret-x"),
            ("UAA_CLIENT_ID_Y", "rotator-y"),
            ("CIRCLE_TOKEN", "circle"),
        ]);

        let err = Credentials::from_lookup(&instances(), |k| vars.get(k).cloned()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: Must set UAA_CLIENT_SECRET_Y environment variable"
        );
    }

    #[test]
    fn test_missing_circle_token() {
        let err = Credentials::from_lookup(&[], |_| None).unwrap_err();
        assert!(err.to_string().contains("CIRCLE_TOKEN"));
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let vars = env(&[
            ("UAA_CLIENT_ID_X", "rotator-x"),
            ("UAA_CLIENT_SECRET_X", "very-secret-x"),
            ("UAA_CLIENT_ID_Y", "rotator-y"),
            ("UAA_CLIENT_SECRET_Y", "very-secret-y"),
            ("CIRCLE_TOKEN", "very-secret-token"),
        ]);
        let creds = Credentials::from_lookup(&instances(), |k| vars.get(k).cloned()).unwrap();
        let debug = format!("{:?}", creds);
        assert!(!debug.contains("very-secret"));
    }
}
