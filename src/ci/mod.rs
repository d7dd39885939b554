//! # CI Project Gateway
//!
//! Enables CircleCI projects and reconciles their environment variables.
//!
//! [`EnvVarStore`] is what the CI backend offers per project: enable building,
//! list variable names, add a variable, delete a variable. Values cannot be
//! read back and a named variable cannot be updated in place, so
//! [`CiProjectGateway::reconcile_env_vars`] works from presence alone:
//! - names marked overwrite are deleted (if present) and recreated
//! - every other name is created only when absent

pub mod circle;

pub use circle::{CircleClient, CircleConfig};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// A CircleCI project reference, `account/project`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoRef {
    pub account: String,
    pub project: String,
}

impl RepoRef {
    /// Split `account/project`. Anything but exactly two non-empty segments
    /// is rejected.
    pub fn parse(reference: &str) -> Result<Self> {
        let mut parts = reference.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(account), Some(project), None) if !account.is_empty() && !project.is_empty() => {
                Ok(Self { account: account.to_string(), project: project.to_string() })
            }
            _ => Err(Error::malformed_repo(reference)),
        }
    }
}

impl FromStr for RepoRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account, self.project)
    }
}

/// Per-project operations of the CI backend.
///
/// Implementations MUST NOT log variable values.
#[async_trait]
pub trait EnvVarStore: Send + Sync {
    /// Start building the project. Enabling an enabled project succeeds.
    async fn enable_project(&self, repo: &RepoRef) -> Result<()>;

    /// Names of the variables currently stored on the project.
    async fn list_env_var_names(&self, repo: &RepoRef) -> Result<Vec<String>>;

    async fn add_env_var(&self, repo: &RepoRef, name: &str, value: &SecretString) -> Result<()>;

    async fn delete_env_var(&self, repo: &RepoRef, name: &str) -> Result<()>;
}

/// Variables one repository should end up holding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DesiredEnvVarSet {
    values: BTreeMap<String, SecretString>,
    overwrite: BTreeSet<String>,
}

impl DesiredEnvVarSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable that is only created when absent.
    pub fn set_once(mut self, name: impl Into<String>, value: impl Into<SecretString>) -> Self {
        let name = name.into();
        self.overwrite.remove(&name);
        self.values.insert(name, value.into());
        self
    }

    /// Add a variable that always replaces an existing one of the same name.
    pub fn overwrite(mut self, name: impl Into<String>, value: impl Into<SecretString>) -> Self {
        let name = name.into();
        self.overwrite.insert(name.clone());
        self.values.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&SecretString> {
        self.values.get(name)
    }

    pub fn is_overwrite(&self, name: &str) -> bool {
        self.overwrite.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// What one reconcile call did to a repository.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub created: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

#[derive(Clone)]
pub struct CiProjectGateway {
    store: Arc<dyn EnvVarStore>,
}

impl CiProjectGateway {
    pub fn new(store: Arc<dyn EnvVarStore>) -> Self {
        Self { store }
    }

    /// Make sure CircleCI builds `repo`.
    pub async fn enable_building(&self, repo: &str) -> Result<()> {
        let repo = RepoRef::parse(repo)?;
        debug!(repo = %repo, "Ensuring circleci is building this repo");
        self.store.enable_project(&repo).await
    }

    /// Push `desired` to `repo` following the presence-only rules of the module.
    pub async fn reconcile_env_vars(
        &self,
        repo: &str,
        desired: &DesiredEnvVarSet,
    ) -> Result<ReconcileOutcome> {
        let repo = RepoRef::parse(repo)?;
        let existing: BTreeSet<String> =
            self.store.list_env_var_names(&repo).await?.into_iter().collect();

        let mut outcome = ReconcileOutcome::default();
        for (name, value) in &desired.values {
            let present = existing.contains(name);

            if desired.is_overwrite(name) {
                if present {
                    self.store.delete_env_var(&repo, name).await?;
                    outcome.replaced += 1;
                } else {
                    outcome.created += 1;
                }
                self.store.add_env_var(&repo, name, value).await?;
            } else if present {
                outcome.unchanged += 1;
            } else {
                self.store.add_env_var(&repo, name, value).await?;
                outcome.created += 1;
            }
        }

        debug!(
            repo = %repo,
            created = outcome.created,
            replaced = outcome.replaced,
            unchanged = outcome.unchanged,
            "Reconciled environment variables"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`EnvVarStore`] that records every call.

    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum StoreCall {
        Enable(String),
        Create(String, String),
        Delete(String, String),
    }

    #[derive(Default)]
    pub struct FakeStore {
        pub known: Mutex<HashSet<String>>,
        pub vars: Mutex<HashMap<String, BTreeMap<String, String>>>,
        pub calls: Mutex<Vec<StoreCall>>,
    }

    impl FakeStore {
        pub fn with_repos(repos: &[&str]) -> Self {
            let store = Self::default();
            store.known.lock().unwrap().extend(repos.iter().map(|r| r.to_string()));
            store
        }

        pub fn preset(&self, repo: &str, name: &str, value: &str) {
            self.vars
                .lock()
                .unwrap()
                .entry(repo.to_string())
                .or_default()
                .insert(name.to_string(), value.to_string());
        }

        pub fn vars(&self, repo: &str) -> BTreeMap<String, String> {
            self.vars.lock().unwrap().get(repo).cloned().unwrap_or_default()
        }

        pub fn calls(&self) -> Vec<StoreCall> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, repo: &RepoRef) -> Result<String> {
            let key = repo.to_string();
            if self.known.lock().unwrap().contains(&key) {
                Ok(key)
            } else {
                Err(Error::repo_not_found(key))
            }
        }
    }

    #[async_trait]
    impl EnvVarStore for FakeStore {
        async fn enable_project(&self, repo: &RepoRef) -> Result<()> {
            let key = self.check(repo)?;
            self.calls.lock().unwrap().push(StoreCall::Enable(key));
            Ok(())
        }

        async fn list_env_var_names(&self, repo: &RepoRef) -> Result<Vec<String>> {
            let key = self.check(repo)?;
            Ok(self.vars(&key).into_keys().collect())
        }

        async fn add_env_var(
            &self,
            repo: &RepoRef,
            name: &str,
            value: &SecretString,
        ) -> Result<()> {
            let key = self.check(repo)?;
            self.preset(&key, name, value.expose_secret());
            self.calls.lock().unwrap().push(StoreCall::Create(key, name.to_string()));
            Ok(())
        }

        async fn delete_env_var(&self, repo: &RepoRef, name: &str) -> Result<()> {
            let key = self.check(repo)?;
            self.vars.lock().unwrap().entry(key.clone()).or_default().remove(name);
            self.calls.lock().unwrap().push(StoreCall::Delete(key, name.to_string()));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeStore, StoreCall};
    use super::*;

    fn statics() -> DesiredEnvVarSet {
        DesiredEnvVarSet::new()
            .set_once("CF_ORG", "acme")
            .set_once("CF_SPACE", "staging")
            .set_once("CF_USERNAME", "ci-acme-staging")
    }

    #[test]
    fn test_repo_ref_parse() {
        let repo = RepoRef::parse("org/repo").unwrap();
        assert_eq!(repo.account, "org");
        assert_eq!(repo.project, "repo");
        assert_eq!(repo.to_string(), "org/repo");

        for bad in ["org", "org/repo/extra", "", "org/", "/repo"] {
            assert!(
                matches!(RepoRef::parse(bad), Err(Error::MalformedRepoReference { .. })),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_repo_ref_from_str() {
        let repo: RepoRef = "govau/torque".parse().unwrap();
        assert_eq!(repo.project, "torque");
    }

    #[test]
    fn test_desired_set_overwrite_flag() {
        let desired = statics().overwrite("CF_PASSWORD_X", "pw");
        assert!(desired.is_overwrite("CF_PASSWORD_X"));
        assert!(!desired.is_overwrite("CF_ORG"));
        assert_eq!(desired.len(), 4);

        let downgraded = desired.set_once("CF_PASSWORD_X", "pw");
        assert!(!downgraded.is_overwrite("CF_PASSWORD_X"));
    }

    #[tokio::test]
    async fn test_static_push_is_idempotent() {
        let store = Arc::new(FakeStore::with_repos(&["acme/svc-a"]));
        let gateway = CiProjectGateway::new(store.clone());

        let first = gateway.reconcile_env_vars("acme/svc-a", &statics()).await.unwrap();
        let after_first = store.vars("acme/svc-a");
        let calls_after_first = store.calls().len();

        let second = gateway.reconcile_env_vars("acme/svc-a", &statics()).await.unwrap();

        assert_eq!(first.created, 3);
        assert_eq!(second, ReconcileOutcome { created: 0, replaced: 0, unchanged: 3 });
        assert_eq!(store.vars("acme/svc-a"), after_first);
        assert_eq!(store.calls().len(), calls_after_first);
    }

    #[tokio::test]
    async fn test_static_push_leaves_existing_value() {
        let store = Arc::new(FakeStore::with_repos(&["acme/svc-a"]));
        store.preset("acme/svc-a", "CF_ORG", "set-by-hand");
        let gateway = CiProjectGateway::new(store.clone());

        gateway.reconcile_env_vars("acme/svc-a", &statics()).await.unwrap();
        assert_eq!(store.vars("acme/svc-a")["CF_ORG"], "set-by-hand");
    }

    #[tokio::test]
    async fn test_overwrite_existing_is_delete_then_create() {
        let store = Arc::new(FakeStore::with_repos(&["acme/svc-a"]));
        store.preset("acme/svc-a", "CF_PASSWORD_X", "old");
        let gateway = CiProjectGateway::new(store.clone());

        let desired = DesiredEnvVarSet::new().overwrite("CF_PASSWORD_X", "new");
        let outcome = gateway.reconcile_env_vars("acme/svc-a", &desired).await.unwrap();

        assert_eq!(outcome.replaced, 1);
        assert_eq!(
            store.calls(),
            vec![
                StoreCall::Delete("acme/svc-a".into(), "CF_PASSWORD_X".into()),
                StoreCall::Create("acme/svc-a".into(), "CF_PASSWORD_X".into()),
            ]
        );
        assert_eq!(store.vars("acme/svc-a")["CF_PASSWORD_X"], "new");
    }

    #[tokio::test]
    async fn test_overwrite_absent_is_single_create() {
        let store = Arc::new(FakeStore::with_repos(&["acme/svc-a"]));
        let gateway = CiProjectGateway::new(store.clone());

        let desired = DesiredEnvVarSet::new().overwrite("CF_PASSWORD_X", "new");
        gateway.reconcile_env_vars("acme/svc-a", &desired).await.unwrap();

        assert_eq!(
            store.calls(),
            vec![StoreCall::Create("acme/svc-a".into(), "CF_PASSWORD_X".into())]
        );
    }

    #[tokio::test]
    async fn test_malformed_repo_makes_no_calls() {
        let store = Arc::new(FakeStore::with_repos(&["acme/svc-a"]));
        let gateway = CiProjectGateway::new(store.clone());

        let err = gateway.reconcile_env_vars("acme", &statics()).await.unwrap_err();
        assert!(matches!(err, Error::MalformedRepoReference { .. }));
        assert!(gateway.enable_building("a/b/c").await.is_err());
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_repo_is_not_found() {
        let store = Arc::new(FakeStore::with_repos(&[]));
        let gateway = CiProjectGateway::new(store);

        let err = gateway.enable_building("acme/ghost").await.unwrap_err();
        assert!(matches!(err, Error::RepoNotFound { .. }));
    }
}
