//! # Error Handling
//!
//! Error types for a rotation run. Every failure propagates to the top of the
//! run and aborts it; only the binary decides how the process exits.

use thiserror::Error;

/// Custom result type for torque operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for a rotation run
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid topology or missing credential, detected before any network call.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Bad credentials against an identity provider or the CI backend.
    #[error("Authentication failed for {service}: {message}")]
    Authentication { service: String, message: String },

    /// The service identity does not exist in an identity provider instance.
    #[error("User {identity} not found in UAA instance {instance}")]
    IdentityNotFound { identity: String, instance: String },

    /// The lookup for a service identity returned more than one user.
    #[error("User {identity} is ambiguous in UAA instance {instance}: {matches} matches")]
    IdentityAmbiguous { identity: String, instance: String, matches: usize },

    /// A repository reference that is not exactly `account/project`.
    #[error("Bad repo string: {reference}. Must be like 'org/foo'")]
    MalformedRepoReference { reference: String },

    /// The CI backend does not know the repository.
    #[error("Repository not found in CI: {repo}")]
    RepoNotFound { repo: String },

    /// Network failure, timeout, rate limit or server-side error. Never retried.
    #[error("Transient API error from {service}: {message}")]
    TransientApi { service: String, message: String },

    /// A non-success response that fits no other category.
    #[error("Unexpected response from {service} (status: {status}): {message}")]
    UnexpectedResponse { service: String, status: u16, message: String },

    /// I/O errors (reading the configuration file)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an authentication error
    pub fn authentication(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication { service: service.into(), message: message.into() }
    }

    /// Create an identity not found error
    pub fn identity_not_found(identity: impl Into<String>, instance: impl Into<String>) -> Self {
        Self::IdentityNotFound { identity: identity.into(), instance: instance.into() }
    }

    /// Create an identity ambiguous error
    pub fn identity_ambiguous(
        identity: impl Into<String>,
        instance: impl Into<String>,
        matches: usize,
    ) -> Self {
        Self::IdentityAmbiguous { identity: identity.into(), instance: instance.into(), matches }
    }

    /// Create a malformed repository reference error
    pub fn malformed_repo(reference: impl Into<String>) -> Self {
        Self::MalformedRepoReference { reference: reference.into() }
    }

    /// Create a repository not found error
    pub fn repo_not_found(repo: impl Into<String>) -> Self {
        Self::RepoNotFound { repo: repo.into() }
    }

    /// Create a transient API error
    pub fn transient(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TransientApi { service: service.into(), message: message.into() }
    }

    /// Create an unexpected response error
    pub fn unexpected(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::UnexpectedResponse { service: service.into(), status, message: message.into() }
    }

    /// Whether a retry layer could reasonably try this operation again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientApi { .. })
    }

    /// Classify a failed HTTP response shared by the UAA and CircleCI clients.
    ///
    /// 404 is left to the caller since its meaning depends on the endpoint.
    pub(crate) fn from_status(service: &str, status: u16, body: String) -> Self {
        match status {
            401 | 403 => Self::authentication(service, format!("status {status}: {body}")),
            429 | 500..=599 => Self::transient(service, format!("status {status}: {body}")),
            _ => Self::unexpected(service, status, body),
        }
    }

    /// Classify a transport-level reqwest failure.
    ///
    /// Connect, timeout and send failures are transient. Builder, redirect and
    /// decode failures are not.
    pub(crate) fn from_reqwest(service: &str, error: reqwest::Error) -> Self {
        if error.is_connect() || error.is_timeout() || error.is_request() {
            return Self::transient(service, error.to_string());
        }
        if error.is_decode() {
            return Self::unexpected(
                service,
                error.status().map(|s| s.as_u16()).unwrap_or(200),
                format!("Failed to decode response: {error}"),
            );
        }
        let status = error.status().map(|s| s.as_u16()).unwrap_or(0);
        Self::unexpected(service, status, error.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut messages = Vec::new();
        collect_validation_messages("", &errors, &mut messages);
        Self::config(format!("Validation failed: {}", messages.join("; ")))
    }
}

fn collect_validation_messages(
    prefix: &str,
    errors: &validator::ValidationErrors,
    out: &mut Vec<String>,
) {
    use validator::ValidationErrorsKind;

    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() { field.to_string() } else { format!("{prefix}.{field}") };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                let details: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or_else(|| e.code.to_string(), |m| m.to_string())
                    })
                    .collect();
                out.push(format!("{}: {}", path, details.join(", ")));
            }
            ValidationErrorsKind::Struct(inner) => collect_validation_messages(&path, inner, out),
            ValidationErrorsKind::List(items) => {
                for (index, inner) in items {
                    collect_validation_messages(&format!("{path}[{index}]"), inner, out);
                }
            }
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(error: serde_yaml::Error) -> Self {
        Self::config(format!("Failed to parse configuration: {error}"))
    }
}
