//! Error types for the provisioning stages.

use directory::ClientError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a stage.
///
/// Degraded steps and advisory verification mismatches are not errors; they
/// are recorded as items on the stage report. Everything here is fatal.
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Operator input failed validation before any remote call.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The site locator is not a collaboration-site URL.
    #[error("Invalid site URL '{url}': {reason}")]
    InvalidSiteUrl { url: String, reason: String },

    /// Certificate generation, export, or passphrase validation failed.
    #[error(transparent)]
    Credential(#[from] credentials::CredentialError),

    /// No session could be established with a remote service.
    #[error("Authentication failed for {resource}: {reason}")]
    Authentication { resource: String, reason: String },

    /// A required remote call failed with no recognised recovery.
    #[error("{operation} failed: {source}")]
    Remote {
        operation: String,
        #[source]
        source: ClientError,
    },

    /// The application to grant permissions to does not exist.
    #[error("Application {0} was not found in the directory")]
    ApplicationNotFound(String),

    /// No state file at the expected location.
    #[error("Provisioning state not found at {}; run the identity stage first or pass --app-id", .0.display())]
    StateMissing(PathBuf),

    /// The state file was written by an incompatible version.
    #[error("Provisioning state at {} has schema version {found}, expected {expected}", .path.display())]
    StateIncompatible {
        path: PathBuf,
        found: String,
        expected: u32,
    },

    /// The state file could not be parsed.
    #[error("Provisioning state at {} is malformed: {reason}", .path.display())]
    StateMalformed { path: PathBuf, reason: String },

    /// The grant catalog is unreadable or inconsistent.
    #[error("Invalid grant catalog: {0}")]
    Catalog(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProvisioningError {
    /// Wrap a client failure, lifting authentication failures out so they
    /// are reported as pre-flight errors.
    pub fn remote(operation: impl Into<String>, source: ClientError) -> Self {
        match source {
            ClientError::Authentication { resource, reason } => {
                Self::Authentication { resource, reason }
            }
            source => Self::Remote {
                operation: operation.into(),
                source,
            },
        }
    }

    /// True for failures raised before any remote mutation was attempted.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput(_)
                | Self::InvalidSiteUrl { .. }
                | Self::Authentication { .. }
                | Self::StateMissing(_)
                | Self::StateIncompatible { .. }
                | Self::StateMalformed { .. }
                | Self::Catalog(_)
                | Self::Credential(credentials::CredentialError::PassphraseTooShort { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, ProvisioningError>;
