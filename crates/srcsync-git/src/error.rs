//! Error types for the sync engine.

use std::io;
use std::path::PathBuf;

/// Boxed error used to carry unclassified causes.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Classified outcome of a failed sync.
///
/// This is the closed set surfaced to callers. Every variant has an
/// operator-facing message available through [`SyncError::operator_message`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The remote requires credentials and none were accepted.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The credentials were valid but lack access.
    #[error("authorization failed")]
    AuthorizationFailed,

    /// The remote repository does not exist.
    #[error("repository not found")]
    RepositoryNotFound,

    /// The remote repository has no refs.
    #[error("remote repository is empty")]
    EmptyRepository,

    /// The requested branch does not exist on the remote.
    #[error("branch {0} does not exist")]
    BranchNotFound(String),

    /// Both the tenant key and the fallback key were rejected.
    #[error("ssh authentication rejected for tenant and fallback keys")]
    AuthenticationRetryExhausted,

    /// The deadline expired before the sync finished.
    #[error("sync timed out after {minutes} minute(s)")]
    Timeout {
        /// The effective timeout
        minutes: u64,
    },

    /// Anything not covered above, with the original detail preserved.
    #[error("{0}")]
    Unknown(#[source] BoxError),
}

impl SyncError {
    /// Wraps an unclassified error.
    pub fn unknown(err: impl Into<BoxError>) -> Self {
        Self::Unknown(err.into())
    }

    /// Returns the message shown to operators in the build log.
    pub fn operator_message(&self) -> String {
        match self {
            Self::AuthenticationRequired => {
                "Fetching code failed: the code source requires authorized access.".to_string()
            },
            Self::AuthorizationFailed => {
                "Fetching code failed: authentication against the code source failed.".to_string()
            },
            Self::RepositoryNotFound => {
                "Fetching code failed: the repository does not exist.".to_string()
            },
            Self::EmptyRepository => {
                "Fetching code failed: the remote repository is empty.".to_string()
            },
            Self::BranchNotFound(branch) => format!("Code branch ({}) does not exist.", branch),
            Self::AuthenticationRetryExhausted => {
                "The remote repository requires an SSH key to be configured.".to_string()
            },
            Self::Timeout { .. } => "Fetching code timed out.".to_string(),
            Self::Unknown(e) => format!("Fetching code failed: {}", e),
        }
    }

    /// Returns true for the timeout outcome.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns true for credential related outcomes.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationRequired
                | Self::AuthorizationFailed
                | Self::AuthenticationRetryExhausted
        )
    }
}

/// Failure reported by a [`GitTransport`](crate::transport::GitTransport).
///
/// Produced at the library boundary and matched by kind; the
/// [`classify`](crate::classify) module turns it into a [`SyncError`].
#[derive(Debug, thiserror::Error)]
pub enum TransportFailure {
    /// Remote demanded credentials.
    #[error("authentication required")]
    AuthenticationRequired,

    /// Remote refused the presented credentials.
    #[error("authorization failed")]
    AuthorizationFailed,

    /// Remote repository missing.
    #[error("repository not found")]
    RepositoryNotFound,

    /// Remote advertised no refs.
    #[error("remote repository is empty")]
    EmptyRepository,

    /// A reference could not be resolved.
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// The SSH server rejected the offered key.
    #[error("ssh: unable to authenticate: {0}")]
    SshAuthRejected(String),

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,

    /// Unclassified library or I/O failure.
    #[error("{0}")]
    Other(#[source] BoxError),
}

impl TransportFailure {
    /// Wraps an unclassified error.
    pub fn other(err: impl Into<BoxError>) -> Self {
        Self::Other(err.into())
    }

    /// Returns true for the failure signature that triggers key fallback.
    pub fn is_ssh_auth_rejected(&self) -> bool {
        matches!(self, Self::SshAuthRejected(_))
    }
}

impl From<io::Error> for TransportFailure {
    fn from(err: io::Error) -> Self {
        Self::Other(Box::new(err))
    }
}

/// Errors raised while provisioning SSH key material.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Tenant id cannot be used as a key file name.
    #[error("invalid tenant id '{0}'")]
    InvalidTenant(String),

    /// RSA key generation failed.
    #[error("key generation failed: {0}")]
    Generate(#[from] rsa::Error),

    /// PKCS#1 encoding failed.
    #[error("private key encoding failed: {0}")]
    Pkcs1(#[from] rsa::pkcs1::Error),

    /// Authorized-key encoding failed.
    #[error("public key encoding failed: {0}")]
    SshKey(#[from] ssh_key::Error),

    /// Reading or writing a key file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The file involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl KeyError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
