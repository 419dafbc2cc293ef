//! Failure classification.
//!
//! libgit2 failures are tagged once, at the transport boundary, into a
//! [`TransportFailure`]. The orchestrator then folds those tags into the
//! closed [`SyncError`] set with [`classify`].

use git2::{ErrorClass, ErrorCode};

use crate::error::{SyncError, TransportFailure};

/// Message of the error raised when no credential can be offered.
pub(crate) const AUTH_REQUIRED: &str = "authentication required by remote";

/// Message of the error raised when offered HTTP credentials are asked for
/// again, which libgit2 only does after a 401.
pub(crate) const CREDENTIALS_REJECTED: &str =
    "authentication failed: credentials rejected by remote";

/// Message of the error raised when an offered SSH key is asked for again.
pub(crate) const SSH_KEY_REJECTED: &str = "ssh: unable to authenticate, key rejected by remote";

/// Folds a transport failure into the caller-facing error set.
///
/// `branch` is the branch the caller asked for, used to name
/// [`SyncError::BranchNotFound`]. `timeout_minutes` is reported when the
/// failure was a cancellation.
pub fn classify(failure: TransportFailure, branch: Option<&str>, timeout_minutes: u64) -> SyncError {
    match failure {
        TransportFailure::AuthenticationRequired => SyncError::AuthenticationRequired,
        TransportFailure::AuthorizationFailed => SyncError::AuthorizationFailed,
        TransportFailure::RepositoryNotFound => SyncError::RepositoryNotFound,
        TransportFailure::EmptyRepository => SyncError::EmptyRepository,
        TransportFailure::ReferenceNotFound(reference) => SyncError::BranchNotFound(
            branch
                .map(str::to_string)
                .unwrap_or_else(|| short_ref(&reference).to_string()),
        ),
        TransportFailure::SshAuthRejected(_) => SyncError::AuthenticationRetryExhausted,
        TransportFailure::Cancelled => SyncError::Timeout {
            minutes: timeout_minutes,
        },
        TransportFailure::Other(e) => SyncError::Unknown(e),
    }
}

fn short_ref(reference: &str) -> &str {
    reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.strip_prefix("refs/remotes/origin/"))
        .unwrap_or(reference)
}

impl From<git2::Error> for TransportFailure {
    fn from(err: git2::Error) -> Self {
        let message = err.message().to_string();
        let lower = message.to_ascii_lowercase();

        if err.code() == ErrorCode::User {
            return Self::Cancelled;
        }

        if message.starts_with(SSH_KEY_REJECTED)
            || (err.class() == ErrorClass::Ssh
                && (err.code() == ErrorCode::Auth
                    || lower.contains("authenticat")
                    || lower.contains("publickey")))
        {
            return Self::SshAuthRejected(message);
        }

        if lower.contains("status code: 403") {
            return Self::AuthorizationFailed;
        }

        if message.starts_with(AUTH_REQUIRED)
            || message.starts_with(CREDENTIALS_REJECTED)
            || err.code() == ErrorCode::Auth
            || lower.contains("status code: 401")
            || lower.contains("authentication replays")
        {
            return Self::AuthenticationRequired;
        }

        if (err.class() == ErrorClass::Reference && err.code() == ErrorCode::NotFound)
            || lower.contains("remote branch")
            || lower.contains("revspec")
        {
            return Self::ReferenceNotFound(quoted(&message).unwrap_or(&message).to_string());
        }

        if lower.contains("status code: 404")
            || lower.contains("repository not found")
            || lower.contains("could not find repository")
            || lower.contains("does not appear to be a git repository")
            || lower.contains("failed to resolve path")
            || (err.code() == ErrorCode::NotFound
                && matches!(
                    err.class(),
                    ErrorClass::Http | ErrorClass::Net | ErrorClass::Repository | ErrorClass::Os
                ))
        {
            return Self::RepositoryNotFound;
        }

        Self::Other(Box::new(err))
    }
}

fn quoted(message: &str) -> Option<&str> {
    let start = message.find('\'')? + 1;
    let len = message[start..].find('\'')?;
    Some(&message[start..start + len])
}
