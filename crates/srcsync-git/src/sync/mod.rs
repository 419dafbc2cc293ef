//! Repository synchronization.
//!
//! [`GitSynchronizer`] brings a tenant's working tree in line with its
//! remote: an incremental update when a checkout already exists, a fresh
//! shallow clone otherwise, one SSH key fallback, and a single deadline
//! over the whole call.

mod orchestrator;
mod retry;

use std::path::{Path, PathBuf};

use serde::Serialize;

pub use orchestrator::{CANCEL_GRACE, GitSynchronizer, effective_timeout_minutes};
pub use retry::AuthAttempt;

use crate::error::SyncError;
use crate::keys::KeyIdentity;
use crate::transport::{CommitInfo, Git2Transport, GitTransport};

/// How the working tree reached its current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    /// Freshly cloned.
    Cloned,
    /// Moved to a newer upstream commit.
    Updated,
    /// Upstream had nothing new.
    UpToDate,
}

/// A synchronized working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncedRepository {
    /// Working tree location.
    pub path: PathBuf,
    /// Commit id at HEAD.
    pub head: String,
    /// Checked-out branch.
    pub branch: String,
    /// What the sync did.
    pub status: SyncStatus,
    /// SSH key that authenticated, for SSH remotes.
    pub identity: Option<KeyIdentity>,
}

impl SyncedRepository {
    /// Returns the working tree location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the HEAD commit of the working tree.
    ///
    /// Blocking; call from a blocking context.
    pub fn last_commit(&self) -> Result<CommitInfo, SyncError> {
        Git2Transport::new()
            .last_commit(&self.path)
            .map_err(SyncError::unknown)
    }
}
