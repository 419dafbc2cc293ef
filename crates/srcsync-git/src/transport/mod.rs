//! Git transport seam.
//!
//! The orchestrator never talks to libgit2 directly. It hands a fully
//! resolved option set to a [`GitTransport`] running on the blocking pool.
//! Each call carries its own credential, proxy and host key policy, so no
//! transport state outlives a call.

mod libgit;

use std::path::Path;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::RemoteAccess;
use crate::error::TransportFailure;
use crate::progress::ProgressSink;

pub use libgit::Git2Transport;

/// Depth requested for every network clone and pull.
pub const SHALLOW_DEPTH: u32 = 1;

/// Options for a fresh clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneOptions {
    /// Remote URL as given by the caller.
    pub url: String,
    /// Branch to check out; `None` selects the remote default branch.
    pub branch: Option<String>,
    /// History depth; `None` fetches full history.
    pub depth: Option<u32>,
    /// Fetch only the selected branch.
    pub single_branch: bool,
    /// Fetch tags.
    pub tags: bool,
    /// Recurse into submodules.
    pub recurse_submodules: bool,
    /// Credential, proxy and host key policy for this call.
    pub access: RemoteAccess,
}

impl CloneOptions {
    /// Shallow, single-branch, tagless clone of `url`.
    pub fn shallow(url: impl Into<String>, branch: Option<String>, access: RemoteAccess) -> Self {
        Self {
            url: url.into(),
            branch,
            depth: Some(SHALLOW_DEPTH),
            single_branch: true,
            tags: false,
            recurse_submodules: false,
            access,
        }
    }
}

/// Options for an incremental update of an existing working tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullOptions {
    /// Branch to update; `None` keeps the checked-out branch.
    pub branch: Option<String>,
    /// History depth; `None` fetches full history.
    pub depth: Option<u32>,
    /// Fetch tags.
    pub tags: bool,
    /// Credential, proxy and host key policy for this call.
    pub access: RemoteAccess,
}

impl PullOptions {
    /// Shallow, tagless update of `branch`.
    pub fn shallow(branch: Option<String>, access: RemoteAccess) -> Self {
        Self {
            branch,
            depth: Some(SHALLOW_DEPTH),
            tags: false,
            access,
        }
    }
}

/// Checked-out state of a working tree after a transport call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoHandle {
    /// Commit id at HEAD.
    pub head: String,
    /// Checked-out branch.
    pub branch: String,
}

/// Result of a pull.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The remote had nothing new.
    UpToDate(RepoHandle),
    /// The working tree moved to a new commit.
    Updated(RepoHandle),
}

impl PullOutcome {
    /// Returns the resulting working tree state.
    pub fn handle(&self) -> &RepoHandle {
        match self {
            Self::UpToDate(handle) | Self::Updated(handle) => handle,
        }
    }
}

/// Metadata of the commit at HEAD.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    /// Full commit id.
    pub id: String,
    /// First line of the message.
    pub summary: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Commit time, seconds since the Unix epoch.
    pub time: i64,
}

/// Blocking git operations.
///
/// Implementations must poll `cancel` from their progress callbacks and
/// abort with [`TransportFailure::Cancelled`] once it fires.
pub trait GitTransport: Send + Sync + std::fmt::Debug {
    /// Clones into `dest`, which must be absent or empty.
    fn clone_repo(
        &self,
        options: &CloneOptions,
        dest: &Path,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RepoHandle, TransportFailure>;

    /// Updates the working tree at `dest` from its `origin` remote.
    fn pull(
        &self,
        options: &PullOptions,
        dest: &Path,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PullOutcome, TransportFailure>;

    /// Reads the HEAD commit of the working tree at `dest`.
    fn last_commit(&self, dest: &Path) -> Result<CommitInfo, TransportFailure>;
}
