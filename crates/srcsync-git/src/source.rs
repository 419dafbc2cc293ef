//! Source synchronization trait definition.

use std::path::Path;

use async_trait::async_trait;

use srcsync_core::SourceDescriptor;

use crate::error::{KeyError, SyncError};
use crate::sync::SyncedRepository;
use crate::transport::CommitInfo;

/// A backend able to materialize a build's source tree.
///
/// The build pipeline depends on this trait only, so tests and alternative
/// backends can stand in for [`GitSynchronizer`](crate::GitSynchronizer).
///
/// # Example
///
/// ```ignore
/// use srcsync_git::{GitSynchronizer, SourceSync};
///
/// let sync = GitSynchronizer::new(&settings, None);
/// let repo = sync.sync(&descriptor, &dest, 10).await?;
/// println!("{} at {}", repo.branch, repo.head);
/// ```
#[async_trait]
pub trait SourceSync: Send + Sync {
    /// Brings `dest` in line with the descriptor's remote.
    ///
    /// # Arguments
    ///
    /// * `descriptor` - Remote, branch, credentials and tenant scope
    /// * `dest` - Working tree location
    /// * `timeout_minutes` - Deadline for the whole call; values below 1 count as 1
    ///
    /// # Errors
    ///
    /// One of the [`SyncError`] variants. A failed clone never leaves `dest`
    /// behind.
    async fn sync(
        &self,
        descriptor: &SourceDescriptor,
        dest: &Path,
        timeout_minutes: i64,
    ) -> Result<SyncedRepository, SyncError>;

    /// Returns the tenant's public deploy key, creating it on first use.
    async fn public_key(&self, tenant: &str) -> Result<String, KeyError>;

    /// Reads the HEAD commit of a synchronized working tree.
    async fn last_commit(&self, path: &Path) -> Result<CommitInfo, SyncError>;

    /// Returns the backend name for logging.
    fn name(&self) -> &str;
}
