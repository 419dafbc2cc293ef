//! Sync orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use srcsync_core::{
    CoreError, Endpoint, PathResolver, Protocol, Settings, SourceDescriptor, remove_dir,
};

use super::retry::AuthAttempt;
use super::{SyncStatus, SyncedRepository};
use crate::auth::AuthResolver;
use crate::classify::classify;
use crate::error::{KeyError, SyncError, TransportFailure};
use crate::events::{EventRecord, STEP_CLONE, Severity, SharedLogger, emit, emit_failure};
use crate::keys::{KeyIdentity, KeyProvisioner};
use crate::progress::{ProgressRelay, ProgressSink};
use crate::source::SourceSync;
use crate::transport::{
    CloneOptions, CommitInfo, Git2Transport, GitTransport, PullOptions, PullOutcome, RepoHandle,
};

/// How long a cancelled transport gets to notice before the sync returns.
pub const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Removes a working tree.
type Remover = fn(&Path) -> Result<(), CoreError>;

/// Clamps a caller-supplied timeout to at least one minute.
pub fn effective_timeout_minutes(timeout_minutes: i64) -> u64 {
    u64::try_from(timeout_minutes.max(1)).unwrap_or(1)
}

/// Synchronizes tenant working trees with their remotes.
///
/// Cheap to share: every sync carries its own deadline, credentials and
/// proxy, and nothing is cached between calls.
#[derive(Clone)]
pub struct GitSynchronizer {
    keys: Arc<KeyProvisioner>,
    resolver: AuthResolver,
    paths: PathResolver,
    transport: Arc<dyn GitTransport>,
    logger: SharedLogger,
    remover: Remover,
}

impl GitSynchronizer {
    /// Creates a synchronizer using the libgit2 transport.
    pub fn new(settings: &Settings, logger: SharedLogger) -> Self {
        Self::with_transport(settings, Arc::new(Git2Transport::new()), logger)
    }

    /// Creates a synchronizer with a custom transport.
    pub fn with_transport(
        settings: &Settings,
        transport: Arc<dyn GitTransport>,
        logger: SharedLogger,
    ) -> Self {
        let keys = Arc::new(KeyProvisioner::new(settings));
        Self::with_keys(settings, keys, transport, logger)
    }

    /// Creates a synchronizer with a custom transport and key provisioner.
    pub fn with_keys(
        settings: &Settings,
        keys: Arc<KeyProvisioner>,
        transport: Arc<dyn GitTransport>,
        logger: SharedLogger,
    ) -> Self {
        Self {
            resolver: AuthResolver::new(settings, Arc::clone(&keys)),
            keys,
            paths: PathResolver::new(settings),
            transport,
            logger,
            remover: remove_tree,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_remover(mut self, remover: Remover) -> Self {
        self.remover = remover;
        self
    }

    /// Returns the key provisioner.
    pub fn keys(&self) -> &KeyProvisioner {
        &self.keys
    }

    /// Returns the tenant directory layout.
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    /// Returns the auth resolver.
    pub fn resolver(&self) -> &AuthResolver {
        &self.resolver
    }

    /// Runs one sync with an explicit time budget.
    ///
    /// `minutes` is only reported in [`SyncError::Timeout`].
    pub(crate) async fn sync_within(
        &self,
        descriptor: &SourceDescriptor,
        dest: &Path,
        budget: Duration,
        minutes: u64,
    ) -> Result<SyncedRepository, SyncError> {
        let now = Instant::now();
        let deadline = now.checked_add(budget).unwrap_or(now + Duration::from_secs(u32::MAX as u64));
        let cancel = CancellationToken::new();

        let result = self.run(descriptor, dest, deadline, minutes, &cancel).await;
        cancel.cancel();

        if let Err(e) = &result {
            warn!("sync of {} failed: {}", descriptor.repository_url(), e);
            emit_failure(&self.logger, e.operator_message());
        }
        result
    }

    async fn run(
        &self,
        descriptor: &SourceDescriptor,
        dest: &Path,
        deadline: Instant,
        minutes: u64,
        cancel: &CancellationToken,
    ) -> Result<SyncedRepository, SyncError> {
        let endpoint = descriptor.endpoint().map_err(SyncError::unknown)?;
        let url = descriptor.repository_url();
        let branch = descriptor.branch().map(str::to_string);

        if dest.join(".git").exists() {
            emit(
                &self.logger,
                EventRecord::new(
                    Severity::Info,
                    format!("start updating code from git source ({})", url),
                    STEP_CLONE,
                ),
            );

            match self.pull(descriptor, &endpoint, dest, deadline, cancel).await {
                Ok(synced) => return Ok(synced),
                Err(TransportFailure::Cancelled) => return Err(SyncError::Timeout { minutes }),
                Err(e) => {
                    warn!("update of {:?} failed, recloning: {}", dest, e);
                    self.cleanup(dest);
                },
            }
        }

        emit(
            &self.logger,
            EventRecord::new(
                Severity::Info,
                format!("start fetching code from git source ({})", url),
                STEP_CLONE,
            ),
        );

        let mut attempt = AuthAttempt::Primary;
        loop {
            let identity = attempt.identity(descriptor.tenant_id()).unwrap_or(KeyIdentity::Fallback);
            let access = self.resolver.access(&endpoint, descriptor, &identity);
            let options = CloneOptions::shallow(url, branch.clone(), access);

            let transport = Arc::clone(&self.transport);
            let target = dest.to_path_buf();
            let result = self
                .run_blocking(deadline, cancel, move |sink, token| {
                    transport.clone_repo(&options, &target, sink, &token)
                })
                .await;

            let failure = match result {
                Ok(handle) => {
                    info!("cloned {} at {} into {:?}", url, handle.head, dest);
                    return Ok(synced(dest, handle, SyncStatus::Cloned, &endpoint, identity));
                },
                Err(failure) => failure,
            };

            self.cleanup(dest);

            if retry_with_fallback(&mut attempt, &failure, &identity) {
                continue;
            }
            return Err(classify(failure, branch.as_deref(), minutes));
        }
    }

    /// Updates an existing working tree, falling back to the shared key the
    /// same way a clone does. The tree is left alone on failure.
    async fn pull(
        &self,
        descriptor: &SourceDescriptor,
        endpoint: &Endpoint,
        dest: &Path,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<SyncedRepository, TransportFailure> {
        let branch = descriptor.branch().map(str::to_string);

        let mut attempt = AuthAttempt::Primary;
        loop {
            let identity = attempt.identity(descriptor.tenant_id()).unwrap_or(KeyIdentity::Fallback);
            let access = self.resolver.access(endpoint, descriptor, &identity);
            let options = PullOptions::shallow(branch.clone(), access);

            let transport = Arc::clone(&self.transport);
            let target = dest.to_path_buf();
            let result = self
                .run_blocking(deadline, cancel, move |sink, token| {
                    transport.pull(&options, &target, sink, &token)
                })
                .await;

            let failure = match result {
                Ok(PullOutcome::UpToDate(handle)) => {
                    info!("{:?} already up to date at {}", dest, handle.head);
                    return Ok(synced(dest, handle, SyncStatus::UpToDate, endpoint, identity));
                },
                Ok(PullOutcome::Updated(handle)) => {
                    info!("updated {:?} to {}", dest, handle.head);
                    return Ok(synced(dest, handle, SyncStatus::Updated, endpoint, identity));
                },
                Err(failure) => failure,
            };

            if retry_with_fallback(&mut attempt, &failure, &identity) {
                continue;
            }
            return Err(failure);
        }
    }

    /// Runs one transport call on the blocking pool under the deadline.
    ///
    /// On expiry the token is cancelled and the call gets [`CANCEL_GRACE`]
    /// to return before `Cancelled` is reported.
    async fn run_blocking<T, F>(
        &self,
        deadline: Instant,
        cancel: &CancellationToken,
        op: F,
    ) -> Result<T, TransportFailure>
    where
        T: Send + 'static,
        F: FnOnce(ProgressSink, CancellationToken) -> Result<T, TransportFailure> + Send + 'static,
    {
        let (relay, sink) = ProgressRelay::start(&self.logger, cancel.clone());
        let token = cancel.clone();
        let mut task = tokio::task::spawn_blocking(move || op(sink, token));

        let result = match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(TransportFailure::other(join)),
            Err(_) => {
                warn!("sync deadline reached, cancelling transport");
                cancel.cancel();
                if tokio::time::timeout(CANCEL_GRACE, &mut task).await.is_err() {
                    warn!("transport still running {:?} after cancellation", CANCEL_GRACE);
                }
                Err(TransportFailure::Cancelled)
            },
        };

        let emitted = relay.finish().await;
        debug!("relayed {} progress lines", emitted);
        result
    }

    fn cleanup(&self, dest: &Path) {
        if let Err(e) = (self.remover)(dest) {
            warn!("failed to remove {:?}: {}", dest, e);
            emit_failure(
                &self.logger,
                format!("failed to clean up {}: {}", dest.display(), e),
            );
        }
    }
}

impl std::fmt::Debug for GitSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitSynchronizer")
            .field("resolver", &self.resolver)
            .field("paths", &self.paths)
            .field("transport", &self.transport)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

fn remove_tree(path: &Path) -> Result<(), CoreError> {
    remove_dir(path)
}

/// Advances the key state after a failure; true if another attempt is due.
fn retry_with_fallback(
    attempt: &mut AuthAttempt,
    failure: &TransportFailure,
    identity: &KeyIdentity,
) -> bool {
    if !failure.is_ssh_auth_rejected() {
        return false;
    }
    *attempt = attempt.after_rejection();
    if attempt.is_exhausted() {
        return false;
    }
    info!("key for {} rejected, retrying with fallback key", identity.name());
    true
}

fn synced(
    dest: &Path,
    handle: RepoHandle,
    status: SyncStatus,
    endpoint: &Endpoint,
    identity: KeyIdentity,
) -> SyncedRepository {
    SyncedRepository {
        path: dest.to_path_buf(),
        head: handle.head,
        branch: handle.branch,
        status,
        identity: (endpoint.protocol() == Protocol::Ssh).then_some(identity),
    }
}

#[async_trait]
impl SourceSync for GitSynchronizer {
    async fn sync(
        &self,
        descriptor: &SourceDescriptor,
        dest: &Path,
        timeout_minutes: i64,
    ) -> Result<SyncedRepository, SyncError> {
        let minutes = effective_timeout_minutes(timeout_minutes);
        let budget = Duration::from_secs(minutes.saturating_mul(60));
        self.sync_within(descriptor, dest, budget, minutes).await
    }

    async fn public_key(&self, tenant: &str) -> Result<String, KeyError> {
        let keys = Arc::clone(&self.keys);
        let tenant = tenant.to_string();
        tokio::task::spawn_blocking(move || keys.get_or_create_public_key(&tenant))
            .await
            .map_err(|e| KeyError::io(PathBuf::new(), std::io::Error::other(e)))?
    }

    async fn last_commit(&self, path: &Path) -> Result<CommitInfo, SyncError> {
        let transport = Arc::clone(&self.transport);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || transport.last_commit(&path))
            .await
            .map_err(SyncError::unknown)?
            .map_err(SyncError::unknown)
    }

    fn name(&self) -> &str {
        "git"
    }
}
