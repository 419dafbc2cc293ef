//! # srcsync Git Engine
//!
//! Synchronizes tenant source trees from git remotes for the build pipeline.
//!
//! ## Features
//!
//! - In-process git through libgit2: shallow, single-branch, tagless clones
//! - Incremental updates of existing working trees, with a full reclone as recovery
//! - Per-tenant RSA deploy keys with a one-shot fallback to a shared key
//! - Per-call proxy and credentials, no process-global transport state
//! - Transport progress streamed line by line to the build log
//! - One cancellable deadline per sync
//! - A closed set of classified failures with operator messages
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use srcsync_core::{Settings, SourceDescriptor};
//! use srcsync_git::{GitSynchronizer, SourceSync, TracingLogger};
//!
//! let settings = Settings::from_env();
//! let sync = GitSynchronizer::new(&settings, Some(Arc::new(TracingLogger)));
//!
//! let descriptor = SourceDescriptor::new("git@github.com:acme/app.git")
//!     .with_scope("tenant-a", "service-1");
//! let dest = sync.paths().source_dir(&descriptor);
//! let repo = sync.sync(&descriptor, &dest, 10).await?;
//! ```

pub mod auth;
pub mod classify;
pub mod error;
pub mod events;
pub mod keys;
pub mod progress;
pub mod source;
pub mod sync;
pub mod transport;

// Re-exports
pub use auth::{AuthCredential, AuthResolver, HostKeyPolicy, ProxyConfig, RemoteAccess};
pub use classify::classify;
pub use error::{KeyError, SyncError, TransportFailure};
pub use events::{EventLogger, EventRecord, Severity, SharedLogger, TracingLogger};
pub use keys::{KeyIdentity, KeyPair, KeyProvisioner, generate_key_pair};
pub use progress::{ProgressRelay, ProgressSink};
pub use source::SourceSync;
pub use sync::{AuthAttempt, GitSynchronizer, SyncStatus, SyncedRepository, effective_timeout_minutes};
pub use transport::{
    CloneOptions, CommitInfo, Git2Transport, GitTransport, PullOptions, PullOutcome, RepoHandle,
};

// Re-export srcsync_core for consumers
pub use srcsync_core;
