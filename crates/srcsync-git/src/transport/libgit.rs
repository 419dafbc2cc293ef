//! Git transport backed by libgit2.

use std::path::Path;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    AutotagOption, CertificateCheckStatus, Cred, CredentialType, Direction, ErrorClass, ErrorCode,
    FetchOptions, ProxyOptions, Remote, RemoteCallbacks, Repository,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use srcsync_core::{Endpoint, Protocol};

use super::{CloneOptions, CommitInfo, GitTransport, PullOptions, PullOutcome, RepoHandle};
use crate::auth::{AuthCredential, HostKeyPolicy, ProxyConfig, RemoteAccess};
use crate::classify::{AUTH_REQUIRED, CREDENTIALS_REJECTED, SSH_KEY_REJECTED};
use crate::error::TransportFailure;
use crate::progress::ProgressSink;

const REMOTE_NAME: &str = "origin";

/// [`GitTransport`] running every operation in-process through `git2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Git2Transport;

impl Git2Transport {
    /// Creates a new transport.
    pub fn new() -> Self {
        Self
    }

    fn clone_blocking(
        options: &CloneOptions,
        dest: &Path,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RepoHandle, TransportFailure> {
        let branch = Self::resolve_branch(
            &options.url,
            options.branch.as_deref(),
            &options.access,
            cancel,
        )?;
        let depth = effective_depth(&options.url, options.depth);

        info!("Cloning {} (branch {}) into {:?}", options.url, branch, dest);

        let mut fetch = fetch_options(&options.access, progress, cancel, depth, options.tags);
        let mut builder = RepoBuilder::new();
        builder.branch(&branch);

        if options.single_branch {
            let refspec = tracking_refspec(&branch);
            builder.remote_create(move |repo, name, url| repo.remote_with_fetch(name, url, &refspec));
        }
        if let Some(proxy) = &options.access.proxy {
            fetch.proxy_options(proxy_options(proxy));
        }
        builder.fetch_options(fetch);

        let repo = builder.clone(&options.url, dest).map_err(|e| failure(cancel, e))?;

        if options.recurse_submodules {
            for mut submodule in repo.submodules().map_err(|e| failure(cancel, e))? {
                submodule.update(true, None).map_err(|e| failure(cancel, e))?;
            }
        }

        head_handle(&repo)
    }

    /// Probes the remote and picks the branch to clone.
    ///
    /// A named branch must be advertised; otherwise the remote's default
    /// branch is used. A remote advertising no HEAD is empty unless a branch
    /// was named, in which case the clone itself decides.
    fn resolve_branch(
        url: &str,
        requested: Option<&str>,
        access: &RemoteAccess,
        cancel: &CancellationToken,
    ) -> Result<String, TransportFailure> {
        ensure_local_remote(url)?;

        let mut remote = Remote::create_detached(url).map_err(|e| failure(cancel, e))?;
        let callbacks = remote_callbacks(access, None, cancel);
        let proxy = access.proxy.as_ref().map(proxy_options);

        let connection = remote
            .connect_auth(Direction::Fetch, Some(callbacks), proxy)
            .map_err(|e| failure(cancel, e))?;

        // `list()` must not run on an empty advertisement.
        let default = match connection.default_branch() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::NotFound && !cancel.is_cancelled() => {
                return match requested {
                    Some(branch) => Ok(branch.to_string()),
                    None => Err(TransportFailure::EmptyRepository),
                };
            },
            Err(e) => return Err(failure(cancel, e)),
        };

        let heads = connection.list().map_err(|e| failure(cancel, e))?;
        if heads.iter().all(|head| head.oid().is_zero()) {
            return Err(TransportFailure::EmptyRepository);
        }

        if let Some(branch) = requested {
            let wanted = format!("refs/heads/{}", branch);
            if !heads.iter().any(|head| head.name() == wanted) {
                return Err(TransportFailure::ReferenceNotFound(wanted));
            }
            return Ok(branch.to_string());
        }

        let head = default
            .as_str()
            .ok_or_else(|| TransportFailure::other("remote default branch is not valid UTF-8"))?;
        let branch = head.strip_prefix("refs/heads/").unwrap_or(head).to_string();
        debug!("Remote {} default branch is {}", url, branch);
        Ok(branch)
    }

    fn pull_blocking(
        options: &PullOptions,
        dest: &Path,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PullOutcome, TransportFailure> {
        let repo = Repository::open(dest).map_err(|e| failure(cancel, e))?;
        let branch = match &options.branch {
            Some(branch) => branch.clone(),
            None => current_branch(&repo)?,
        };

        let mut remote = repo.find_remote(REMOTE_NAME).map_err(|e| failure(cancel, e))?;
        let url = remote.url().unwrap_or_default().to_string();
        let depth = effective_depth(&url, options.depth);

        info!("Fetching {} (branch {}) into {:?}", url, branch, dest);

        let mut fetch = fetch_options(&options.access, progress, cancel, depth, options.tags);
        if let Some(proxy) = &options.access.proxy {
            fetch.proxy_options(proxy_options(proxy));
        }
        let refspec = tracking_refspec(&branch);
        remote
            .fetch(&[refspec.as_str()], Some(&mut fetch), None)
            .map_err(|e| failure(cancel, e))?;
        drop(fetch);

        let tracking = format!("refs/remotes/{}/{}", REMOTE_NAME, branch);
        let fetched = repo
            .find_reference(&tracking)
            .and_then(|r| r.peel_to_commit())
            .map_err(|e| match e.code() {
                ErrorCode::NotFound => TransportFailure::ReferenceNotFound(tracking.clone()),
                _ => failure(cancel, e),
            })?;

        let local = format!("refs/heads/{}", branch);
        let current = repo.head().ok().and_then(|h| {
            let on_branch = h.name() == Some(local.as_str());
            h.target().filter(|_| on_branch)
        });

        let handle = RepoHandle {
            head: fetched.id().to_string(),
            branch: branch.clone(),
        };
        if current == Some(fetched.id()) {
            debug!("{:?} already up to date at {}", dest, handle.head);
            return Ok(PullOutcome::UpToDate(handle));
        }

        repo.checkout_tree(fetched.as_object(), Some(CheckoutBuilder::new().force()))
            .map_err(|e| failure(cancel, e))?;
        repo.reference(&local, fetched.id(), true, "srcsync: update from origin")
            .map_err(|e| failure(cancel, e))?;
        repo.set_head(&local).map_err(|e| failure(cancel, e))?;

        Ok(PullOutcome::Updated(handle))
    }
}

impl GitTransport for Git2Transport {
    fn clone_repo(
        &self,
        options: &CloneOptions,
        dest: &Path,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<RepoHandle, TransportFailure> {
        if cancel.is_cancelled() {
            return Err(TransportFailure::Cancelled);
        }
        Self::clone_blocking(options, dest, progress, cancel)
    }

    fn pull(
        &self,
        options: &PullOptions,
        dest: &Path,
        progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PullOutcome, TransportFailure> {
        if cancel.is_cancelled() {
            return Err(TransportFailure::Cancelled);
        }
        Self::pull_blocking(options, dest, progress, cancel)
    }

    fn last_commit(&self, dest: &Path) -> Result<CommitInfo, TransportFailure> {
        let repo = Repository::open(dest)?;
        let commit = repo.head()?.peel_to_commit()?;
        let author = commit.author();
        Ok(CommitInfo {
            id: commit.id().to_string(),
            summary: commit.summary().unwrap_or_default().to_string(),
            author_name: author.name().unwrap_or_default().to_string(),
            author_email: author.email().unwrap_or_default().to_string(),
            time: commit.time().seconds(),
        })
    }
}

/// Builds the callbacks for one network operation.
///
/// Each credential is offered once. libgit2 asks again only after the
/// remote rejected it, which is reported as a tagged error instead of
/// looping.
fn remote_callbacks<'a>(
    access: &'a RemoteAccess,
    progress: Option<ProgressSink>,
    cancel: &'a CancellationToken,
) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();

    let mut offered = false;
    callbacks.credentials(move |_url, username_from_url, allowed| {
        if cancel.is_cancelled() {
            return Err(cancelled());
        }
        match &access.credential {
            AuthCredential::SshIdentity { user, key_path } => {
                let user = username_from_url.unwrap_or(user);
                if allowed.contains(CredentialType::USERNAME) {
                    return Cred::username(user);
                }
                if !allowed.contains(CredentialType::SSH_KEY) {
                    return Err(git2::Error::new(ErrorCode::Auth, ErrorClass::None, AUTH_REQUIRED));
                }
                if offered {
                    return Err(git2::Error::new(ErrorCode::Auth, ErrorClass::Ssh, SSH_KEY_REJECTED));
                }
                offered = true;
                Cred::ssh_key(user, None, key_path, None)
            },
            AuthCredential::BasicAuth { user, password }
                if allowed.contains(CredentialType::USER_PASS_PLAINTEXT) =>
            {
                if offered {
                    return Err(git2::Error::new(
                        ErrorCode::Auth,
                        ErrorClass::Http,
                        CREDENTIALS_REJECTED,
                    ));
                }
                offered = true;
                Cred::userpass_plaintext(user, password)
            },
            _ => Err(git2::Error::new(ErrorCode::Auth, ErrorClass::Http, AUTH_REQUIRED)),
        }
    });

    let host_keys = access.host_keys;
    callbacks.certificate_check(move |cert, host| {
        if host_keys == HostKeyPolicy::AcceptAny && cert.as_hostkey().is_some() {
            debug!("accepting host key for {}", host);
            return Ok(CertificateCheckStatus::CertificateOk);
        }
        Ok(CertificateCheckStatus::CertificatePassthrough)
    });

    callbacks.transfer_progress(move |_| !cancel.is_cancelled());

    if let Some(mut sink) = progress {
        callbacks.sideband_progress(move |data| !cancel.is_cancelled() && sink.write(data));
    }

    callbacks
}

fn fetch_options<'a>(
    access: &'a RemoteAccess,
    progress: ProgressSink,
    cancel: &'a CancellationToken,
    depth: Option<u32>,
    tags: bool,
) -> FetchOptions<'a> {
    let mut fetch = FetchOptions::new();
    fetch.remote_callbacks(remote_callbacks(access, Some(progress), cancel));
    fetch.download_tags(if tags {
        AutotagOption::All
    } else {
        AutotagOption::None
    });
    if let Some(depth) = depth {
        fetch.depth(i32::try_from(depth).unwrap_or(i32::MAX));
    }
    fetch
}

fn proxy_options(proxy: &ProxyConfig) -> ProxyOptions<'static> {
    let mut options = ProxyOptions::new();
    options.url(proxy.url());
    options
}

fn tracking_refspec(branch: &str) -> String {
    format!("+refs/heads/{0}:refs/remotes/{1}/{0}", branch, REMOTE_NAME)
}

/// A local remote must exist before libgit2 is asked to connect to it.
fn ensure_local_remote(url: &str) -> Result<(), TransportFailure> {
    match Endpoint::parse(url) {
        Ok(ep) if ep.protocol() == Protocol::File && !Path::new(ep.path()).exists() => {
            Err(TransportFailure::RepositoryNotFound)
        },
        _ => Ok(()),
    }
}

/// libgit2's local transport cannot negotiate shallow fetches.
fn effective_depth(url: &str, depth: Option<u32>) -> Option<u32> {
    let local = Endpoint::parse(url)
        .map(|ep| ep.protocol() == Protocol::File)
        .unwrap_or(false);
    if local { None } else { depth }
}

fn current_branch(repo: &Repository) -> Result<String, TransportFailure> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(TransportFailure::other("HEAD is detached, no branch to update"));
    }
    head.shorthand()
        .map(str::to_string)
        .ok_or_else(|| TransportFailure::other("branch name is not valid UTF-8"))
}

fn head_handle(repo: &Repository) -> Result<RepoHandle, TransportFailure> {
    let head = repo.head().map_err(|e| match e.code() {
        ErrorCode::UnbornBranch | ErrorCode::NotFound => TransportFailure::EmptyRepository,
        _ => e.into(),
    })?;
    let commit = head.peel_to_commit()?;
    Ok(RepoHandle {
        head: commit.id().to_string(),
        branch: head.shorthand().unwrap_or_default().to_string(),
    })
}

fn cancelled() -> git2::Error {
    git2::Error::new(ErrorCode::User, ErrorClass::Callback, "operation cancelled")
}

/// Tags a libgit2 error, reporting any failure after cancellation as such.
fn failure(cancel: &CancellationToken, err: git2::Error) -> TransportFailure {
    if cancel.is_cancelled() {
        TransportFailure::Cancelled
    } else {
        err.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tracking_refspec() {
        assert_eq!(
            tracking_refspec("main"),
            "+refs/heads/main:refs/remotes/origin/main"
        );
    }

    #[test]
    fn test_effective_depth_skips_local() {
        assert_eq!(effective_depth("/srv/repo", Some(1)), None);
        assert_eq!(effective_depth("file:///srv/repo", Some(1)), None);
        assert_eq!(effective_depth("https://example.com/r.git", Some(1)), Some(1));
        assert_eq!(effective_depth("git@example.com:r.git", None), None);
    }

    fn clone_local(upstream: &Path, dest: &Path) -> Result<RepoHandle, TransportFailure> {
        let options = CloneOptions::shallow(
            upstream.to_string_lossy(),
            None,
            RemoteAccess::anonymous(),
        );
        Git2Transport::new().clone_repo(
            &options,
            dest,
            ProgressSink::discard(),
            &CancellationToken::new(),
        )
    }

    #[test]
    fn test_empty_remote_is_empty_repository() {
        let tmp = tempfile::tempdir().unwrap();
        let upstream = tmp.path().join("upstream");
        Repository::init(&upstream).unwrap();

        let result = clone_local(&upstream, &tmp.path().join("work"));
        assert!(matches!(result, Err(TransportFailure::EmptyRepository)));
    }

    #[test]
    fn test_missing_local_remote_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing");

        let result = clone_local(&missing, &tmp.path().join("work"));
        assert!(matches!(result, Err(TransportFailure::RepositoryNotFound)));

        let url = format!("file://{}", missing.display());
        assert!(matches!(
            ensure_local_remote(&url),
            Err(TransportFailure::RepositoryNotFound)
        ));
        assert!(ensure_local_remote("https://example.com/r.git").is_ok());
    }

    #[test]
    fn test_cancelled_token_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tmp = tempfile::tempdir().unwrap();
        let options = CloneOptions::shallow("/nonexistent", None, RemoteAccess::anonymous());
        let result =
            Git2Transport::new().clone_repo(&options, tmp.path(), ProgressSink::discard(), &cancel);
        assert!(matches!(result, Err(TransportFailure::Cancelled)));
    }
}
