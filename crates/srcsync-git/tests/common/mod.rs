#![allow(dead_code)]
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use git2::{Repository, RepositoryInitOptions, Signature};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use srcsync_core::Settings;
use srcsync_git::{
    CloneOptions, CommitInfo, EventLogger, EventRecord, GitTransport, ProgressSink, PullOptions,
    PullOutcome, RepoHandle, TransportFailure,
};

/// Logger keeping every record for later inspection.
#[derive(Debug, Default)]
pub struct RecordingLogger {
    events: Mutex<Vec<EventRecord>>,
}

impl RecordingLogger {
    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().clone()
    }

    pub fn messages_for_step(&self, step: &str) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.step == step)
            .map(|e| e.message.clone())
            .collect()
    }
}

impl EventLogger for RecordingLogger {
    fn record(&self, event: EventRecord) {
        self.events.lock().push(event);
    }
}

/// Transport replaying scripted clone and pull outcomes and recording every
/// request.
///
/// Each clone creates the destination first, like a real partial clone
/// would. Once the clone script runs out, clones succeed; once the pull
/// script runs out, pulls fail.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    clones: Mutex<VecDeque<Result<RepoHandle, TransportFailure>>>,
    pulls: Mutex<VecDeque<Result<PullOutcome, TransportFailure>>>,
    requests: Mutex<Vec<CloneOptions>>,
    pull_requests: Mutex<Vec<PullOptions>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<RepoHandle, TransportFailure>>) -> Self {
        Self {
            clones: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn with_pulls(self, script: Vec<Result<PullOutcome, TransportFailure>>) -> Self {
        *self.pulls.lock() = script.into();
        self
    }

    pub fn requests(&self) -> Vec<CloneOptions> {
        self.requests.lock().clone()
    }

    pub fn pull_requests(&self) -> Vec<PullOptions> {
        self.pull_requests.lock().clone()
    }
}

impl GitTransport for ScriptedTransport {
    fn clone_repo(
        &self,
        options: &CloneOptions,
        dest: &Path,
        mut progress: ProgressSink,
        _cancel: &CancellationToken,
    ) -> Result<RepoHandle, TransportFailure> {
        self.requests.lock().push(options.clone());
        fs::create_dir_all(dest.join(".git"))?;
        progress.write(b"Receiving objects: 100% (3/3), done.\n");

        self.clones
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(handle(options.branch.as_deref().unwrap_or("main"))))
    }

    fn pull(
        &self,
        options: &PullOptions,
        _dest: &Path,
        _progress: ProgressSink,
        _cancel: &CancellationToken,
    ) -> Result<PullOutcome, TransportFailure> {
        self.pull_requests.lock().push(options.clone());
        self.pulls
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(TransportFailure::other("pull script exhausted")))
    }

    fn last_commit(&self, _dest: &Path) -> Result<CommitInfo, TransportFailure> {
        Err(TransportFailure::other("scripted transport has no commits"))
    }
}

pub fn handle(branch: &str) -> RepoHandle {
    RepoHandle {
        head: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".to_string(),
        branch: branch.to_string(),
    }
}

/// Settings rooted in a temporary home, with a GitHub proxy configured.
pub fn settings(home: &Path) -> Settings {
    Settings::builder()
        .home(home)
        .cache_root(home.join("cache"))
        .source_root(home.join("source"))
        .proxy("http://proxy.internal:3128")
        .build()
}

/// Writes placeholder key files so the lookup chain resolves them.
pub fn install_keys(settings: &Settings, names: &[&str]) {
    let dir = settings.ssh_dir();
    fs::create_dir_all(&dir).unwrap();
    for name in names {
        fs::write(dir.join(name), "placeholder").unwrap();
    }
}

/// Creates a non-bare repository whose HEAD points at `branch`.
pub fn init_upstream(path: &Path, branch: &str) -> Repository {
    let mut opts = RepositoryInitOptions::new();
    opts.initial_head(branch);
    Repository::init_opts(path, &opts).unwrap()
}

/// Writes `name` with `content` and commits it on HEAD; returns the commit id.
pub fn commit_file(repo: &Repository, name: &str, content: &str, message: &str) -> String {
    let workdir = repo.workdir().unwrap();
    fs::write(workdir.join(name), content).unwrap();

    let mut index = repo.index().unwrap();
    index.add_path(Path::new(name)).unwrap();
    index.write().unwrap();
    let tree_id = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_id).unwrap();

    let sig = Signature::now("Build Bot", "bot@example.com").unwrap();
    let parents = match repo.head() {
        Ok(head) => vec![head.peel_to_commit().unwrap()],
        Err(_) => Vec::new(),
    };
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();

    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
        .unwrap()
        .to_string()
}

pub fn shared(logger: &Arc<RecordingLogger>) -> srcsync_git::SharedLogger {
    Some(logger.clone())
}
