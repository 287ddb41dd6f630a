//! engine::orchestrator
//!
//! The public face of the engine.
//!
//! # Architecture
//!
//! ```text
//! request ──► AboutToStart ──► Scheduler ──► task ──► state ──► Succeeded/Failed
//!  (caller thread)                            (worker thread)
//! ```
//!
//! Every mutating request becomes an [`OperationDescriptor`], announces
//! itself to listeners on the caller's thread, and runs on the scheduler.
//! When the task finishes, the repository state is recomputed and the
//! terminal event carries it. The caller gets an [`OperationTicket`] it can
//! wait on or ignore.
//!
//! Queries never touch the scheduler. They read through a fresh [`Git`]
//! instance and may run concurrently with a mutation.
//!
//! # Composite flows
//!
//! A task returns a [`Step`]. `Step::Then` re-submits the next step to the
//! back of the queue, pinned to the handle the first step ran against, so a
//! flow that needs one step's result before issuing the next never blocks
//! the worker waiting on itself. If the working copy is closed or replaced
//! between steps, the flow fails with `NoRepositoryOpen`.
//!
//! # Invariants
//!
//! - Every `AboutToStart` is followed by exactly one terminal event
//! - Terminal events carry state computed after the operation ran
//! - No mutation runs outside the scheduler worker

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, RwLock, Weak};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::descriptor::{
    OperationDescriptor, OperationKind, OperationOutcome, OperationPayload, Resolution, StashRef,
};
use super::error::{OpError, SchedulerError};
use super::handle::RepositoryHandle;
use super::listeners::{Listener, ListenerId, ListenerRegistry, OperationEvent};
use super::scheduler::{panic_message, Scheduler, ShutdownMode};
use super::state::{self, RepositoryState, RepositoryStatus};
use crate::core::config::{AutoStash, Config};
use crate::core::types::{
    AheadBehind, BranchInfo, BranchName, FileChange, PullStrategy, ResetMode, StashEntry,
};
use crate::git::{Git, GitError};

pub(crate) type OpResult = Result<OperationOutcome, OpError>;

type StepFn = Box<dyn FnOnce(&Arc<RepositoryHandle>) -> Step + Send + 'static>;

/// What a scheduled step produced.
pub(crate) enum Step {
    /// The operation is finished.
    Done(OpResult),
    /// Queue another step against the same handle.
    Then(StepFn),
}

impl Step {
    pub(crate) fn then<F>(next: F) -> Self
    where
        F: FnOnce(&Arc<RepositoryHandle>) -> Step + Send + 'static,
    {
        Step::Then(Box::new(next))
    }
}

impl From<OpResult> for Step {
    fn from(result: OpResult) -> Self {
        Step::Done(result)
    }
}

/// Engine settings, normally taken from [`Config`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub remote: String,
    pub pull_strategy: PullStrategy,
    pub stash_include_untracked: bool,
    pub auto_stash: AutoStash,
    pub shutdown_mode: ShutdownMode,
    pub shutdown_wait: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            pull_strategy: PullStrategy::default(),
            stash_include_untracked: false,
            auto_stash: AutoStash::default(),
            shutdown_mode: ShutdownMode::Drain,
            shutdown_wait: true,
        }
    }
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            remote: config.remote(),
            pull_strategy: config.pull_strategy(),
            stash_include_untracked: config.stash_include_untracked(),
            auto_stash: config.auto_stash_on_switch(),
            shutdown_mode: if config.shutdown_discard_pending() {
                ShutdownMode::DiscardPending
            } else {
                ShutdownMode::Drain
            },
            shutdown_wait: config.shutdown_wait(),
        }
    }
}

/// Result of one submitted operation.
///
/// Dropping a ticket does not cancel the operation. Await it from async
/// code, or [`wait`](Self::wait) from a plain thread.
#[must_use = "the operation runs either way, but its result is lost"]
#[derive(Debug)]
pub struct OperationTicket {
    id: Uuid,
    kind: OperationKind,
    rx: oneshot::Receiver<OpResult>,
}

impl OperationTicket {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Block until the operation has finished.
    ///
    /// Must not be called from the scheduler worker or inside an async
    /// runtime.
    pub fn wait(self) -> OpResult {
        self.rx.blocking_recv().unwrap_or(Err(OpError::Cancelled))
    }
}

impl Future for OperationTicket {
    type Output = OpResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(OpError::Cancelled)))
    }
}

struct Inner {
    scheduler: Scheduler,
    listeners: ListenerRegistry,
    handle: RwLock<Option<Arc<RepositoryHandle>>>,
    settings: OrchestratorSettings,
}

/// Owes exactly one terminal event for a descriptor.
///
/// Dropped unfinished (the task was discarded, or never queued because the
/// scheduler had closed), it reports the operation as failed.
struct Completion {
    inner: Arc<Inner>,
    pending: Option<(OperationDescriptor, oneshot::Sender<OpResult>)>,
}

impl Completion {
    fn label(&self) -> &'static str {
        self.pending
            .as_ref()
            .map_or("operation", |(descriptor, _)| descriptor.kind.name())
    }

    fn finish(mut self, result: OpResult) {
        if let Some((descriptor, reply)) = self.pending.take() {
            self.inner.complete(descriptor, result, reply);
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if let Some((descriptor, reply)) = self.pending.take() {
            let error = if self.inner.scheduler.is_discarding() {
                OpError::Cancelled
            } else {
                OpError::SchedulerClosed
            };
            self.inner.complete(descriptor, Err(error), reply);
        }
    }
}

impl Inner {
    fn current_handle(&self) -> Option<Arc<RepositoryHandle>> {
        self.handle
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Install `next` as the open working copy, closing whatever was open.
    fn replace_handle(&self, next: Option<Arc<RepositoryHandle>>) -> Option<Arc<RepositoryHandle>> {
        let previous = {
            let mut slot = self
                .handle
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            std::mem::replace(&mut *slot, next)
        };
        if let Some(previous) = &previous {
            previous.close();
        }
        previous
    }

    fn current_state(&self) -> Option<RepositoryState> {
        let handle = self.current_handle()?;
        let mut git = handle.reader().ok()?;
        match state::read_state(&mut git) {
            Ok(state) => Some(state),
            Err(e) => {
                debug!(error = %e, "could not read repository state");
                None
            }
        }
    }

    fn begin(self: &Arc<Self>, descriptor: OperationDescriptor) -> (Completion, OperationTicket) {
        debug!(op_id = %descriptor.id, kind = %descriptor.kind, "operation requested");
        let (reply, rx) = oneshot::channel();
        let ticket = OperationTicket {
            id: descriptor.id,
            kind: descriptor.kind,
            rx,
        };

        self.listeners.notify(&OperationEvent::AboutToStart {
            descriptor: descriptor.clone(),
        });

        let completion = Completion {
            inner: Arc::clone(self),
            pending: Some((descriptor, reply)),
        };
        (completion, ticket)
    }

    fn complete(
        &self,
        descriptor: OperationDescriptor,
        result: OpResult,
        reply: oneshot::Sender<OpResult>,
    ) {
        let state = self.current_state();
        let event = match result {
            Ok(outcome) => {
                debug!(op_id = %descriptor.id, kind = %descriptor.kind, "operation succeeded");
                OperationEvent::Succeeded {
                    descriptor,
                    outcome,
                    state,
                }
            }
            Err(error) => {
                warn!(
                    op_id = %descriptor.id,
                    kind = %descriptor.kind,
                    code = error.code(),
                    error = %error,
                    "operation failed"
                );
                OperationEvent::Failed {
                    descriptor,
                    error,
                    state,
                }
            }
        };

        self.listeners.notify(&event);
        if let Some(result) = event.into_result() {
            // The caller may have dropped its ticket.
            let _ = reply.send(result);
        }
    }

    /// Queue `step`, against `pinned` if set, else the handle open when the
    /// step starts.
    fn run_step(
        self: &Arc<Self>,
        completion: Completion,
        pinned: Option<Arc<RepositoryHandle>>,
        step: StepFn,
    ) {
        let inner = Arc::clone(self);
        let label = completion.label();

        let queued = self.scheduler.schedule_named(label, move || {
            let handle = match pinned.or_else(|| inner.current_handle()) {
                Some(handle) if handle.is_open() => handle,
                _ => return completion.finish(Err(OpError::NoRepositoryOpen)),
            };

            match panic::catch_unwind(AssertUnwindSafe(|| step(&handle))) {
                Ok(Step::Done(result)) => completion.finish(result),
                Ok(Step::Then(next)) => inner.run_step(completion, Some(handle), next),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(label, panic = %message, "operation panicked");
                    completion.finish(Err(OpError::generic(format!(
                        "operation panicked: {message}"
                    ))));
                }
            }
        });

        // A rejected task drops its completion, which reports the failure.
        if let Err(e) = queued {
            debug!(label, error = %e, "operation not queued");
        }
    }

    /// Queue a task that does not need an open working copy.
    fn run_detached<F>(self: &Arc<Self>, completion: Completion, task: F)
    where
        F: FnOnce(&Inner) -> OpResult + Send + 'static,
    {
        let inner = Arc::clone(self);
        let label = completion.label();

        let queued = self.scheduler.schedule_named(label, move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(|| task(&inner))) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(label, panic = %message, "operation panicked");
                    Err(OpError::generic(format!("operation panicked: {message}")))
                }
            };
            completion.finish(result);
        });

        if let Err(e) = queued {
            debug!(label, error = %e, "operation not queued");
        }
    }
}

/// Serializes repository operations and reports on them.
///
/// Cheap to clone; clones share one scheduler and one open working copy.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("scheduler", &self.inner.scheduler)
            .field("listeners", &self.inner.listeners)
            .field("work_dir", &self.work_dir())
            .finish()
    }
}

impl Orchestrator {
    /// Start the scheduler. No working copy is open yet.
    pub fn new(settings: OrchestratorSettings) -> Result<Self, SchedulerError> {
        Ok(Self {
            inner: Arc::new(Inner {
                scheduler: Scheduler::start()?,
                listeners: ListenerRegistry::new(),
                handle: RwLock::new(None),
                settings,
            }),
        })
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    // =========================================================================
    // Listeners
    // =========================================================================

    pub fn subscribe(&self, listener: Arc<dyn Listener>) -> ListenerId {
        self.inner.listeners.subscribe(listener)
    }

    pub fn subscribe_fn<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&OperationEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unsubscribe(id)
    }

    // =========================================================================
    // Submission
    // =========================================================================

    /// Announce `descriptor` and queue its first step.
    pub(crate) fn submit<F>(&self, descriptor: OperationDescriptor, step: F) -> OperationTicket
    where
        F: FnOnce(&Arc<RepositoryHandle>) -> Step + Send + 'static,
    {
        let (completion, ticket) = self.inner.begin(descriptor);
        self.inner.run_step(completion, None, Box::new(step));
        ticket
    }

    /// Submit a single mutation against the writing instance.
    pub(crate) fn submit_git<F>(&self, descriptor: OperationDescriptor, mutation: F) -> OperationTicket
    where
        F: FnOnce(&mut Git) -> Result<OperationOutcome, GitError> + Send + 'static,
    {
        self.submit(descriptor, move |handle| Step::Done(handle.with_git(mutation)))
    }

    // =========================================================================
    // Working copy lifecycle
    // =========================================================================

    /// Open the repository containing `path`, closing any open one first.
    ///
    /// On failure no working copy is open.
    pub fn open_working_copy(&self, path: impl AsRef<Path>) -> OperationTicket {
        self.open_or_init(path.as_ref().to_path_buf(), false)
    }

    /// Create a repository at `path` and open it.
    pub fn init_working_copy(&self, path: impl AsRef<Path>) -> OperationTicket {
        self.open_or_init(path.as_ref().to_path_buf(), true)
    }

    fn open_or_init(&self, path: PathBuf, init: bool) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::OpenWorkingCopy)
            .with_payload(OperationPayload::Open { path: path.clone() });
        let (completion, ticket) = self.inner.begin(descriptor);

        self.inner.run_detached(completion, move |inner| {
            // Earlier operations have drained; the old handle is idle.
            inner.replace_handle(None);
            let handle = if init {
                RepositoryHandle::init(&path)?
            } else {
                RepositoryHandle::open(&path)?
            };
            let work_dir = handle.work_dir().to_path_buf();
            inner.replace_handle(Some(Arc::new(handle)));
            Ok(OperationOutcome::Opened { work_dir })
        });
        ticket
    }

    /// Close the open working copy, releasing its lock.
    pub fn close_working_copy(&self) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::CloseWorkingCopy);
        let (completion, ticket) = self.inner.begin(descriptor);

        self.inner.run_detached(completion, |inner| {
            inner
                .replace_handle(None)
                .map(|_| OperationOutcome::Done)
                .ok_or(OpError::NoRepositoryOpen)
        });
        ticket
    }

    /// Stop the scheduler as configured, then close the working copy.
    pub fn shutdown(&self) {
        let settings = &self.inner.settings;
        self.shutdown_with(settings.shutdown_mode, settings.shutdown_wait);
    }

    /// Stop accepting operations. Queued ones drain or are cancelled per
    /// `mode`; the working copy is closed once the last has finished.
    /// Idempotent.
    pub fn shutdown_with(&self, mode: ShutdownMode, wait: bool) {
        let inner: Weak<Inner> = Arc::downgrade(&self.inner);
        self.inner.scheduler.shutdown_with(
            mode,
            wait,
            Some(Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.replace_handle(None);
                }
            })),
        );
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.scheduler.is_closed()
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The open handle, if any.
    pub fn handle(&self) -> Option<Arc<RepositoryHandle>> {
        self.inner.current_handle().filter(|h| h.is_open())
    }

    pub fn has_repository(&self) -> bool {
        self.handle().is_some()
    }

    pub fn work_dir(&self) -> Option<PathBuf> {
        self.handle().map(|h| h.work_dir().to_path_buf())
    }

    /// Run a read against a fresh instance.
    pub(crate) fn read<T>(
        &self,
        query: impl FnOnce(&mut Git) -> Result<T, GitError>,
    ) -> Result<T, OpError> {
        let handle = self.handle().ok_or(OpError::NoRepositoryOpen)?;
        let mut git = handle.reader()?;
        Ok(query(&mut git)?)
    }

    pub fn current_branch(&self) -> Result<BranchInfo, OpError> {
        self.read(|git| git.head_info())
    }

    pub fn is_detached_head(&self) -> Result<bool, OpError> {
        self.read(|git| git.is_head_detached())
    }

    pub fn repository_state(&self) -> Result<RepositoryState, OpError> {
        self.read(state::read_state)
    }

    pub fn status(&self) -> Result<RepositoryStatus, OpError> {
        self.read(state::read_status)
    }

    /// Ahead/behind of `local` against `upstream`, or its configured
    /// upstream when `None`.
    pub fn ahead_behind_counts(
        &self,
        local: &BranchName,
        upstream: Option<&str>,
    ) -> Result<AheadBehind, OpError> {
        self.read(|git| state::read_ahead_behind(git, local, upstream))
    }

    pub fn current_ahead_behind(&self) -> Result<AheadBehind, OpError> {
        self.read(|git| state::read_current_ahead_behind(git))
    }

    pub fn staged_changes(&self) -> Result<Vec<FileChange>, OpError> {
        self.read(|git| Ok(git.status()?.staged))
    }

    pub fn unstaged_changes(&self) -> Result<Vec<FileChange>, OpError> {
        self.read(|git| Ok(git.status()?.unstaged))
    }

    pub fn conflicting_files(&self) -> Result<Vec<FileChange>, OpError> {
        self.read(|git| Ok(git.status()?.conflicted))
    }

    pub fn stash_list(&self) -> Result<Vec<StashEntry>, OpError> {
        self.read(|git| git.stash_list())
    }

    pub fn branches(&self) -> Result<Vec<BranchName>, OpError> {
        self.read(|git| git.list_branches())
    }

    pub fn tags(&self) -> Result<Vec<String>, OpError> {
        self.read(|git| git.list_tags())
    }

    pub fn git_config(&self, key: &str) -> Result<Option<String>, OpError> {
        self.read(|git| git.config_get(key))
    }

    // =========================================================================
    // Index and commits
    // =========================================================================

    pub fn stage(&self, paths: Vec<String>) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::Stage)
            .with_payload(OperationPayload::Paths { paths: paths.clone() });
        self.submit_git(descriptor, move |git| {
            git.stage(&paths)?;
            Ok(OperationOutcome::Done)
        })
    }

    pub fn stage_all(&self) -> OperationTicket {
        self.submit_git(OperationDescriptor::new(OperationKind::Stage), |git| {
            git.stage_all()?;
            Ok(OperationOutcome::Done)
        })
    }

    pub fn unstage(&self, paths: Vec<String>) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::Unstage)
            .with_payload(OperationPayload::Paths { paths: paths.clone() });
        self.submit_git(descriptor, move |git| {
            git.unstage(&paths)?;
            Ok(OperationOutcome::Done)
        })
    }

    /// Throw away working-tree changes to `paths`.
    pub fn discard(&self, paths: Vec<String>) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::Discard)
            .with_payload(OperationPayload::Paths { paths: paths.clone() });
        self.submit_git(descriptor, move |git| {
            git.discard(&paths)?;
            Ok(OperationOutcome::Done)
        })
    }

    /// Commit the index. Concludes a merge when one is in progress.
    pub fn commit(&self, message: impl Into<String>) -> OperationTicket {
        let message = message.into();
        let descriptor = OperationDescriptor::new(OperationKind::Commit).with_payload(
            OperationPayload::Commit {
                message: message.clone(),
            },
        );
        self.submit_git(descriptor, move |git| {
            let oid = git.commit(&message)?;
            Ok(OperationOutcome::Committed { oid })
        })
    }

    pub fn reset(&self, revision: impl Into<String>, mode: ResetMode) -> OperationTicket {
        let revision = revision.into();
        let descriptor = OperationDescriptor::new(OperationKind::Reset).with_payload(
            OperationPayload::Reset {
                revision: revision.clone(),
                mode,
            },
        );
        self.submit_git(descriptor, move |git| {
            let head = git.reset(&revision, mode)?;
            Ok(OperationOutcome::Reset { head })
        })
    }

    // =========================================================================
    // Integration
    // =========================================================================

    /// Merge `source` (a branch or remote-tracking branch) into HEAD.
    pub fn merge(&self, source: impl Into<String>) -> OperationTicket {
        let source = source.into();
        let descriptor = OperationDescriptor::new(OperationKind::Merge).with_payload(
            OperationPayload::Merge {
                source: source.clone(),
            },
        );
        self.submit_git(descriptor, move |git| {
            Ok(OperationOutcome::Integrated(git.merge_into_head(&source)?))
        })
    }

    /// Resolve one conflicted path.
    pub fn resolve(&self, path: impl Into<String>, resolution: Resolution) -> OperationTicket {
        let path = path.into();
        let descriptor = OperationDescriptor::new(OperationKind::Resolve).with_payload(
            OperationPayload::Resolve {
                path: path.clone(),
                resolution,
            },
        );
        self.submit_git(descriptor, move |git| {
            match resolution {
                Resolution::Take(side) => git.resolve_using(&path, side)?,
                Resolution::AsEdited => git.mark_resolved(&path)?,
            }
            Ok(OperationOutcome::Done)
        })
    }

    // =========================================================================
    // Branches, tags, config
    // =========================================================================

    pub fn create_branch(&self, name: BranchName, start: Option<String>) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::BranchCreate).with_payload(
            OperationPayload::Branch {
                name: name.to_string(),
                start: start.clone(),
            },
        );
        self.submit_git(descriptor, move |git| {
            let head = git.create_branch(&name, start.as_deref())?;
            Ok(OperationOutcome::BranchCreated {
                name: name.to_string(),
                head,
            })
        })
    }

    pub fn delete_branch(&self, name: BranchName) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::BranchDelete).with_payload(
            OperationPayload::Branch {
                name: name.to_string(),
                start: None,
            },
        );
        self.submit_git(descriptor, move |git| {
            git.delete_branch(&name)?;
            Ok(OperationOutcome::Done)
        })
    }

    /// Tag HEAD; annotated when `message` is given.
    pub fn create_tag(&self, name: impl Into<String>, message: Option<String>) -> OperationTicket {
        let name = name.into();
        let descriptor = OperationDescriptor::new(OperationKind::TagCreate).with_payload(
            OperationPayload::Tag {
                name: name.clone(),
                message: message.clone(),
            },
        );
        self.submit_git(descriptor, move |git| {
            let target = git.create_tag(&name, message.as_deref())?;
            Ok(OperationOutcome::TagCreated { name, target })
        })
    }

    pub fn delete_tag(&self, name: impl Into<String>) -> OperationTicket {
        let name = name.into();
        let descriptor = OperationDescriptor::new(OperationKind::TagDelete).with_payload(
            OperationPayload::Tag {
                name: name.clone(),
                message: None,
            },
        );
        self.submit_git(descriptor, move |git| {
            git.delete_tag(&name)?;
            Ok(OperationOutcome::Done)
        })
    }

    /// Set a key in the repository's git config.
    pub fn update_config(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> OperationTicket {
        let (key, value) = (key.into(), value.into());
        let descriptor = OperationDescriptor::new(OperationKind::ConfigUpdate).with_payload(
            OperationPayload::Config {
                key: key.clone(),
                value: value.clone(),
            },
        );
        self.submit_git(descriptor, move |git| {
            git.config_set(&key, &value)?;
            Ok(OperationOutcome::Done)
        })
    }

    // =========================================================================
    // Stash
    // =========================================================================

    /// Stash uncommitted changes. `include_untracked` defaults to the
    /// configured setting.
    pub fn create_stash(
        &self,
        message: Option<String>,
        include_untracked: Option<bool>,
    ) -> OperationTicket {
        let include_untracked =
            include_untracked.unwrap_or(self.inner.settings.stash_include_untracked);
        let descriptor = OperationDescriptor::new(OperationKind::StashCreate).with_payload(
            OperationPayload::Stash {
                entry: None,
                message: message.clone(),
            },
        );
        self.submit_git(descriptor, move |git| {
            let entry = git.stash_save(message.as_deref(), include_untracked)?;
            Ok(OperationOutcome::Stashed(entry))
        })
    }

    pub fn drop_stash(&self, entry: StashRef) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::StashDrop).with_payload(
            OperationPayload::Stash {
                entry: Some(entry.clone()),
                message: None,
            },
        );
        self.submit_git(descriptor, move |git| {
            let index = stash_index(git, &entry)?;
            let dropped = git.stash_drop(index)?;
            Ok(OperationOutcome::StashDropped {
                entries: vec![dropped],
            })
        })
    }

    pub fn drop_all_stashes(&self) -> OperationTicket {
        let descriptor = OperationDescriptor::new(OperationKind::StashDropAll);
        self.submit_git(descriptor, |git| {
            let entries = git.stash_list()?;
            git.stash_clear()?;
            Ok(OperationOutcome::StashDropped { entries })
        })
    }
}

/// Position of `entry` in the stash stack right now.
pub(crate) fn stash_index(git: &mut Git, entry: &StashRef) -> Result<usize, GitError> {
    match entry {
        StashRef::Index(index) => Ok(*index),
        StashRef::Commit(oid) => git.stash_index_of(oid),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::process::Command;
    use std::sync::Mutex;
    use tempfile::TempDir;

    pub(crate) fn git(dir: &Path, args: &[&str]) {
        let output = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .expect("failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    /// A repository on `main` with one commit of `file.txt`.
    pub(crate) fn repo() -> TempDir {
        let dir = TempDir::new().unwrap();
        let path = dir.path();
        git(path, &["init", "-b", "main"]);
        git(path, &["config", "user.email", "test@example.com"]);
        git(path, &["config", "user.name", "Test User"]);
        std::fs::write(path.join("file.txt"), "one\n").unwrap();
        git(path, &["add", "file.txt"]);
        git(path, &["commit", "-m", "initial"]);
        dir
    }

    pub(crate) fn opened(dir: &TempDir) -> Orchestrator {
        let orchestrator = Orchestrator::new(OrchestratorSettings::default()).unwrap();
        orchestrator.open_working_copy(dir.path()).wait().unwrap();
        orchestrator
    }

    /// Collects event names as `"<kind>:<phase>"`.
    pub(crate) fn record(orchestrator: &Orchestrator) -> Arc<Mutex<Vec<String>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        orchestrator.subscribe_fn(move |event| {
            let phase = match event {
                OperationEvent::AboutToStart { .. } => "start",
                OperationEvent::Succeeded { .. } => "ok",
                OperationEvent::Failed { .. } => "failed",
            };
            sink.lock()
                .unwrap()
                .push(format!("{}:{}", event.descriptor().kind, phase));
            Ok(())
        });
        log
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn open_reports_work_dir() {
            let dir = repo();
            let orchestrator = Orchestrator::new(OrchestratorSettings::default()).unwrap();
            let outcome = orchestrator.open_working_copy(dir.path()).wait().unwrap();

            let OperationOutcome::Opened { work_dir } = outcome else {
                panic!("unexpected {outcome:?}");
            };
            assert_eq!(
                work_dir.canonicalize().unwrap(),
                dir.path().canonicalize().unwrap()
            );
            assert!(orchestrator.has_repository());
        }

        #[test]
        fn queries_without_repository_fail() {
            let orchestrator = Orchestrator::new(OrchestratorSettings::default()).unwrap();
            assert!(matches!(
                orchestrator.current_branch(),
                Err(OpError::NoRepositoryOpen)
            ));
            assert!(matches!(
                orchestrator.stage_all().wait(),
                Err(OpError::NoRepositoryOpen)
            ));
        }

        #[test]
        fn failed_open_leaves_nothing_open() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let missing = dir.path().join("does/not/exist");

            assert!(orchestrator.open_working_copy(&missing).wait().is_err());
            assert!(!orchestrator.has_repository());
        }

        #[test]
        fn close_releases_the_lock() {
            let dir = repo();
            let orchestrator = opened(&dir);
            orchestrator.close_working_copy().wait().unwrap();
            assert!(!orchestrator.has_repository());

            let other = opened(&dir);
            assert!(other.has_repository());
            assert!(matches!(
                orchestrator.close_working_copy().wait(),
                Err(OpError::NoRepositoryOpen)
            ));
        }

        #[test]
        fn shutdown_rejects_later_operations() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let log = record(&orchestrator);

            orchestrator.shutdown();
            assert!(orchestrator.is_shut_down());
            assert!(matches!(
                orchestrator.stage_all().wait(),
                Err(OpError::SchedulerClosed)
            ));
            assert_eq!(*log.lock().unwrap(), vec!["stage:start", "stage:failed"]);
            // Teardown closed the working copy.
            assert!(!orchestrator.has_repository());
        }
    }

    mod events {
        use super::*;

        #[test]
        fn every_start_has_one_terminal_event() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let log = record(&orchestrator);

            std::fs::write(dir.path().join("file.txt"), "two\n").unwrap();
            orchestrator.stage(vec!["file.txt".into()]).wait().unwrap();
            orchestrator.commit("second").wait().unwrap();
            assert!(orchestrator.commit("nothing").wait().is_err());

            assert_eq!(
                *log.lock().unwrap(),
                vec![
                    "stage:start",
                    "stage:ok",
                    "commit:start",
                    "commit:ok",
                    "commit:start",
                    "commit:failed",
                ]
            );
        }

        #[test]
        fn terminal_events_carry_fresh_state() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let states = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&states);
            orchestrator.subscribe_fn(move |event| {
                if let Some(state) = event.state() {
                    sink.lock().unwrap().push(state.clone());
                }
                Ok(())
            });

            std::fs::write(dir.path().join("file.txt"), "two\n").unwrap();
            orchestrator.stage_all().wait().unwrap();
            orchestrator.commit("second").wait().unwrap();

            let states = states.lock().unwrap();
            assert!(states[0].has_uncommitted_changes());
            assert!(states[1].is_clean());
        }

        #[test]
        fn failing_listener_does_not_fail_the_operation() {
            let dir = repo();
            let orchestrator = opened(&dir);
            orchestrator.subscribe_fn(|_| anyhow::bail!("listener broke"));

            std::fs::write(dir.path().join("new.txt"), "x").unwrap();
            assert!(orchestrator.stage(vec!["new.txt".into()]).wait().is_ok());
        }
    }

    mod operations {
        use super::*;
        use crate::core::types::ChangeKind;

        #[test]
        fn stage_then_unstage() {
            let dir = repo();
            let orchestrator = opened(&dir);
            std::fs::write(dir.path().join("new.txt"), "x").unwrap();

            orchestrator.stage(vec!["new.txt".into()]).wait().unwrap();
            let staged = orchestrator.staged_changes().unwrap();
            assert_eq!(staged, vec![FileChange::new("new.txt", ChangeKind::Added)]);

            orchestrator.unstage(vec!["new.txt".into()]).wait().unwrap();
            assert!(orchestrator.staged_changes().unwrap().is_empty());
        }

        #[test]
        fn discard_restores_file() {
            let dir = repo();
            let orchestrator = opened(&dir);
            std::fs::write(dir.path().join("file.txt"), "changed\n").unwrap();

            orchestrator.discard(vec!["file.txt".into()]).wait().unwrap();
            let content = std::fs::read_to_string(dir.path().join("file.txt")).unwrap();
            assert_eq!(content, "one\n");
        }

        #[test]
        fn branch_and_tag_round_trip() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let feature = BranchName::new("feature").unwrap();

            orchestrator
                .create_branch(feature.clone(), None)
                .wait()
                .unwrap();
            assert!(orchestrator.branches().unwrap().contains(&feature));
            orchestrator.delete_branch(feature.clone()).wait().unwrap();
            assert!(!orchestrator.branches().unwrap().contains(&feature));

            orchestrator
                .create_tag("v1.0", Some("release".into()))
                .wait()
                .unwrap();
            assert_eq!(orchestrator.tags().unwrap(), vec!["v1.0".to_string()]);
            orchestrator.delete_tag("v1.0").wait().unwrap();
            assert!(orchestrator.tags().unwrap().is_empty());
        }

        #[test]
        fn config_update_writes_git_config() {
            let dir = repo();
            let orchestrator = opened(&dir);
            orchestrator
                .update_config("stagehand.test", "yes")
                .wait()
                .unwrap();
            assert_eq!(
                orchestrator.git_config("stagehand.test").unwrap().as_deref(),
                Some("yes")
            );
        }

        #[test]
        fn stash_create_and_drop() {
            let dir = repo();
            let orchestrator = opened(&dir);
            std::fs::write(dir.path().join("file.txt"), "changed\n").unwrap();

            let outcome = orchestrator
                .create_stash(Some("wip".into()), None)
                .wait()
                .unwrap();
            let OperationOutcome::Stashed(Some(entry)) = outcome else {
                panic!("unexpected {outcome:?}");
            };
            assert!(orchestrator.repository_state().unwrap().is_clean());

            orchestrator
                .drop_stash(StashRef::Commit(entry.oid))
                .wait()
                .unwrap();
            assert!(orchestrator.stash_list().unwrap().is_empty());
        }

        #[test]
        fn stash_with_nothing_to_save() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let outcome = orchestrator.create_stash(None, None).wait().unwrap();
            assert_eq!(outcome, OperationOutcome::Stashed(None));
        }

        #[test]
        fn reset_hard_moves_head() {
            let dir = repo();
            let orchestrator = opened(&dir);
            let first = orchestrator.current_branch().unwrap().head.unwrap();

            std::fs::write(dir.path().join("file.txt"), "two\n").unwrap();
            orchestrator.stage_all().wait().unwrap();
            orchestrator.commit("second").wait().unwrap();

            let outcome = orchestrator
                .reset(first.to_string(), ResetMode::Hard)
                .wait()
                .unwrap();
            assert_eq!(outcome, OperationOutcome::Reset { head: first });
        }
    }
}
