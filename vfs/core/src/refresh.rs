//! Scheduling and execution of cache resynchronization.
//!
//! A [`RefreshSession`] collects target nodes and external events, then is
//! consumed by [`RefreshSession::launch`]. Synchronous sessions run on the
//! calling thread; asynchronous ones go to the configured executor.
//!
//! Every submitted job is called exactly once: with [`JobMode::Run`] by the
//! executor, or with [`JobMode::Abandon`] when the executor is shut down
//! before it got to the job. Abandoned sessions still report completion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, unbounded};
use parking_lot::Mutex;

use crate::cancel::CancellationToken;
use crate::config::{RefreshExecutor, VfsConfig};
use crate::ids::SessionId;
use crate::node::FileNode;
use crate::vfs::VfsShared;
use crate::{VfsEvent, VfsResult};

pub type FinishCallback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum JobMode {
    Run,
    Abandon,
}

pub(crate) type Job = Box<dyn FnOnce(JobMode) + Send + 'static>;

pub(crate) enum Executor {
    Background {
        sender: Mutex<Option<Sender<Job>>>,
        worker: Mutex<Option<JoinHandle<()>>>,
    },
    /// `None` once shut down.
    Deferred {
        pending: Mutex<Option<VecDeque<Job>>>,
    },
}

impl Executor {
    pub(crate) fn new(config: &VfsConfig) -> VfsResult<Self> {
        match config.refresh_executor {
            RefreshExecutor::Deferred => Ok(Self::Deferred {
                pending: Mutex::new(Some(VecDeque::new())),
            }),
            RefreshExecutor::Background => {
                let (sender, receiver) = unbounded::<Job>();
                let worker = thread::Builder::new()
                    .name(config.refresh_thread_name.clone())
                    .spawn(move || {
                        for job in receiver.iter() {
                            job(JobMode::Run);
                        }
                        tracing::trace!("refresh worker stopped");
                    })?;
                Ok(Self::Background {
                    sender: Mutex::new(Some(sender)),
                    worker: Mutex::new(Some(worker)),
                })
            }
        }
    }

    fn submit(&self, job: Job) {
        let rejected = match self {
            Self::Background { sender, .. } => match sender.lock().as_ref() {
                Some(sender) => sender.send(job).err().map(|err| err.into_inner()),
                None => Some(job),
            },
            Self::Deferred { pending } => match pending.lock().as_mut() {
                Some(queue) => {
                    queue.push_back(job);
                    None
                }
                None => Some(job),
            },
        };
        if let Some(job) = rejected {
            tracing::debug!("refresh executor is shut down, abandoning job");
            job(JobMode::Abandon);
        }
    }

    /// Stop accepting jobs and wait for the worker to drain.
    pub(crate) fn shutdown(&self) {
        match self {
            Self::Background { sender, worker } => {
                sender.lock().take();
                let Some(handle) = worker.lock().take() else {
                    return;
                };
                if handle.thread().id() == thread::current().id() {
                    return;
                }
                if handle.join().is_err() {
                    tracing::warn!("refresh worker panicked");
                }
            }
            Self::Deferred { pending } => {
                let queued = pending.lock().take().unwrap_or_default();
                if !queued.is_empty() {
                    tracing::debug!(jobs = queued.len(), "abandoning queued refresh jobs");
                }
                for job in queued {
                    job(JobMode::Abandon);
                }
            }
        }
    }
}

pub struct RefreshQueue {
    shared: Weak<VfsShared>,
    executor: Arc<Executor>,
    next_session: AtomicU64,
}

impl RefreshQueue {
    pub(crate) fn new(shared: Weak<VfsShared>, executor: Executor) -> Self {
        Self {
            shared,
            executor: Arc::new(executor),
            next_session: AtomicU64::new(1),
        }
    }

    pub fn create_session(
        &self,
        asynchronous: bool,
        recursive: bool,
        on_finish: Option<FinishCallback>,
    ) -> RefreshSession {
        RefreshSession {
            id: SessionId(self.next_session.fetch_add(1, Ordering::Relaxed)),
            shared: self.shared.clone(),
            executor: self.executor.clone(),
            asynchronous,
            recursive,
            targets: Vec::new(),
            events: Vec::new(),
            token: CancellationToken::new(),
            on_finish,
        }
    }

    /// One-shot session over `targets`.
    pub fn refresh(
        &self,
        asynchronous: bool,
        recursive: bool,
        on_finish: Option<FinishCallback>,
        targets: impl IntoIterator<Item = FileNode>,
    ) {
        let mut session = self.create_session(asynchronous, recursive, on_finish);
        session.add_all_files(targets);
        session.launch();
    }

    /// Run queued jobs until the queue is empty; returns how many ran.
    ///
    /// Only the deferred executor queues jobs; with the background executor
    /// this returns 0.
    pub fn run_pending(&self) -> usize {
        let Executor::Deferred { pending } = self.executor.as_ref() else {
            return 0;
        };
        let mut ran = 0;
        loop {
            let Some(job) = pending.lock().as_mut().and_then(VecDeque::pop_front) else {
                return ran;
            };
            job(JobMode::Run);
            ran += 1;
        }
    }

    /// Number of queued jobs of the deferred executor.
    pub fn pending(&self) -> usize {
        match self.executor.as_ref() {
            Executor::Deferred { pending } => pending.lock().as_ref().map_or(0, VecDeque::len),
            Executor::Background { .. } => 0,
        }
    }

    pub(crate) fn submit(&self, job: Job) {
        self.executor.submit(job);
    }

    pub(crate) fn shutdown(&self) {
        self.executor.shutdown();
    }
}

/// A one-shot batch of nodes (and events) to resynchronize.
pub struct RefreshSession {
    id: SessionId,
    shared: Weak<VfsShared>,
    executor: Arc<Executor>,
    asynchronous: bool,
    recursive: bool,
    targets: Vec<FileNode>,
    events: Vec<VfsEvent>,
    token: CancellationToken,
    on_finish: Option<FinishCallback>,
}

impl RefreshSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn add_file(&mut self, node: FileNode) {
        self.targets.push(node);
    }

    pub fn add_all_files(&mut self, nodes: impl IntoIterator<Item = FileNode>) {
        self.targets.extend(nodes);
    }

    /// Process `event` as is, without rediscovering it from the nodes.
    pub fn add_event(&mut self, event: VfsEvent) {
        self.events.push(event);
    }

    /// Token observed by the session once launched.
    pub fn cancellation(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Best effort: a session already past its last check completes.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn launch(self) {
        if self.asynchronous {
            let executor = self.executor.clone();
            tracing::trace!(session = self.id.0, "queued refresh session");
            executor.submit(Box::new(move |mode| match mode {
                JobMode::Run => self.run(),
                JobMode::Abandon => self.abandon(),
            }));
        } else {
            self.run();
        }
    }

    /// Finish without refreshing anything.
    fn abandon(self) {
        tracing::debug!(session = self.id.0, "refresh session abandoned");
        if let Some(on_finish) = self.on_finish {
            on_finish();
        }
    }

    fn run(self) {
        let Self {
            id,
            shared,
            recursive,
            targets,
            events: external,
            token,
            on_finish,
            ..
        } = self;
        let Some(shared) = shared.upgrade() else {
            if let Some(on_finish) = on_finish {
                on_finish();
            }
            return;
        };

        tracing::debug!(session = id.0, targets = targets.len(), recursive, "refresh session started");
        let mut events = Vec::new();
        token.scope(|| {
            for target in &targets {
                if token.check("refresh.session").is_err() {
                    break;
                }
                if let Err(err) = target.refresh_internal(recursive, &mut events) {
                    if err.is_cancelled() {
                        break;
                    }
                    tracing::warn!(session = id.0, url = %target.url(), error = %err, "refresh failed");
                }
            }
        });

        let cancelled = token.is_cancelled();
        let external = if cancelled {
            tracing::debug!(session = id.0, observed = events.len(), "refresh session cancelled");
            Vec::new()
        } else {
            external
        };
        let count = events.len() + external.len();
        if !events.is_empty() {
            shared.process_observed_events(events);
        }
        if !external.is_empty() {
            shared.process_events(external);
        }
        tracing::debug!(session = id.0, events = count, cancelled, "refresh session finished");
        if let Some(on_finish) = on_finish {
            on_finish();
        }
    }
}
