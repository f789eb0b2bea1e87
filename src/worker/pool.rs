//! Fixed-size pool of worker threads sharing one FIFO queue.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, trace, warn};

use super::config::PoolConfig;
use super::handle::{Completion, TaskHandle};
use super::stats::{PoolCounters, PoolStats};
use super::task::{TaskCall, TaskOutput};
use crate::cancel::CancelToken;
use crate::{Error, Result};

type Work = Box<dyn FnOnce(&CancelToken) -> Result<TaskOutput> + Send + 'static>;

/// A queued unit of work.
struct Job {
    id: u64,
    name: &'static str,
    work: Option<Work>,
    cancel: CancelToken,
    completion: Arc<Completion>,
}

impl Drop for Job {
    fn drop(&mut self) {
        // A job dropped before delivering leaves its handle waiting forever otherwise
        self.completion.finish(Err(Error::WorkerLost));
    }
}

/// State shared by the pool and its worker threads.
struct Shared {
    config: PoolConfig,
    receiver: Receiver<Job>,
    counters: PoolCounters,
    units: Mutex<Vec<JoinHandle<()>>>,
}

/// A fixed set of worker threads executing [`TaskCall`]s.
///
/// At most `max_workers` tasks run at once; the rest wait in an unbounded
/// FIFO queue. Tasks are isolated: each owns its arguments, and a task that
/// panics fails alone with [`Error::WorkerPanicked`] while its thread is
/// replaced.
///
/// Dropping the pool shuts it down (see [`WorkerPool::shutdown`]).
pub struct WorkerPool {
    shared: Arc<Shared>,
    sender: Mutex<Option<Sender<Job>>>,
    next_id: AtomicU64,
}

impl WorkerPool {
    /// Start `config.max_workers` worker threads.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for an invalid configuration, [`Error::Io`] if a
    /// thread cannot be spawned.
    pub fn new(config: PoolConfig) -> Result<Self> {
        config.validate()?;

        let (sender, receiver) = unbounded();
        let shared = Arc::new(Shared {
            config,
            receiver,
            counters: PoolCounters::default(),
            units: Mutex::new(Vec::new()),
        });

        for index in 0..shared.config.max_workers {
            let unit = spawn_unit(&shared, index)?;
            shared.units.lock().push(unit);
        }

        info!(
            workers = shared.config.max_workers,
            prefix = %shared.config.thread_name_prefix,
            "worker pool started"
        );

        Ok(Self {
            shared,
            sender: Mutex::new(Some(sender)),
            next_id: AtomicU64::new(1),
        })
    }

    /// Start a pool configured from the environment (see [`PoolConfig::from_env`]).
    pub fn from_env() -> Result<Self> {
        Self::new(PoolConfig::from_env())
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn max_workers(&self) -> usize {
        self.shared.config.max_workers
    }

    /// Queue `call` for execution.
    ///
    /// A call that fails its up-front checks ([`TaskCall::validate`]) is not
    /// queued; the returned handle has already failed.
    ///
    /// # Errors
    /// [`Error::PoolClosed`] after [`WorkerPool::shutdown`].
    pub fn submit(&self, call: TaskCall) -> Result<TaskHandle<TaskOutput>> {
        self.submit_with(call, Ok)
    }

    /// Queue a call given by function name and JSON arguments.
    ///
    /// Nothing is queued when the name or arguments are rejected (see
    /// [`TaskCall::from_json`]).
    pub fn submit_named(&self, name: &str, args: Value) -> Result<TaskHandle<TaskOutput>> {
        let call = TaskCall::from_json(name, args)?;
        self.submit(call)
    }

    pub(crate) fn submit_with<T>(
        &self,
        call: TaskCall,
        extract: fn(TaskOutput) -> Result<T>,
    ) -> Result<TaskHandle<T>> {
        if let Err(e) = call.validate() {
            if self.is_closed() {
                return Err(Error::PoolClosed);
            }
            debug!(function = %call.function(), error = %e, "task rejected before queueing");
            return Ok(TaskHandle::failed(self.next_id(), e, extract));
        }

        let name = call.function().name();
        self.enqueue(name, Box::new(move |cancel: &CancelToken| call.execute(cancel)), extract)
    }

    /// Like [`WorkerPool::submit_with`], with a closed pool reported through the handle.
    pub(crate) fn call<T>(&self, call: TaskCall, extract: fn(TaskOutput) -> Result<T>) -> TaskHandle<T> {
        match self.submit_with(call, extract) {
            Ok(handle) => handle,
            Err(e) => TaskHandle::failed(self.next_id(), e, extract),
        }
    }

    fn enqueue<T>(
        &self,
        name: &'static str,
        work: Work,
        extract: fn(TaskOutput) -> Result<T>,
    ) -> Result<TaskHandle<T>> {
        let sender = self.sender.lock();
        let sender = sender.as_ref().ok_or(Error::PoolClosed)?;

        let id = self.next_id();
        let cancel = CancelToken::new();
        let completion = Completion::new();
        let job = Job {
            id,
            name,
            work: Some(work),
            cancel: cancel.clone(),
            completion: Arc::clone(&completion),
        };

        self.shared.counters.record_submitted();
        // The pool keeps a receiver alive, so sending cannot fail while open
        sender.send(job).map_err(|_| Error::PoolClosed)?;
        trace!(task = id, function = name, "task queued");

        Ok(TaskHandle::new(id, completion, cancel, extract))
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.shared.receiver.len()
    }

    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.lock().is_none()
    }

    /// Stop accepting tasks, run everything already queued, and join all workers.
    ///
    /// Idempotent. Later submissions fail with [`Error::PoolClosed`].
    pub fn shutdown(&self) {
        let Some(sender) = self.sender.lock().take() else {
            return;
        };
        drop(sender);
        info!(queued = self.queued(), "worker pool shutting down");

        let current = thread::current().id();
        loop {
            // Respawned units push their handle before the old one exits
            let Some(unit) = self.shared.units.lock().pop() else {
                break;
            };
            if unit.thread().id() == current {
                continue;
            }
            if unit.join().is_err() {
                warn!("worker thread exited with a panic");
            }
        }

        let stats = self.stats();
        info!(
            succeeded = stats.succeeded,
            failed = stats.failed,
            cancelled = stats.cancelled,
            respawned = stats.respawned,
            "worker pool stopped"
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.shared.config)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_unit(shared: &Arc<Shared>, index: usize) -> Result<JoinHandle<()>> {
    let mut builder =
        thread::Builder::new().name(format!("{}-{}", shared.config.thread_name_prefix, index));
    if let Some(stack_size) = shared.config.stack_size {
        builder = builder.stack_size(stack_size);
    }

    let unit_shared = Arc::clone(shared);
    Ok(builder.spawn(move || run_unit(unit_shared, index))?)
}

fn run_unit(shared: Arc<Shared>, index: usize) {
    debug!(worker = index, "worker started");

    while let Ok(job) = shared.receiver.recv() {
        if run_job(&shared, job) {
            respawn(&shared, index);
            return;
        }
    }

    debug!(worker = index, "worker stopped");
}

/// Replace the calling unit after a panic.
fn respawn(shared: &Arc<Shared>, index: usize) {
    shared.counters.record_respawned();
    match spawn_unit(shared, index) {
        Ok(unit) => {
            shared.units.lock().push(unit);
            warn!(worker = index, "worker replaced after panic");
        }
        Err(e) => error!(worker = index, error = %e, "failed to replace worker"),
    }
}

/// Run one job to completion. Returns true if the task panicked.
fn run_job(shared: &Shared, mut job: Job) -> bool {
    let work = match job.work.take() {
        Some(work) if !job.cancel.is_cancelled() && job.completion.start() => work,
        _ => {
            trace!(task = job.id, function = job.name, "skipping cancelled task");
            job.completion.finish(Err(Error::Cancelled));
            shared.counters.record_cancelled();
            return false;
        }
    };

    shared.counters.record_started();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(&job.cancel)));
    shared.counters.record_stopped();

    let (result, panicked) = match outcome {
        Ok(result) => (result, false),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(task = job.id, function = job.name, panic = %message, "task panicked");
            (Err(Error::WorkerPanicked(message)), true)
        }
    };

    match &result {
        Ok(_) => shared.counters.record_succeeded(),
        Err(Error::Cancelled) => shared.counters.record_cancelled(),
        Err(e) => {
            if !panicked {
                debug!(task = job.id, function = job.name, error = %e, "task failed");
            }
            shared.counters.record_failed();
        }
    }

    job.completion.finish(result);
    panicked
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
