//! Task completion and the handle returned to callers.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use futures::task::AtomicWaker;
use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use super::task::TaskOutput;
use crate::cancel::CancelToken;
use crate::{Error, Result};

/// Lifecycle of a submitted task.
///
/// `Queued -> Running -> {Succeeded, Failed}`; a task cancelled while queued
/// goes straight to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

struct Slot {
    state: TaskState,
    result: Option<Result<TaskOutput>>,
}

/// One-shot rendezvous between a worker and the task's handle.
///
/// The first call to [`Completion::finish`] wins; later results are dropped.
pub(crate) struct Completion {
    slot: Mutex<Slot>,
    ready: Condvar,
    waker: AtomicWaker,
}

impl Completion {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(Slot {
                state: TaskState::Queued,
                result: None,
            }),
            ready: Condvar::new(),
            waker: AtomicWaker::new(),
        })
    }

    /// A completion that already holds `result`.
    pub(crate) fn finished(result: Result<TaskOutput>) -> Arc<Self> {
        let completion = Self::new();
        completion.finish(result);
        completion
    }

    /// Move a queued task to `Running`. False if it already finished.
    pub(crate) fn start(&self) -> bool {
        let mut slot = self.slot.lock();
        if slot.state != TaskState::Queued {
            return false;
        }
        slot.state = TaskState::Running;
        true
    }

    /// Store the task's result and wake its waiters. False if a result was already stored.
    pub(crate) fn finish(&self, result: Result<TaskOutput>) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.state.is_terminal() {
                return false;
            }
            slot.state = if result.is_ok() {
                TaskState::Succeeded
            } else {
                TaskState::Failed
            };
            slot.result = Some(result);
        }
        self.notify();
        true
    }

    /// Fail the task with [`Error::Cancelled`] if no worker picked it up yet.
    fn cancel_queued(&self) -> bool {
        {
            let mut slot = self.slot.lock();
            if slot.state != TaskState::Queued {
                return false;
            }
            slot.state = TaskState::Failed;
            slot.result = Some(Err(Error::Cancelled));
        }
        self.notify();
        true
    }

    fn notify(&self) {
        self.ready.notify_all();
        self.waker.wake();
    }

    pub(crate) fn state(&self) -> TaskState {
        self.slot.lock().state
    }

    fn take(&self) -> Option<Result<TaskOutput>> {
        self.slot.lock().result.take()
    }
}

/// Handle to a task running on a [`crate::WorkerPool`].
///
/// Await it (it is a [`Future`]) or block on it with [`TaskHandle::wait`]. The
/// result is delivered once; dropping the handle does not cancel the task.
#[must_use = "a task handle does nothing unless awaited or waited on"]
pub struct TaskHandle<T> {
    id: u64,
    completion: Arc<Completion>,
    cancel: CancelToken,
    extract: fn(TaskOutput) -> Result<T>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(
        id: u64,
        completion: Arc<Completion>,
        cancel: CancelToken,
        extract: fn(TaskOutput) -> Result<T>,
    ) -> Self {
        Self {
            id,
            completion,
            cancel,
            extract,
        }
    }

    /// A handle that has already failed with `error`, for tasks rejected before queueing.
    pub(crate) fn failed(id: u64, error: Error, extract: fn(TaskOutput) -> Result<T>) -> Self {
        Self::new(id, Completion::finished(Err(error)), CancelToken::new(), extract)
    }

    /// Pool-unique task id.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.completion.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
    }

    /// Request cancellation.
    ///
    /// A queued task fails immediately with [`Error::Cancelled`] and never
    /// runs. A running task stops at its next cancellation check; a task that
    /// already finished keeps its result.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.completion.cancel_queued();
    }

    /// Block the current thread until the task finishes.
    pub fn wait(self) -> Result<T> {
        let extract = self.extract;
        let mut slot = self.completion.slot.lock();
        loop {
            if let Some(result) = slot.result.take() {
                return result.and_then(extract);
            }
            if slot.state.is_terminal() {
                return Err(Error::WorkerLost);
            }
            self.completion.ready.wait(&mut slot);
        }
    }

    /// Block for at most `timeout`.
    ///
    /// On [`Error::Timeout`] the task keeps running and the handle stays usable.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.completion.slot.lock();
        loop {
            if let Some(result) = slot.result.take() {
                return result.and_then(self.extract);
            }
            if slot.state.is_terminal() {
                return Err(Error::WorkerLost);
            }
            if self
                .completion
                .ready
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                return match slot.result.take() {
                    Some(result) => result.and_then(self.extract),
                    None => Err(Error::Timeout(timeout)),
                };
            }
        }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.waker.register(cx.waker());
        match self.completion.take() {
            Some(result) => Poll::Ready(result.and_then(self.extract)),
            None if self.completion.state().is_terminal() => Poll::Ready(Err(Error::WorkerLost)),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish()
    }
}
