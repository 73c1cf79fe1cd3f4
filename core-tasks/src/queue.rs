//! # Task Queue
//!
//! Registry of in-flight asynchronous jobs, addressable by name and tag.
//!
//! ## Overview
//!
//! [`TaskQueue::enqueue`] registers a [`Task`] and spawns its body on the
//! Tokio runtime. The task stays in the queue until the body settles, then
//! removes itself before publishing its [`TaskOutcome`], so a waiter that
//! wakes up never finds the settled task still listed.
//!
//! The queue's lock only guards the bookkeeping list. Bodies run off the
//! lock, and cancellation and waiting act on a snapshot taken under it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_tasks::TaskQueue;
//!
//! let queue = TaskQueue::new();
//! let task = queue.enqueue("sync:spotify", "sync:spotify", |task| async move {
//!     while !task.is_cancelled() {
//!         // fetch the next page
//!     }
//!     Ok::<_, std::io::Error>(())
//! });
//!
//! queue.cancel_by_tag("sync:spotify");
//! queue.wait_for_tag("sync:spotify").await;
//! assert!(task.outcome().is_some());
//! ```

use crate::task::{Task, TaskOutcome, TaskState};
use crate::TaskError;
use core_runtime::events::{CoreEvent, EventBus, TaskEvent};
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Result of [`TaskQueue::enqueue_unique`].
#[derive(Debug, Clone)]
pub enum Enqueued {
    /// A new task was registered and started.
    New(Task),
    /// A task with the same name was already queued; nothing was started.
    Existing(Task),
}

impl Enqueued {
    pub fn task(&self) -> &Task {
        match self {
            Enqueued::New(task) | Enqueued::Existing(task) => task,
        }
    }

    pub fn into_task(self) -> Task {
        match self {
            Enqueued::New(task) | Enqueued::Existing(task) => task,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Enqueued::New(_))
    }
}

struct QueueInner {
    tasks: Mutex<Vec<Task>>,
    events: Option<EventBus>,
}

impl QueueInner {
    fn lock(&self) -> MutexGuard<'_, Vec<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: TaskEvent) {
        if let Some(bus) = &self.events {
            let _ = bus.emit(CoreEvent::Task(event));
        }
    }
}

/// Tagged, cancellable registry of running tasks
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                tasks: Mutex::new(Vec::new()),
                events: None,
            }),
        }
    }

    /// Publish `TaskEvent`s on `bus`.
    pub fn with_event_bus(bus: EventBus) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                tasks: Mutex::new(Vec::new()),
                events: Some(bus),
            }),
        }
    }

    // ------------------------------------------------------------------------
    // Enqueue
    // ------------------------------------------------------------------------

    /// Register a task and start `body` on the runtime.
    ///
    /// Names are not checked: callers that need one task per name look it up
    /// with [`find_by_name`](Self::find_by_name) first, or use
    /// [`enqueue_unique`](Self::enqueue_unique).
    ///
    /// A body that returns `Err` after cancellation was requested settles as
    /// [`TaskOutcome::Cancelled`]. A panicking body settles as
    /// [`TaskOutcome::Failed`] with [`TaskError::Panicked`].
    pub fn enqueue<F, Fut, E>(&self, name: impl Into<String>, tag: impl Into<String>, body: F) -> Task
    where
        F: FnOnce(Task) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let task = Task::new(name, tag);
        self.inner.lock().push(task.clone());
        self.start(task.clone(), body);
        task
    }

    /// Like [`enqueue`](Self::enqueue), but returns the queued task with the
    /// same name instead when there is one. The lookup and the insert happen
    /// under one lock acquisition.
    ///
    /// A task whose cancellation was requested still counts until it settles.
    pub fn enqueue_unique<F, Fut, E>(
        &self,
        name: impl Into<String>,
        tag: impl Into<String>,
        body: F,
    ) -> Enqueued
    where
        F: FnOnce(Task) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let name = name.into();
        let task = {
            let mut tasks = self.inner.lock();
            if let Some(existing) = tasks.iter().find(|task| task.name() == name) {
                debug!(task = %name, "Task already queued");
                return Enqueued::Existing(existing.clone());
            }
            let task = Task::new(name, tag);
            tasks.push(task.clone());
            task
        };
        self.start(task.clone(), body);
        Enqueued::New(task)
    }

    fn start<F, Fut, E>(&self, task: Task, body: F)
    where
        F: FnOnce(Task) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        info!(task = %task.name(), tag = %task.tag(), id = %task.id(), "Task enqueued");
        self.inner.emit(TaskEvent::Enqueued {
            task_id: task.id().as_str(),
            name: task.name().to_string(),
            tag: task.tag().to_string(),
        });

        let queue = self.clone();
        tokio::spawn(async move {
            let outcome = run_body(&task, body).await;
            queue.remove(&task);
            queue.settle(&task, outcome);
        });
    }

    fn settle(&self, task: &Task, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Completed => debug!(task = %task.name(), "Task completed"),
            TaskOutcome::Failed(error) => warn!(task = %task.name(), error = %error, "Task failed"),
            TaskOutcome::Cancelled => info!(task = %task.name(), "Task cancelled"),
        }
        let state = outcome.state();
        task.settle(outcome);
        self.inner.emit(TaskEvent::Settled {
            task_id: task.id().as_str(),
            name: task.name().to_string(),
            tag: task.tag().to_string(),
            state: state.as_str().to_string(),
        });
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    /// First queued task named `name`, in insertion order.
    pub fn find_by_name(&self, name: &str) -> Option<Task> {
        self.inner.lock().iter().find(|task| task.name() == name).cloned()
    }

    /// First queued task tagged `tag`, in insertion order.
    pub fn find_by_tag(&self, tag: &str) -> Option<Task> {
        self.inner.lock().iter().find(|task| task.tag() == tag).cloned()
    }

    pub fn find_all_by_tag(&self, tag: &str) -> Vec<Task> {
        self.inner
            .lock()
            .iter()
            .filter(|task| task.tag() == tag)
            .cloned()
            .collect()
    }

    /// Snapshot of every queued task.
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.lock().clone()
    }

    pub fn task_count(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Drop `task` from the bookkeeping list. Settling tasks call this
    /// themselves; returns whether the task was still listed.
    pub fn remove(&self, task: &Task) -> bool {
        let mut tasks = self.inner.lock();
        let before = tasks.len();
        tasks.retain(|queued| !queued.ptr_eq(task));
        let removed = tasks.len() != before;
        if tasks.is_empty() && removed {
            debug!("Task queue drained");
        }
        removed
    }

    // ------------------------------------------------------------------------
    // Cancellation
    // ------------------------------------------------------------------------

    /// Request cancellation of every queued task. Returns how many were
    /// signalled.
    pub fn cancel_all(&self) -> usize {
        cancel(self.tasks())
    }

    #[instrument(skip(self))]
    pub fn cancel_by_tag(&self, tag: &str) -> usize {
        cancel(self.find_all_by_tag(tag))
    }

    pub fn cancel_by_tags<I, S>(&self, tags: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tags: Vec<S> = tags.into_iter().collect();
        let matching = self
            .tasks()
            .into_iter()
            .filter(|task| tags.iter().any(|tag| tag.as_ref() == task.tag()))
            .collect();
        cancel(matching)
    }

    // ------------------------------------------------------------------------
    // Waiting
    // ------------------------------------------------------------------------

    /// Wait for every task queued at call time to settle. The snapshot is
    /// taken when this is called, not when the future is first polled, so
    /// tasks enqueued afterwards are not waited for.
    pub fn wait_for_all(&self) -> impl Future<Output = ()> + Send + 'static {
        wait(self.tasks())
    }

    /// Wait for every task tagged `tag` at call time to settle.
    pub fn wait_for_tag(&self, tag: &str) -> impl Future<Output = ()> + Send + 'static {
        wait(self.find_all_by_tag(tag))
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("task_count", &self.task_count())
            .field("has_event_bus", &self.inner.events.is_some())
            .finish()
    }
}

// ============================================================================
// Runner
// ============================================================================

async fn run_body<F, Fut, E>(task: &Task, body: F) -> TaskOutcome
where
    F: FnOnce(Task) -> Fut + Send + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Error + Send + Sync + 'static,
{
    if task.is_cancelled() {
        return TaskOutcome::Cancelled;
    }
    if let Err(e) = task.transition(TaskState::Running) {
        debug!(task = task.name(), error = %e, "Task cancelled before start");
        return TaskOutcome::Cancelled;
    }

    let handle = task.clone();
    let result = AssertUnwindSafe(async move { body(handle).await })
        .catch_unwind()
        .await;

    match result {
        Ok(Ok(())) => TaskOutcome::Completed,
        Ok(Err(_)) if task.is_cancelled() => TaskOutcome::Cancelled,
        Ok(Err(error)) => TaskOutcome::Failed(Arc::new(error)),
        Err(payload) => TaskOutcome::Failed(Arc::new(TaskError::Panicked {
            name: task.name().to_string(),
            message: panic_message(payload.as_ref()),
        })),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn cancel(tasks: Vec<Task>) -> usize {
    for task in &tasks {
        task.cancel();
    }
    tasks.len()
}

async fn wait(tasks: Vec<Task>) {
    join_all(tasks.iter().map(Task::wait)).await;
}
