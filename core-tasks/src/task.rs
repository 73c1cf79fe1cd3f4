//! # Task Handles
//!
//! A [`Task`] is a cheap, cloneable handle to one tracked job. The queue keeps
//! one clone in its list, the running body receives another, and callers keep
//! the rest.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Running → Completed
//!     │         ├───→ Failed
//!     │         └───→ Cancelled
//!     └─────────────→ Cancelled
//! ```
//!
//! Cancellation is cooperative: [`Task::cancel`] only triggers the task's
//! [`CancellationToken`]. The body observes it through
//! [`Task::is_cancelled`] or [`Task::cancelled`] and must still return so the
//! task can settle.

use crate::{Result, TaskError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tracing::debug;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a task ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TaskError::InvalidTaskId(e.to_string()))
    }

    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

// ============================================================================
// State Types
// ============================================================================

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Registered but the body has not started yet
    Pending,
    Running,
    Completed,
    Failed,
    /// Settled after cancellation was requested
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, TaskState::Pending | TaskState::Running)
    }

    pub fn can_transition_to(&self, to: TaskState) -> bool {
        matches!(
            (self, to),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Pending, TaskState::Cancelled)
                | (TaskState::Running, TaskState::Completed)
                | (TaskState::Running, TaskState::Failed)
                | (TaskState::Running, TaskState::Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskState {
    type Err = TaskError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TaskState::Pending),
            "running" => Ok(TaskState::Running),
            "completed" => Ok(TaskState::Completed),
            "failed" => Ok(TaskState::Failed),
            "cancelled" => Ok(TaskState::Cancelled),
            _ => Err(TaskError::InvalidState(s.to_string())),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Progress reported by a running body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// Fraction done in `0.0..=1.0`
    pub progress: f64,
    /// Human-readable description of the current step
    pub text: String,
}

impl TaskStatus {
    pub fn new(progress: f64, text: impl Into<String>) -> Self {
        Self {
            progress: clamp_progress(progress),
            text: text.into(),
        }
    }
}

fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

/// How a task settled
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    Completed,
    /// The body returned an error, or panicked. The error is kept as the body
    /// produced it and can be downcast by the caller.
    Failed(Arc<dyn Error + Send + Sync>),
    Cancelled,
}

impl TaskOutcome {
    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Completed => TaskState::Completed,
            TaskOutcome::Failed(_) => TaskState::Failed,
            TaskOutcome::Cancelled => TaskState::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, TaskOutcome::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskOutcome::Cancelled)
    }

    pub fn error(&self) -> Option<&(dyn Error + Send + Sync + 'static)> {
        match self {
            TaskOutcome::Failed(error) => Some(error.as_ref()),
            _ => None,
        }
    }
}

// ============================================================================
// Task Handle
// ============================================================================

struct TaskInner {
    id: TaskId,
    name: String,
    tag: String,
    created_at: DateTime<Utc>,
    token: CancellationToken,
    state: Mutex<TaskState>,
    status: watch::Sender<TaskStatus>,
    outcome: watch::Sender<Option<TaskOutcome>>,
}

/// Handle to a tracked task
#[derive(Clone)]
pub struct Task {
    inner: Arc<TaskInner>,
}

impl Task {
    pub(crate) fn new(name: impl Into<String>, tag: impl Into<String>) -> Self {
        let (status, _) = watch::channel(TaskStatus::default());
        let (outcome, _) = watch::channel(None);
        Self {
            inner: Arc::new(TaskInner {
                id: TaskId::new(),
                name: name.into(),
                tag: tag.into(),
                created_at: Utc::now(),
                token: CancellationToken::new(),
                state: Mutex::new(TaskState::Pending),
                status,
                outcome,
            }),
        }
    }

    pub fn id(&self) -> TaskId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn tag(&self) -> &str {
        &self.inner.tag
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn state(&self) -> TaskState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Request cancellation. Does not wait for the body to stop.
    pub fn cancel(&self) {
        if !self.inner.token.is_cancelled() {
            debug!(task = %self.inner.name, id = %self.inner.id, "Cancellation requested");
            self.inner.token.cancel();
        }
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Resolves once cancellation is requested.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.inner.token.cancelled()
    }

    /// A clone of the token, for handing to code that should stop with this task.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.token.clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.inner.status.borrow().clone()
    }

    pub fn set_status(&self, progress: f64, text: impl Into<String>) {
        self.inner.status.send_replace(TaskStatus::new(progress, text));
    }

    pub fn set_progress(&self, progress: f64) {
        self.inner
            .status
            .send_modify(|status| status.progress = clamp_progress(progress));
    }

    pub fn set_status_text(&self, text: impl Into<String>) {
        let text = text.into();
        self.inner.status.send_modify(|status| status.text = text);
    }

    /// Observe status changes. The receiver starts with the current status.
    pub fn subscribe_status(&self) -> watch::Receiver<TaskStatus> {
        self.inner.status.subscribe()
    }

    /// The outcome, once the task has settled.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.outcome.borrow().clone()
    }

    pub fn is_settled(&self) -> bool {
        self.inner.outcome.borrow().is_some()
    }

    /// Wait until the task settles.
    pub async fn wait(&self) -> TaskOutcome {
        let mut receiver = self.inner.outcome.subscribe();
        let outcome = match receiver.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone().unwrap_or(TaskOutcome::Cancelled),
            // The sender lives as long as `self`
            Err(_) => TaskOutcome::Cancelled,
        };
        outcome
    }

    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Move to `to`, leaving the state untouched if the move is not allowed.
    pub(crate) fn transition(&self, to: TaskState) -> Result<()> {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let from = *state;
        if !from.can_transition_to(to) {
            return Err(TaskError::InvalidStateTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        *state = to;
        Ok(())
    }

    pub(crate) fn settle(&self, outcome: TaskOutcome) {
        if let Err(e) = self.transition(outcome.state()) {
            debug!(task = %self.inner.name, error = %e, "Keeping settled state");
        }
        self.inner.outcome.send_replace(Some(outcome));
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("tag", &self.inner.tag)
            .field("state", &self.state())
            .field("cancel_requested", &self.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_parse() {
        let id = TaskId::new();
        assert_eq!(TaskId::from_string(&id.as_str()).unwrap(), id);
        assert!(matches!(
            TaskId::from_string("not-a-uuid"),
            Err(TaskError::InvalidTaskId(_))
        ));
    }

    #[test]
    fn test_state_transitions() {
        assert!(TaskState::Pending.can_transition_to(TaskState::Running));
        assert!(TaskState::Pending.can_transition_to(TaskState::Cancelled));
        assert!(!TaskState::Pending.can_transition_to(TaskState::Completed));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
        assert!(!TaskState::Completed.can_transition_to(TaskState::Running));
        assert!(!TaskState::Cancelled.can_transition_to(TaskState::Cancelled));
    }

    #[test]
    fn test_state_strings() {
        for state in [
            TaskState::Pending,
            TaskState::Running,
            TaskState::Completed,
            TaskState::Failed,
            TaskState::Cancelled,
        ] {
            assert_eq!(state.as_str().parse::<TaskState>().unwrap(), state);
        }
        assert_eq!("RUNNING".parse::<TaskState>().unwrap(), TaskState::Running);
        assert!("paused".parse::<TaskState>().is_err());
        assert!(TaskState::Running.is_active());
        assert!(TaskState::Failed.is_terminal());
    }

    #[test]
    fn test_status_is_clamped() {
        let task = Task::new("t", "tag");
        task.set_status(1.5, "almost");
        assert_eq!(task.status(), TaskStatus::new(1.0, "almost"));
        task.set_progress(-3.0);
        assert_eq!(task.status().progress, 0.0);
        task.set_status_text("restarted");
        assert_eq!(task.status().text, "restarted");
    }

    #[test]
    fn test_settle_records_outcome_and_state() {
        let task = Task::new("t", "tag");
        task.transition(TaskState::Running).unwrap();
        task.settle(TaskOutcome::Completed);
        assert_eq!(task.state(), TaskState::Completed);
        assert!(task.outcome().unwrap().is_completed());
    }

    #[test]
    fn test_rejected_transition_reports_states() {
        let task = Task::new("t", "tag");
        task.transition(TaskState::Running).unwrap();
        task.transition(TaskState::Completed).unwrap();

        let err = task.transition(TaskState::Running).unwrap_err();
        assert_eq!(
            err,
            TaskError::InvalidStateTransition {
                from: "completed".to_string(),
                to: "running".to_string(),
            }
        );
        assert_eq!(task.state(), TaskState::Completed);
    }

    #[test]
    fn test_failed_outcome_downcasts() {
        let error = TaskError::InvalidState("x".to_string());
        let outcome = TaskOutcome::Failed(Arc::new(error.clone()));
        assert_eq!(outcome.state(), TaskState::Failed);
        assert_eq!(
            outcome.error().and_then(|e| e.downcast_ref::<TaskError>()),
            Some(&error)
        );
    }

    #[tokio::test]
    async fn test_status_subscription() {
        let task = Task::new("t", "tag");
        let mut status = task.subscribe_status();
        task.set_status(0.5, "half");
        status.changed().await.unwrap();
        assert_eq!(status.borrow().text, "half");
    }
}
