//! # Task Queue
//!
//! Tracks long-running asynchronous jobs, principally library
//! synchronizations, so they can be found, cancelled and awaited by name or
//! tag.
//!
//! ## Components
//!
//! - **Task handles** (`task`): [`Task`], its [`TaskState`] machine, observable
//!   [`TaskStatus`] and final [`TaskOutcome`]
//! - **Queue** (`queue`): [`TaskQueue`], which spawns bodies on the Tokio runtime
//!   and forgets each task once it settles

pub mod error;
pub mod queue;
pub mod task;

pub use error::{Result, TaskError};
pub use queue::{Enqueued, TaskQueue};
pub use task::{Task, TaskId, TaskOutcome, TaskState, TaskStatus};
pub use tokio_util::sync::CancellationToken;
