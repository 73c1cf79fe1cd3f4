use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("Invalid task ID: {0}")]
    InvalidTaskId(String),

    #[error("Invalid task state: {0}")]
    InvalidState(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// The task body panicked; the payload message is kept when it is a string.
    #[error("Task {name} panicked: {message}")]
    Panicked { name: String, message: String },
}

pub type Result<T> = std::result::Result<T, TaskError>;
