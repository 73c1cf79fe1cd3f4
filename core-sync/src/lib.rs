//! # Library Synchronization
//!
//! Keeps the media cache in step with each provider's saved library.
//!
//! ## Overview
//!
//! - **Synchronizer** (`synchronizer`): one deduplicated `sync:<provider>`
//!   task per provider, plus `sync:all` for every provider in turn
//! - **Configuration** (`config`): page pacing and retry policy, derived from
//!   the runtime's [`SyncSettings`](core_runtime::config::SyncSettings)

pub mod config;
pub mod error;
pub mod synchronizer;

pub use config::SyncConfig;
pub use error::{Result, SyncError};
pub use synchronizer::{resume_state_key, sync_task_name, LibrarySynchronizer, SYNC_ALL_TASK};
