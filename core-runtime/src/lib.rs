//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by every core crate:
//! - Logging and tracing bootstrap
//! - Configuration management
//! - Event bus for task, sync and cache notifications
//!
//! ## Overview
//!
//! Nothing in this crate knows about media items or providers. It establishes
//! the logging conventions, the validated [`CoreConfig`](config::CoreConfig)
//! handed to the composition root, and the broadcast channel other modules
//! publish progress on.

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
