//! Workspace placeholder crate.
//!
//! This crate exposes the `desktop-shims` feature which maps to the
//! `core-service` composition root. Host applications can depend on
//! `media-core-workspace` and get the provider registry, media cache, task
//! queue and library synchronizer wired together without depending on each
//! workspace crate individually.

#[cfg(feature = "desktop-shims")]
pub use core_service::*;
