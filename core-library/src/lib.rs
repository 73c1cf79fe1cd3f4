//! # Media Cache
//!
//! Owns the local SQLite cache of aggregated provider items and keeps it
//! consistent under interleaved reads and writes.
//!
//! ## Overview
//!
//! This crate manages:
//! - The cache schema (`schema`) and its normalization to canonical JSON (`transform`)
//! - A single worker task that serializes every cache operation (`worker`)
//! - Atomic multi-statement transactions ([`SqlTransaction`])
//! - The read/write API ([`MediaCache`]) with offset pagination ([`Page`])
//! - [`LibraryProxyProvider`], which answers catalog lookups from the cache

pub mod cache;
pub mod db;
pub mod error;
pub mod pagination;
pub mod proxy;
pub mod schema;
pub mod sql;
pub mod transaction;
pub mod transform;
mod worker;

pub use cache::{CacheOptions, DbState, InitializeOptions, LibraryItemOptions, MediaCache};
pub use db::DatabaseConfig;
pub use error::{LibraryError, Result};
pub use pagination::{Page, PageRequest};
pub use proxy::{LibraryProxyProvider, LIBRARY_PROXY_DISPLAY_NAME, LIBRARY_PROXY_NAME};
pub use sql::SortOrder;
pub use transaction::{QueryResults, SqlTransaction, SqlValue, TransactionOptions};
