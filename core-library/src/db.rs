//! # Database Connection Module
//!
//! Opens the single SQLite connection owned by the cache worker.
//!
//! ## Features
//!
//! - **WAL Mode**: enabled for file databases
//! - **Foreign Keys**: enforced for the join and saved-item tables
//! - **Busy Timeout**: configurable wait when another process holds the file lock
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_library::db::DatabaseConfig;
//!
//! let config = DatabaseConfig::new("media.db").with_busy_timeout(Duration::from_secs(10));
//! let connection = config.open_connection().await?;
//! ```
//!
//! For tests, use [`DatabaseConfig::in_memory`].

use crate::{LibraryError, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous};
use sqlx::{ConnectOptions, SqliteConnection};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Storage configuration for the media cache
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    /// Database file, or `None` for an in-memory database
    pub path: Option<PathBuf>,

    /// How long a statement waits on a locked database before failing
    pub busy_timeout: Duration,

    /// Create the database file when it does not exist
    pub create_if_missing: bool,

    /// Number of prepared statements cached on the connection
    pub statement_cache_capacity: usize,
}

impl DatabaseConfig {
    /// Configuration for a database file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::in_memory()
        }
    }

    /// Configuration for an in-memory database (useful for testing)
    pub fn in_memory() -> Self {
        Self {
            path: None,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
            statement_cache_capacity: 100,
        }
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_create_if_missing(mut self, create: bool) -> Self {
        self.create_if_missing = create;
        self
    }

    pub fn with_statement_cache_capacity(mut self, capacity: usize) -> Self {
        self.statement_cache_capacity = capacity;
        self
    }

    /// Human readable location, used in logs and errors.
    pub fn location(&self) -> String {
        match &self.path {
            Some(path) => path.display().to_string(),
            None => ":memory:".to_string(),
        }
    }

    fn connect_options(&self) -> SqliteConnectOptions {
        let options = match &self.path {
            Some(path) => SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
            None => SqliteConnectOptions::new()
                .in_memory(true)
                .journal_mode(SqliteJournalMode::Memory),
        };

        options
            .foreign_keys(true)
            .create_if_missing(self.create_if_missing)
            .busy_timeout(self.busy_timeout)
            .statement_cache_capacity(self.statement_cache_capacity)
    }

    /// Open the connection.
    ///
    /// # Errors
    ///
    /// Returns [`LibraryError::Open`] when the parent directory cannot be
    /// created or SQLite refuses the file.
    pub async fn open_connection(&self) -> Result<SqliteConnection> {
        let location = self.location();
        info!(location = %location, "Opening media cache database");

        if let Some(parent) = self.path.as_deref().and_then(Path::parent) {
            if self.create_if_missing && !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| LibraryError::Open {
                    location: location.clone(),
                    message: e.to_string(),
                })?;
            }
        }

        let connection = self.connect_options().connect().await.map_err(|e| {
            warn!(location = %location, error = %e, "Failed to open database");
            LibraryError::Open {
                location: location.clone(),
                message: e.to_string(),
            }
        })?;

        debug!(location = %location, "Database connection established");
        Ok(connection)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
