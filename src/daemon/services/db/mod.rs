//! Persistent store for file records, client records and stats visits.
//!
//! The lifecycle manager talks to a [`FileRepository`]; [`SqliteRepository`]
//! is the production implementation (file-backed or in-memory). All SQLite
//! work runs in `spawn_blocking` behind a single connection mutex.

mod migrations;
mod repository;
mod sqlite;

pub use repository::FileRepository;
pub use sqlite::SqliteRepository;

use anyhow::{Result, bail};
use std::sync::Arc;

use crate::config::DatabaseConfig;

/// Shared handle to a repository implementation.
pub type SharedRepository = Arc<dyn FileRepository>;

/// Open the repository selected by configuration.
///
/// # Errors
///
/// Returns an error for an unsupported driver or if the database cannot be
/// opened and migrated.
pub fn open(config: &DatabaseConfig) -> Result<SharedRepository> {
    match config.driver.as_str() {
        "sqlite" if config.path.as_os_str() == ":memory:" => Ok(Arc::new(SqliteRepository::memory()?)),
        "sqlite" => Ok(Arc::new(SqliteRepository::open(&config.path)?)),
        other => bail!("Unsupported database driver '{other}'"),
    }
}
