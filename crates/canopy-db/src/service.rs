//! Service layer hosting the repositories.
//!
//! `CanopyService` wraps `CanopyDb` (raw database access). All repo methods are
//! implemented as `impl CanopyService` blocks under `repos/`.

use crate::CanopyDb;
use crate::error::DatabaseError;

/// Repository entry point shared by the sync engine and the CLI.
///
/// Holds a single libSQL connection. Methods take `&self` and are safe to call
/// from concurrent tasks: each mutation is one SQL statement.
pub struct CanopyService {
    db: CanopyDb,
}

impl CanopyService {
    /// Create a new service over a local database file, or `":memory:"` for tests.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or migrated.
    pub async fn new_local(db_path: &str) -> Result<Self, DatabaseError> {
        let db = CanopyDb::open_local(db_path).await?;
        Ok(Self { db })
    }

    /// Create from an existing `CanopyDb`.
    #[must_use]
    pub const fn from_db(db: CanopyDb) -> Self {
        Self { db }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &CanopyDb {
        &self.db
    }
}
