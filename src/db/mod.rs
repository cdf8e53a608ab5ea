//! SQLite database module for capsule records
//!
//! The capsule record store is the single shared resource of the service:
//! request handlers and the readiness sweeper all read and write the same
//! rows. Writes go through one connection behind a mutex, and every state
//! transition commits via a status-guarded UPDATE, so two concurrent
//! attempts to open or promote the same capsule can never both observe the
//! pre-transition state and both commit.
//!
//! ## Tables
//!
//! - `capsules` - Capsule records (parties, condition, status, counters)
//! - `capsule_assets` - Assets owned by a capsule (cascade on delete)
//! - `ledger_orphans` - Ledger ids whose local persist failed, for
//!   out-of-band reconciliation

pub mod schema;
pub mod capsules;
pub mod assets;

use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::CapsuleError;

/// SQLite database for capsule records
pub struct CapsuleDb {
    conn: Mutex<Connection>,
}

impl CapsuleDb {
    /// Open or create the capsule database under the storage directory
    pub fn open(storage_dir: &Path) -> Result<Self, CapsuleError> {
        let db_path = storage_dir.join("capsules.db");
        info!("Opening capsule database at {:?}", db_path);

        let conn = Connection::open(&db_path)
            .map_err(|e| CapsuleError::Persistence(format!("Failed to open SQLite: {}", e)))?;

        // WAL for concurrent reads; foreign keys for asset cascade
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| CapsuleError::Persistence(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    /// In-memory database, used by tests
    pub fn open_in_memory() -> Result<Self, CapsuleError> {
        debug!("Opening in-memory capsule database");

        let conn = Connection::open_in_memory()
            .map_err(|e| CapsuleError::Persistence(format!("Failed to open in-memory SQLite: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| CapsuleError::Persistence(format!("Failed to set PRAGMA: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };

        db.init_schema()?;

        Ok(db)
    }

    fn init_schema(&self) -> Result<(), CapsuleError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CapsuleError::Persistence(format!("Lock poisoned: {}", e)))?;

        schema::init_schema(&conn)?;

        Ok(())
    }

    /// Run a read against the connection
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, CapsuleError>
    where
        F: FnOnce(&Connection) -> Result<T, CapsuleError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CapsuleError::Persistence(format!("Lock poisoned: {}", e)))?;
        f(&conn)
    }

    /// Run a write that needs the connection mutably (transactions)
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, CapsuleError>
    where
        F: FnOnce(&mut Connection) -> Result<T, CapsuleError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CapsuleError::Persistence(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Row counts for health reporting
    pub fn stats(&self) -> Result<DbStats, CapsuleError> {
        self.with_conn(|conn| {
            let count = |sql: &str| -> Result<i64, CapsuleError> {
                conn.query_row(sql, [], |row| row.get(0))
                    .map_err(|e| CapsuleError::Persistence(format!("Query failed: {}", e)))
            };

            Ok(DbStats {
                capsule_count: count("SELECT COUNT(*) FROM capsules")? as u64,
                sealed_count: count("SELECT COUNT(*) FROM capsules WHERE status = 'SEALED'")?
                    as u64,
                opened_count: count("SELECT COUNT(*) FROM capsules WHERE status = 'OPENED'")?
                    as u64,
                asset_count: count("SELECT COUNT(*) FROM capsule_assets")? as u64,
                orphan_count: count("SELECT COUNT(*) FROM ledger_orphans")? as u64,
            })
        })
    }
}

/// Record-store row counts
#[derive(Debug, Clone, serde::Serialize)]
pub struct DbStats {
    pub capsule_count: u64,
    pub sealed_count: u64,
    pub opened_count: u64,
    pub asset_count: u64,
    pub orphan_count: u64,
}

// Re-exports
pub use capsules::{EngagementCounter, LedgerOrphan, NewCapsule};
