//! Capsule store schema

use rusqlite::Connection;
use tracing::info;

use crate::error::CapsuleError;

/// Bumped whenever the table layout changes
pub const SCHEMA_VERSION: i32 = 1;

/// Create or migrate the schema to the current version
pub fn init_schema(conn: &Connection) -> Result<(), CapsuleError> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing capsule schema v{}", SCHEMA_VERSION);
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!("Migrating capsule schema v{} -> v{}", current_version, SCHEMA_VERSION);
        migrate_schema(conn, current_version)?;
    } else {
        info!("Capsule schema up to date (v{})", current_version);
    }

    Ok(())
}

/// Version recorded in the db, 0 for a fresh file
fn get_schema_version(conn: &Connection) -> Result<i32, CapsuleError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )
    .map_err(|e| CapsuleError::Persistence(format!("Failed to create schema_version table: {}", e)))?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<(), CapsuleError> {
    conn.execute("DELETE FROM schema_version", [])
        .map_err(|e| CapsuleError::Persistence(format!("Failed to clear schema_version: {}", e)))?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])
        .map_err(|e| CapsuleError::Persistence(format!("Failed to set schema_version: {}", e)))?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<(), CapsuleError> {
    conn.execute_batch(CAPSULES_SCHEMA)
        .map_err(|e| CapsuleError::Persistence(format!("Failed to create capsule tables: {}", e)))?;

    conn.execute_batch(INDEXES_SCHEMA)
        .map_err(|e| CapsuleError::Persistence(format!("Failed to create indexes: {}", e)))?;

    Ok(())
}

fn migrate_schema(conn: &Connection, from_version: i32) -> Result<(), CapsuleError> {
    // v1 is the only version so far; step-wise migrations slot in here
    let _ = from_version;

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Capsule tables
const CAPSULES_SCHEMA: &str = r#"
-- Capsule records
-- Content bodies live in the external content store, referenced by content_hash
CREATE TABLE IF NOT EXISTS capsules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    description TEXT,

    -- External references
    ledger_id TEXT UNIQUE,
    content_hash TEXT,

    -- Parties
    creator_address TEXT NOT NULL,
    recipient_address TEXT,

    -- Lifecycle
    status TEXT NOT NULL DEFAULT 'DRAFT',
    created_at TEXT NOT NULL,
    open_date TEXT,
    opened_at TEXT,

    -- Opening condition
    condition_type TEXT NOT NULL,
    condition_data TEXT,

    -- Engagement counters
    view_count INTEGER NOT NULL DEFAULT 0,
    share_count INTEGER NOT NULL DEFAULT 0,
    subscription_count INTEGER NOT NULL DEFAULT 0,

    -- Curation
    featured INTEGER NOT NULL DEFAULT 0
);

-- Assets sealed inside a capsule; rows die with their capsule
CREATE TABLE IF NOT EXISTS capsule_assets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    capsule_id INTEGER NOT NULL REFERENCES capsules(id) ON DELETE CASCADE,
    asset_type TEXT NOT NULL,
    value TEXT NOT NULL,
    token_address TEXT,
    token_id TEXT,
    token_amount TEXT,
    transferred INTEGER NOT NULL DEFAULT 0
);

-- Ledger registrations that succeeded while the local persist failed,
-- kept for out-of-band reconciliation
CREATE TABLE IF NOT EXISTS ledger_orphans (
    ledger_id TEXT PRIMARY KEY,
    capsule_title TEXT,
    reason TEXT,
    recorded_at TEXT NOT NULL
);
"#;

/// Indexes
const INDEXES_SCHEMA: &str = r#"
CREATE INDEX IF NOT EXISTS idx_capsules_status ON capsules(status);
CREATE INDEX IF NOT EXISTS idx_capsules_creator ON capsules(creator_address);
CREATE INDEX IF NOT EXISTS idx_capsules_recipient ON capsules(recipient_address);
CREATE INDEX IF NOT EXISTS idx_capsules_open_date ON capsules(open_date);
CREATE INDEX IF NOT EXISTS idx_capsule_assets_capsule ON capsule_assets(capsule_id);
"#;
