//! Capsule record queries
//!
//! Free functions over a borrowed connection, one statement per operation.
//! State transitions (`promote_to_ready`, `mark_opened`) are status-guarded
//! UPDATEs: the WHERE clause re-checks the pre-transition status, so a
//! concurrent transition makes the statement match zero rows instead of
//! double-applying.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::error::CapsuleError;
use crate::model::{AssetDraft, Capsule, CapsuleStatus, ConditionType};

use super::assets;

/// Input for persisting a capsule that has already been registered on the
/// ledger (and had its content uploaded, when present)
#[derive(Debug, Clone)]
pub struct NewCapsule {
    pub title: String,
    pub description: Option<String>,
    pub ledger_id: String,
    pub creator_address: String,
    pub recipient_address: Option<String>,
    pub content_hash: Option<String>,
    pub status: CapsuleStatus,
    pub created_at: DateTime<Utc>,
    pub open_date: Option<DateTime<Utc>>,
    pub condition_type: ConditionType,
    pub condition_data: Option<String>,
    pub featured: bool,
    pub assets: Vec<AssetDraft>,
}

/// Engagement counter columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngagementCounter {
    Views,
    Shares,
    Subscriptions,
}

impl EngagementCounter {
    fn column(&self) -> &'static str {
        match self {
            EngagementCounter::Views => "view_count",
            EngagementCounter::Shares => "share_count",
            EngagementCounter::Subscriptions => "subscription_count",
        }
    }
}

/// Orphaned ledger registration awaiting reconciliation
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerOrphan {
    pub ledger_id: String,
    pub capsule_title: Option<String>,
    pub reason: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

/// Fixed-width RFC 3339 so lexicographic TEXT comparison matches
/// chronological order
pub(crate) fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, CapsuleError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CapsuleError::Persistence(format!("Bad timestamp {:?}: {}", raw, e)))
}

fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, CapsuleError> {
    raw.map(|s| parse_ts(&s)).transpose()
}

fn row_err(e: rusqlite::Error) -> CapsuleError {
    CapsuleError::Persistence(format!("Row read failed: {}", e))
}

fn from_row(row: &Row) -> Result<Capsule, CapsuleError> {
    let status_raw: String = row.get("status").map_err(row_err)?;
    let status = CapsuleStatus::parse(&status_raw)
        .ok_or_else(|| CapsuleError::Persistence(format!("Unknown status: {}", status_raw)))?;

    let condition_raw: String = row.get("condition_type").map_err(row_err)?;
    let condition_type = ConditionType::parse(&condition_raw).ok_or_else(|| {
        CapsuleError::Persistence(format!("Unknown condition type: {}", condition_raw))
    })?;

    let created_raw: String = row.get("created_at").map_err(row_err)?;

    Ok(Capsule {
        id: row.get("id").map_err(row_err)?,
        title: row.get("title").map_err(row_err)?,
        description: row.get("description").map_err(row_err)?,
        ledger_id: row.get("ledger_id").map_err(row_err)?,
        creator_address: row.get("creator_address").map_err(row_err)?,
        recipient_address: row.get("recipient_address").map_err(row_err)?,
        content_hash: row.get("content_hash").map_err(row_err)?,
        status,
        created_at: parse_ts(&created_raw)?,
        open_date: parse_ts_opt(row.get("open_date").map_err(row_err)?)?,
        opened_at: parse_ts_opt(row.get("opened_at").map_err(row_err)?)?,
        condition_type,
        condition_data: row.get("condition_data").map_err(row_err)?,
        view_count: row.get("view_count").map_err(row_err)?,
        share_count: row.get("share_count").map_err(row_err)?,
        subscription_count: row.get("subscription_count").map_err(row_err)?,
        featured: row.get("featured").map_err(row_err)?,
        assets: vec![],
    })
}

/// Run a SELECT returning capsule rows, loading each capsule's assets
fn query_capsules(
    conn: &Connection,
    sql: &str,
    params: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Capsule>, CapsuleError> {
    debug!("Executing query: {}", sql);

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| CapsuleError::Persistence(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query(params)
        .map_err(|e| CapsuleError::Persistence(format!("Query failed: {}", e)))?;

    let mut results = vec![];
    while let Some(row) = rows
        .next()
        .map_err(|e| CapsuleError::Persistence(format!("Row fetch failed: {}", e)))?
    {
        let mut capsule = from_row(row)?;
        capsule.assets = assets::get_assets_for_capsule(conn, capsule.id)?;
        results.push(capsule);
    }

    Ok(results)
}

/// Insert a capsule together with its asset rows
pub fn insert_capsule(conn: &mut Connection, input: &NewCapsule) -> Result<Capsule, CapsuleError> {
    let tx = conn
        .transaction()
        .map_err(|e| CapsuleError::Persistence(format!("Transaction failed: {}", e)))?;

    tx.execute(
        r#"
        INSERT INTO capsules (
            title, description, ledger_id, content_hash,
            creator_address, recipient_address,
            status, created_at, open_date,
            condition_type, condition_data, featured
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            input.title,
            input.description,
            input.ledger_id,
            input.content_hash,
            input.creator_address,
            input.recipient_address,
            input.status.as_str(),
            fmt_ts(input.created_at),
            input.open_date.map(fmt_ts),
            input.condition_type.as_str(),
            input.condition_data,
            input.featured,
        ],
    )
    .map_err(|e| CapsuleError::Persistence(format!("Insert failed: {}", e)))?;

    let id = tx.last_insert_rowid();

    assets::insert_assets(&tx, id, &input.assets)?;

    tx.commit()
        .map_err(|e| CapsuleError::Persistence(format!("Commit failed: {}", e)))?;

    get_capsule(conn, id)?
        .ok_or_else(|| CapsuleError::Internal("Capsule not found after insert".to_string()))
}

/// Get a capsule by id
pub fn get_capsule(conn: &Connection, id: i64) -> Result<Option<Capsule>, CapsuleError> {
    Ok(query_capsules(conn, "SELECT * FROM capsules WHERE id = ?", &[&id])?
        .into_iter()
        .next())
}

/// Get a capsule by its ledger id
pub fn get_capsule_by_ledger_id(
    conn: &Connection,
    ledger_id: &str,
) -> Result<Option<Capsule>, CapsuleError> {
    Ok(
        query_capsules(conn, "SELECT * FROM capsules WHERE ledger_id = ?", &[&ledger_id])?
            .into_iter()
            .next(),
    )
}

/// All capsules created by an address
pub fn list_by_creator(conn: &Connection, address: &str) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE creator_address = ? ORDER BY created_at DESC",
        &[&address],
    )
}

/// All capsules addressed to a recipient
pub fn list_by_recipient(conn: &Connection, address: &str) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE recipient_address = ? ORDER BY created_at DESC",
        &[&address],
    )
}

/// All capsules an address is party to, as creator or recipient
pub fn list_by_address(conn: &Connection, address: &str) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE creator_address = ?1 OR recipient_address = ?1 \
         ORDER BY created_at DESC",
        &[&address],
    )
}

/// All capsules in a given status
pub fn list_by_status(
    conn: &Connection,
    status: CapsuleStatus,
) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE status = ? ORDER BY created_at DESC",
        &[&status.as_str()],
    )
}

/// Sealed TIME capsules whose open date has passed
pub fn find_due_for_promotion(
    conn: &Connection,
    now: DateTime<Utc>,
) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules \
         WHERE status = 'SEALED' AND condition_type = 'TIME' \
           AND open_date IS NOT NULL AND open_date <= ? \
         ORDER BY open_date ASC",
        &[&fmt_ts(now)],
    )
}

/// Promote a sealed capsule to READY_TO_OPEN
///
/// Returns false when the capsule was not in SEALED anymore (already
/// promoted, opened, or gone) - the guard makes repeated sweeps idempotent.
pub fn promote_to_ready(conn: &Connection, id: i64) -> Result<bool, CapsuleError> {
    let changed = conn
        .execute(
            "UPDATE capsules SET status = 'READY_TO_OPEN' WHERE id = ? AND status = 'SEALED'",
            params![id],
        )
        .map_err(|e| CapsuleError::Persistence(format!("Promote failed: {}", e)))?;

    Ok(changed == 1)
}

/// Commit the open transition
///
/// Returns false when the capsule is no longer in an openable status; the
/// caller treats that as a lost race, never as a second transition.
pub fn mark_opened(
    conn: &Connection,
    id: i64,
    opened_at: DateTime<Utc>,
) -> Result<bool, CapsuleError> {
    let changed = conn
        .execute(
            "UPDATE capsules SET status = 'OPENED', opened_at = ? \
             WHERE id = ? AND status IN ('SEALED', 'READY_TO_OPEN')",
            params![fmt_ts(opened_at), id],
        )
        .map_err(|e| CapsuleError::Persistence(format!("Open commit failed: {}", e)))?;

    Ok(changed == 1)
}

/// Administrative status write, no transition guard
pub fn set_status(
    conn: &Connection,
    id: i64,
    status: CapsuleStatus,
    opened_at: Option<DateTime<Utc>>,
) -> Result<bool, CapsuleError> {
    let changed = match opened_at {
        Some(ts) => conn
            .execute(
                "UPDATE capsules SET status = ?, opened_at = ? WHERE id = ?",
                params![status.as_str(), fmt_ts(ts), id],
            )
            .map_err(|e| CapsuleError::Persistence(format!("Status update failed: {}", e)))?,
        None => conn
            .execute(
                "UPDATE capsules SET status = ? WHERE id = ?",
                params![status.as_str(), id],
            )
            .map_err(|e| CapsuleError::Persistence(format!("Status update failed: {}", e)))?,
    };

    Ok(changed == 1)
}

/// Add one to an engagement counter
pub fn increment_counter(
    conn: &Connection,
    id: i64,
    counter: EngagementCounter,
) -> Result<bool, CapsuleError> {
    let column = counter.column();
    let sql = format!(
        "UPDATE capsules SET {col} = {col} + 1 WHERE id = ?",
        col = column
    );

    let changed = conn
        .execute(&sql, params![id])
        .map_err(|e| CapsuleError::Persistence(format!("Counter update failed: {}", e)))?;

    Ok(changed == 1)
}

/// Sealed or opened capsules by view count
pub fn list_popular(conn: &Connection, limit: u32) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE status IN ('SEALED', 'OPENED') \
         ORDER BY view_count DESC LIMIT ?",
        &[&(limit as i64)],
    )
}

/// Manually curated capsules
pub fn list_featured(conn: &Connection) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE featured = 1 ORDER BY created_at DESC",
        &[],
    )
}

/// Most recently opened capsules
pub fn list_recently_opened(conn: &Connection, limit: u32) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE status = 'OPENED' ORDER BY opened_at DESC LIMIT ?",
        &[&(limit as i64)],
    )
}

/// Sealed capsules by subscription count
pub fn list_most_subscribed(conn: &Connection, limit: u32) -> Result<Vec<Capsule>, CapsuleError> {
    query_capsules(
        conn,
        "SELECT * FROM capsules WHERE status = 'SEALED' \
         ORDER BY subscription_count DESC LIMIT ?",
        &[&(limit as i64)],
    )
}

/// Delete a capsule; asset rows cascade
pub fn delete_capsule(conn: &Connection, id: i64) -> Result<bool, CapsuleError> {
    let changed = conn
        .execute("DELETE FROM capsules WHERE id = ?", params![id])
        .map_err(|e| CapsuleError::Persistence(format!("Delete failed: {}", e)))?;

    Ok(changed == 1)
}

/// Record a ledger registration whose local persist failed
pub fn record_ledger_orphan(
    conn: &Connection,
    ledger_id: &str,
    capsule_title: &str,
    reason: &str,
    recorded_at: DateTime<Utc>,
) -> Result<(), CapsuleError> {
    conn.execute(
        "INSERT OR REPLACE INTO ledger_orphans (ledger_id, capsule_title, reason, recorded_at) \
         VALUES (?, ?, ?, ?)",
        params![ledger_id, capsule_title, reason, fmt_ts(recorded_at)],
    )
    .map_err(|e| CapsuleError::Persistence(format!("Orphan record failed: {}", e)))?;

    Ok(())
}

/// Orphaned ledger ids awaiting reconciliation
pub fn list_ledger_orphans(conn: &Connection) -> Result<Vec<LedgerOrphan>, CapsuleError> {
    let mut stmt = conn
        .prepare("SELECT ledger_id, capsule_title, reason, recorded_at FROM ledger_orphans ORDER BY recorded_at")
        .map_err(|e| CapsuleError::Persistence(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query([])
        .map_err(|e| CapsuleError::Persistence(format!("Query failed: {}", e)))?;

    let mut results = vec![];
    while let Some(row) = rows
        .next()
        .map_err(|e| CapsuleError::Persistence(format!("Row fetch failed: {}", e)))?
    {
        let recorded_raw: String = row.get("recorded_at").map_err(row_err)?;
        results.push(LedgerOrphan {
            ledger_id: row.get("ledger_id").map_err(row_err)?,
            capsule_title: row.get("capsule_title").map_err(row_err)?,
            reason: row.get("reason").map_err(row_err)?,
            recorded_at: parse_ts(&recorded_raw)?,
        });
    }

    Ok(results)
}
