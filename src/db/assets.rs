//! Capsule asset queries
//!
//! Assets have no independent lifecycle: they are written inside the
//! capsule's insert transaction and removed by the capsule's cascade.

use rusqlite::{params, Connection, Row};

use crate::error::CapsuleError;
use crate::model::{AssetDraft, AssetType, CapsuleAsset};

fn row_err(e: rusqlite::Error) -> CapsuleError {
    CapsuleError::Persistence(format!("Asset row read failed: {}", e))
}

fn from_row(row: &Row) -> Result<CapsuleAsset, CapsuleError> {
    let type_raw: String = row.get("asset_type").map_err(row_err)?;
    let asset_type = AssetType::parse(&type_raw)
        .ok_or_else(|| CapsuleError::Persistence(format!("Unknown asset type: {}", type_raw)))?;

    Ok(CapsuleAsset {
        id: row.get("id").map_err(row_err)?,
        capsule_id: row.get("capsule_id").map_err(row_err)?,
        asset_type,
        value: row.get("value").map_err(row_err)?,
        token_address: row.get("token_address").map_err(row_err)?,
        token_id: row.get("token_id").map_err(row_err)?,
        token_amount: row.get("token_amount").map_err(row_err)?,
        transferred: row.get("transferred").map_err(row_err)?,
    })
}

/// Assets owned by a capsule
pub fn get_assets_for_capsule(
    conn: &Connection,
    capsule_id: i64,
) -> Result<Vec<CapsuleAsset>, CapsuleError> {
    let mut stmt = conn
        .prepare("SELECT * FROM capsule_assets WHERE capsule_id = ? ORDER BY id")
        .map_err(|e| CapsuleError::Persistence(format!("Prepare failed: {}", e)))?;

    let mut rows = stmt
        .query(params![capsule_id])
        .map_err(|e| CapsuleError::Persistence(format!("Query failed: {}", e)))?;

    let mut results = vec![];
    while let Some(row) = rows
        .next()
        .map_err(|e| CapsuleError::Persistence(format!("Row fetch failed: {}", e)))?
    {
        results.push(from_row(row)?);
    }

    Ok(results)
}

/// Insert asset rows for a capsule (called inside the capsule's transaction)
pub fn insert_assets(
    conn: &Connection,
    capsule_id: i64,
    assets: &[AssetDraft],
) -> Result<(), CapsuleError> {
    for asset in assets {
        conn.execute(
            "INSERT INTO capsule_assets \
             (capsule_id, asset_type, value, token_address, token_id, token_amount, transferred) \
             VALUES (?, ?, ?, ?, ?, ?, 0)",
            params![
                capsule_id,
                asset.asset_type.as_str(),
                asset.value,
                asset.token_address,
                asset.token_id,
                asset.token_amount,
            ],
        )
        .map_err(|e| CapsuleError::Persistence(format!("Asset insert failed: {}", e)))?;
    }

    Ok(())
}
