//! Capsule domain model
//!
//! A capsule is one time-locked disclosure: it binds a creator and a
//! recipient address, an opening condition, and an optional reference to
//! content held by the external content store. Capsules move through the
//! lifecycle DRAFT -> SEALED -> READY_TO_OPEN -> OPENED (or FAILED), with
//! status stored as TEXT in the database.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a capsule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapsuleStatus {
    Draft,
    Pending,
    Sealed,
    ReadyToOpen,
    Opened,
    Failed,
}

impl CapsuleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapsuleStatus::Draft => "DRAFT",
            CapsuleStatus::Pending => "PENDING",
            CapsuleStatus::Sealed => "SEALED",
            CapsuleStatus::ReadyToOpen => "READY_TO_OPEN",
            CapsuleStatus::Opened => "OPENED",
            CapsuleStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(CapsuleStatus::Draft),
            "PENDING" => Some(CapsuleStatus::Pending),
            "SEALED" => Some(CapsuleStatus::Sealed),
            "READY_TO_OPEN" => Some(CapsuleStatus::ReadyToOpen),
            "OPENED" => Some(CapsuleStatus::Opened),
            "FAILED" => Some(CapsuleStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for CapsuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule family deciding when a capsule may be opened
///
/// Only `Time` has a concrete evaluation strategy; the other variants exist
/// in the taxonomy but are unimplemented extension points and never satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    Time,
    Multisig,
    Oracle,
    Compound,
}

impl ConditionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionType::Time => "TIME",
            ConditionType::Multisig => "MULTISIG",
            ConditionType::Oracle => "ORACLE",
            ConditionType::Compound => "COMPOUND",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "TIME" => Some(ConditionType::Time),
            "MULTISIG" => Some(ConditionType::Multisig),
            "ORACLE" => Some(ConditionType::Oracle),
            "COMPOUND" => Some(ConditionType::Compound),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConditionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of asset sealed inside a capsule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Eth,
    Erc20,
    Erc721,
    Erc1155,
    Data,
}

impl AssetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Eth => "ETH",
            AssetType::Erc20 => "ERC20",
            AssetType::Erc721 => "ERC721",
            AssetType::Erc1155 => "ERC1155",
            AssetType::Data => "DATA",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ETH" => Some(AssetType::Eth),
            "ERC20" => Some(AssetType::Erc20),
            "ERC721" => Some(AssetType::Erc721),
            "ERC1155" => Some(AssetType::Erc1155),
            "DATA" => Some(AssetType::Data),
            _ => None,
        }
    }
}

/// Capsule row from the database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capsule {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    /// Assigned exactly once, at creation, by the ledger registration
    pub ledger_id: Option<String>,
    pub creator_address: String,
    /// Only this address may open the capsule (case-insensitive match);
    /// a capsule with no recipient cannot be opened through the normal path
    pub recipient_address: Option<String>,
    /// Content-store reference, present only when content was uploaded
    pub content_hash: Option<String>,
    pub status: CapsuleStatus,
    pub created_at: DateTime<Utc>,
    /// Earliest instant a TIME capsule may open
    pub open_date: Option<DateTime<Utc>>,
    /// Set iff status is OPENED
    pub opened_at: Option<DateTime<Utc>>,
    pub condition_type: ConditionType,
    /// Opaque payload interpreted per condition type
    pub condition_data: Option<String>,
    pub view_count: i64,
    pub share_count: i64,
    pub subscription_count: i64,
    /// Externally curated flag, never touched by the lifecycle
    pub featured: bool,
    #[serde(default)]
    pub assets: Vec<CapsuleAsset>,
}

/// Asset row owned by a capsule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapsuleAsset {
    pub id: i64,
    pub capsule_id: i64,
    pub asset_type: AssetType,
    pub value: String,
    pub token_address: Option<String>,
    pub token_id: Option<String>,
    pub token_amount: Option<String>,
    pub transferred: bool,
}

/// Input for creating a capsule
#[derive(Debug, Clone)]
pub struct CapsuleDraft {
    pub title: String,
    pub description: Option<String>,
    pub creator_address: String,
    pub recipient_address: Option<String>,
    pub condition_type: ConditionType,
    pub condition_data: Option<String>,
    pub open_date: Option<DateTime<Utc>>,
    pub featured: bool,
    pub assets: Vec<AssetDraft>,
}

/// Input for an asset attached to a new capsule
#[derive(Debug, Clone)]
pub struct AssetDraft {
    pub asset_type: AssetType,
    pub value: String,
    pub token_address: Option<String>,
    pub token_id: Option<String>,
    pub token_amount: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            CapsuleStatus::Draft,
            CapsuleStatus::Pending,
            CapsuleStatus::Sealed,
            CapsuleStatus::ReadyToOpen,
            CapsuleStatus::Opened,
            CapsuleStatus::Failed,
        ] {
            assert_eq!(CapsuleStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(CapsuleStatus::parse("SHUT"), None);
    }

    #[test]
    fn test_status_serde_matches_db_encoding() {
        let json = serde_json::to_string(&CapsuleStatus::ReadyToOpen).unwrap();
        assert_eq!(json, "\"READY_TO_OPEN\"");
        let status: CapsuleStatus = serde_json::from_str("\"SEALED\"").unwrap();
        assert_eq!(status.as_str(), "SEALED");
    }

    #[test]
    fn test_condition_type_round_trip() {
        for ct in [
            ConditionType::Time,
            ConditionType::Multisig,
            ConditionType::Oracle,
            ConditionType::Compound,
        ] {
            assert_eq!(ConditionType::parse(ct.as_str()), Some(ct));
        }
    }
}
