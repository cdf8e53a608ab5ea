//! Ledger collaborator
//!
//! The ledger is the append-only external system of record for capsule
//! registration and opening events. The core only ever talks to it through
//! the [`Ledger`] trait; the shipped provider is the in-memory
//! [`MockLedger`]. Contract-level semantics (gas, transactions, rollback)
//! are the provider's problem - a registration either yields a ledger id or
//! fails, an open either succeeds or it does not.

pub mod mock;

use async_trait::async_trait;

use crate::error::CapsuleError;
use crate::model::{CapsuleStatus, ConditionType};

/// Fields the ledger records for a new capsule
#[derive(Debug, Clone)]
pub struct LedgerRegistration {
    pub title: String,
    pub content_ref: Option<String>,
    pub creator_address: String,
    pub recipient_address: Option<String>,
    pub condition_type: ConditionType,
    pub condition_data: Option<String>,
}

/// Capability contract for the external ledger
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Register a capsule, returning its ledger id
    async fn register(&self, registration: &LedgerRegistration) -> Result<String, CapsuleError>;

    /// Record the open event; true iff the ledger-side open succeeded
    async fn open(&self, ledger_id: &str, requester_address: &str) -> Result<bool, CapsuleError>;

    /// Whether the ledger considers the capsule openable (reconciliation only)
    async fn is_ready_to_open(&self, ledger_id: &str) -> Result<bool, CapsuleError>;

    /// Ledger-side status of a capsule (reconciliation only)
    async fn status(&self, ledger_id: &str) -> Result<CapsuleStatus, CapsuleError>;
}

// Re-exports
pub use mock::MockLedger;
