//! In-memory ledger provider
//!
//! Tracks capsule statuses in a process-local map. Ids are `mock_` plus a
//! random UUID, so they are unique per process but carry no chain meaning.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use crate::error::CapsuleError;
use crate::model::CapsuleStatus;

use super::{Ledger, LedgerRegistration};

/// Mock ledger backed by a concurrent map of ledger id -> status
#[derive(Default)]
pub struct MockLedger {
    statuses: DashMap<String, CapsuleStatus>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn register(&self, registration: &LedgerRegistration) -> Result<String, CapsuleError> {
        let ledger_id = format!("mock_{}", Uuid::new_v4());
        self.statuses.insert(ledger_id.clone(), CapsuleStatus::Sealed);

        info!(
            ledger_id = %ledger_id,
            title = %registration.title,
            condition = %registration.condition_type,
            "Mock ledger: registered capsule"
        );

        Ok(ledger_id)
    }

    async fn open(&self, ledger_id: &str, requester_address: &str) -> Result<bool, CapsuleError> {
        if !self.statuses.contains_key(ledger_id) {
            return Ok(false);
        }

        self.statuses
            .insert(ledger_id.to_string(), CapsuleStatus::Opened);
        info!(ledger_id = %ledger_id, requester = %requester_address, "Mock ledger: opened capsule");

        Ok(true)
    }

    async fn is_ready_to_open(&self, ledger_id: &str) -> Result<bool, CapsuleError> {
        Ok(self.statuses.contains_key(ledger_id))
    }

    async fn status(&self, ledger_id: &str) -> Result<CapsuleStatus, CapsuleError> {
        Ok(self
            .statuses
            .get(ledger_id)
            .map(|entry| *entry.value())
            .unwrap_or(CapsuleStatus::Sealed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConditionType;

    fn registration() -> LedgerRegistration {
        LedgerRegistration {
            title: "test".into(),
            content_ref: None,
            creator_address: "0xcreator".into(),
            recipient_address: Some("0xrecipient".into()),
            condition_type: ConditionType::Time,
            condition_data: None,
        }
    }

    #[tokio::test]
    async fn test_register_then_status_sealed() {
        let ledger = MockLedger::new();
        let id = ledger.register(&registration()).await.unwrap();
        assert!(id.starts_with("mock_"));
        assert_eq!(ledger.status(&id).await.unwrap(), CapsuleStatus::Sealed);
        assert!(ledger.is_ready_to_open(&id).await.unwrap());
    }

    #[tokio::test]
    async fn test_open_unknown_id_fails() {
        let ledger = MockLedger::new();
        assert!(!ledger.open("mock_missing", "0xanyone").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_transitions_status() {
        let ledger = MockLedger::new();
        let id = ledger.register(&registration()).await.unwrap();
        assert!(ledger.open(&id, "0xrecipient").await.unwrap());
        assert_eq!(ledger.status(&id).await.unwrap(), CapsuleStatus::Opened);
    }
}
