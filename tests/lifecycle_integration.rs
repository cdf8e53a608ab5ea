//! Integration tests for the capsule lifecycle
//!
//! Drives the capsule service end to end against the in-memory record store
//! and mock collaborators, including collaborator failures injected through
//! purpose-built test doubles.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, SecondsFormat, Utc};

use capsule_vault::content_store::{ContentStore, MemoryContentStore};
use capsule_vault::error::CapsuleError;
use capsule_vault::ledger::{Ledger, LedgerRegistration, MockLedger};
use capsule_vault::model::{CapsuleDraft, CapsuleStatus, ConditionType};
use capsule_vault::services::Services;
use capsule_vault::CapsuleDb;

// ============================================================================
// Test doubles
// ============================================================================

/// Ledger that counts registrations before delegating to the mock
struct CountingLedger {
    inner: MockLedger,
    registrations: AtomicUsize,
}

impl CountingLedger {
    fn new() -> Self {
        Self {
            inner: MockLedger::new(),
            registrations: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Ledger for CountingLedger {
    async fn register(&self, registration: &LedgerRegistration) -> Result<String, CapsuleError> {
        self.registrations.fetch_add(1, Ordering::SeqCst);
        self.inner.register(registration).await
    }

    async fn open(&self, ledger_id: &str, requester: &str) -> Result<bool, CapsuleError> {
        self.inner.open(ledger_id, requester).await
    }

    async fn is_ready_to_open(&self, ledger_id: &str) -> Result<bool, CapsuleError> {
        self.inner.is_ready_to_open(ledger_id).await
    }

    async fn status(&self, ledger_id: &str) -> Result<CapsuleStatus, CapsuleError> {
        self.inner.status(ledger_id).await
    }
}

/// Ledger whose every call fails
struct FailingLedger;

#[async_trait]
impl Ledger for FailingLedger {
    async fn register(&self, _: &LedgerRegistration) -> Result<String, CapsuleError> {
        Err(CapsuleError::Ledger("ledger unavailable".into()))
    }

    async fn open(&self, _: &str, _: &str) -> Result<bool, CapsuleError> {
        Err(CapsuleError::Ledger("ledger unavailable".into()))
    }

    async fn is_ready_to_open(&self, _: &str) -> Result<bool, CapsuleError> {
        Err(CapsuleError::Ledger("ledger unavailable".into()))
    }

    async fn status(&self, _: &str) -> Result<CapsuleStatus, CapsuleError> {
        Err(CapsuleError::Ledger("ledger unavailable".into()))
    }
}

/// Ledger that registers fine but refuses every open
struct RefusingLedger {
    inner: MockLedger,
}

#[async_trait]
impl Ledger for RefusingLedger {
    async fn register(&self, registration: &LedgerRegistration) -> Result<String, CapsuleError> {
        self.inner.register(registration).await
    }

    async fn open(&self, _: &str, _: &str) -> Result<bool, CapsuleError> {
        Ok(false)
    }

    async fn is_ready_to_open(&self, ledger_id: &str) -> Result<bool, CapsuleError> {
        self.inner.is_ready_to_open(ledger_id).await
    }

    async fn status(&self, ledger_id: &str) -> Result<CapsuleStatus, CapsuleError> {
        self.inner.status(ledger_id).await
    }
}

/// Content store whose uploads always fail
struct FailingContentStore;

#[async_trait]
impl ContentStore for FailingContentStore {
    async fn upload(&self, _: &[u8]) -> Result<String, CapsuleError> {
        Err(CapsuleError::ContentStore("store unavailable".into()))
    }

    async fn fetch(&self, _: &str) -> Result<Vec<u8>, CapsuleError> {
        Err(CapsuleError::ContentStore("store unavailable".into()))
    }

    async fn exists(&self, _: &str) -> bool {
        false
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn services_with(ledger: Arc<dyn Ledger>, store: Arc<dyn ContentStore>) -> Services {
    let db = Arc::new(CapsuleDb::open_in_memory().unwrap());
    Services::new(db, ledger, store)
}

fn default_services() -> Services {
    services_with(
        Arc::new(MockLedger::new()),
        Arc::new(MemoryContentStore::new()),
    )
}

fn time_draft(title: &str, recipient: &str, open_date: DateTime<Utc>) -> CapsuleDraft {
    CapsuleDraft {
        title: title.into(),
        description: Some("integration test capsule".into()),
        creator_address: "0xCreator".into(),
        recipient_address: Some(recipient.into()),
        condition_type: ConditionType::Time,
        condition_data: None,
        open_date: Some(open_date),
        featured: false,
        assets: vec![],
    }
}

/// Rewrite a capsule's open date in place, simulating the clock advancing
fn backdate(services: &Services, id: i64, open_date: DateTime<Utc>) {
    let ts = open_date.to_rfc3339_opts(SecondsFormat::Micros, true);
    services
        .db
        .with_conn(|conn| {
            conn.execute(
                "UPDATE capsules SET open_date = ? WHERE id = ?",
                rusqlite::params![ts, id],
            )
            .map_err(|e| CapsuleError::Persistence(e.to_string()))
        })
        .unwrap();
}

// ============================================================================
// Lifecycle scenarios
// ============================================================================

#[tokio::test]
async fn test_full_time_capsule_lifecycle() {
    let services = default_services();

    // Create a capsule that opens in an hour
    let capsule = services
        .capsules
        .create(
            time_draft("letter to 2027", "0xRecipient", Utc::now() + Duration::hours(1)),
            None,
        )
        .await
        .unwrap();

    assert_eq!(capsule.status, CapsuleStatus::Sealed);
    assert!(capsule.ledger_id.is_some());
    assert!(capsule.opened_at.is_none());

    // Immediate open attempt by the recipient fails the condition check
    let err = services
        .capsules
        .open(capsule.id, "0xRecipient")
        .await
        .unwrap_err();
    assert!(matches!(err, CapsuleError::Precondition(_)));

    // Not due, so the sweep leaves it alone
    assert_eq!(services.capsules.process_due_capsules().unwrap(), 0);

    // An hour and a second pass
    backdate(&services, capsule.id, Utc::now() - Duration::seconds(1));

    // Sweep promotes it exactly once
    assert_eq!(services.capsules.process_due_capsules().unwrap(), 1);
    let promoted = services.capsules.get(capsule.id).unwrap().unwrap();
    assert_eq!(promoted.status, CapsuleStatus::ReadyToOpen);

    // Second sweep in immediate succession finds nothing sealed
    assert_eq!(services.capsules.process_due_capsules().unwrap(), 0);

    // Recipient opens it
    let opened = services.capsules.open(capsule.id, "0xRecipient").await.unwrap();
    assert_eq!(opened.status, CapsuleStatus::Opened);
    assert!(opened.opened_at.is_some());

    // An opened capsule cannot be opened again
    let err = services
        .capsules
        .open(capsule.id, "0xRecipient")
        .await
        .unwrap_err();
    assert!(matches!(err, CapsuleError::Precondition(_)));
}

#[tokio::test]
async fn test_open_directly_from_sealed_without_sweep() {
    // The sweep is only a discoverability cache; a due capsule opens
    // straight from SEALED
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("no sweep needed", "0xBob", Utc::now() - Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    let opened = services.capsules.open(capsule.id, "0xBob").await.unwrap();
    assert_eq!(opened.status, CapsuleStatus::Opened);
}

// ============================================================================
// Authorization
// ============================================================================

#[tokio::test]
async fn test_open_authorization_is_case_insensitive() {
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("cased", "0xABCDEF", Utc::now() - Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    let opened = services.capsules.open(capsule.id, "0xabcdef").await.unwrap();
    assert_eq!(opened.status, CapsuleStatus::Opened);
}

#[tokio::test]
async fn test_creator_cannot_open_what_they_sealed() {
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("not for you", "0xRecipient", Utc::now() - Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    // The creator initiated the capsule but is not the recipient
    let err = services
        .capsules
        .open(capsule.id, "0xCreator")
        .await
        .unwrap_err();
    assert!(matches!(err, CapsuleError::Unauthorized(_)));

    let err = services
        .capsules
        .open(capsule.id, "0xStranger")
        .await
        .unwrap_err();
    assert!(matches!(err, CapsuleError::Unauthorized(_)));

    // Still sealed after the denials
    let capsule = services.capsules.get(capsule.id).unwrap().unwrap();
    assert_eq!(capsule.status, CapsuleStatus::Sealed);
}

#[tokio::test]
async fn test_open_unknown_capsule_is_not_found() {
    let services = default_services();
    let err = services.capsules.open(404, "0xAnyone").await.unwrap_err();
    assert!(matches!(err, CapsuleError::NotFound(_)));
}

// ============================================================================
// Creation failure modes
// ============================================================================

#[tokio::test]
async fn test_content_store_failure_aborts_creation() {
    let ledger = Arc::new(CountingLedger::new());
    let services = services_with(ledger.clone(), Arc::new(FailingContentStore));

    let err = services
        .capsules
        .create(
            time_draft("doomed", "0xBob", Utc::now() + Duration::hours(1)),
            Some(b"some content".to_vec()),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CapsuleError::ContentStore(_)));
    // The ledger was never consulted and nothing was persisted
    assert_eq!(ledger.registrations.load(Ordering::SeqCst), 0);
    assert!(services.capsules.list_by_creator("0xCreator").unwrap().is_empty());
}

#[tokio::test]
async fn test_ledger_failure_aborts_creation() {
    let services = services_with(
        Arc::new(FailingLedger),
        Arc::new(MemoryContentStore::new()),
    );

    let err = services
        .capsules
        .create(
            time_draft("doomed", "0xBob", Utc::now() + Duration::hours(1)),
            None,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, CapsuleError::Ledger(_)));
    assert!(services.capsules.list_by_creator("0xCreator").unwrap().is_empty());
}

#[tokio::test]
async fn test_time_capsule_requires_open_date() {
    let services = default_services();
    let mut draft = time_draft("undated", "0xBob", Utc::now());
    draft.open_date = None;

    let err = services.capsules.create(draft, None).await.unwrap_err();
    assert!(matches!(err, CapsuleError::InvalidInput(_)));
}

#[tokio::test]
async fn test_ledger_refusing_open_leaves_state_unchanged() {
    let services = services_with(
        Arc::new(RefusingLedger {
            inner: MockLedger::new(),
        }),
        Arc::new(MemoryContentStore::new()),
    );

    let capsule = services
        .capsules
        .create(
            time_draft("stuck", "0xBob", Utc::now() - Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    let err = services.capsules.open(capsule.id, "0xBob").await.unwrap_err();
    assert!(matches!(err, CapsuleError::Ledger(_)));

    let unchanged = services.capsules.get(capsule.id).unwrap().unwrap();
    assert_eq!(unchanged.status, CapsuleStatus::Sealed);
    assert!(unchanged.opened_at.is_none());
}

// ============================================================================
// Unimplemented condition types
// ============================================================================

#[tokio::test]
async fn test_multisig_capsule_seals_but_never_opens() {
    let services = default_services();

    let capsule = services
        .capsules
        .create(
            CapsuleDraft {
                title: "multisig".into(),
                description: None,
                creator_address: "0xCreator".into(),
                recipient_address: Some("0xBob".into()),
                condition_type: ConditionType::Multisig,
                condition_data: Some(r#"{"signers": 3}"#.into()),
                open_date: None,
                featured: false,
                assets: vec![],
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(capsule.status, CapsuleStatus::Sealed);

    // The recipient cannot open it - the condition has no strategy
    let err = services.capsules.open(capsule.id, "0xBob").await.unwrap_err();
    assert!(matches!(err, CapsuleError::Precondition(_)));

    // And the sweep never picks it up
    assert_eq!(services.capsules.process_due_capsules().unwrap(), 0);
}

// ============================================================================
// Administrative override
// ============================================================================

#[tokio::test]
async fn test_update_status_stamps_and_restamps_opened_at() {
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("overridden", "0xBob", Utc::now() + Duration::hours(1)),
            None,
        )
        .await
        .unwrap();

    let first = services
        .capsules
        .update_status(capsule.id, CapsuleStatus::Opened)
        .unwrap();
    assert_eq!(first.status, CapsuleStatus::Opened);
    let first_stamp = first.opened_at.expect("opened_at stamped");

    // Same value again: equivalent record, opened_at re-stamped to now
    let second = services
        .capsules
        .update_status(capsule.id, CapsuleStatus::Opened)
        .unwrap();
    assert_eq!(second.status, CapsuleStatus::Opened);
    let second_stamp = second.opened_at.expect("opened_at stamped");
    assert!(second_stamp >= first_stamp);

    // The override bypasses the guards in both directions
    let reverted = services
        .capsules
        .update_status(capsule.id, CapsuleStatus::Failed)
        .unwrap();
    assert_eq!(reverted.status, CapsuleStatus::Failed);

    let err = services
        .capsules
        .update_status(404, CapsuleStatus::Sealed)
        .unwrap_err();
    assert!(matches!(err, CapsuleError::NotFound(_)));
}

// ============================================================================
// Engagement counters
// ============================================================================

#[tokio::test]
async fn test_view_count_increments_without_touching_status() {
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("viewed", "0xBob", Utc::now() + Duration::hours(1)),
            None,
        )
        .await
        .unwrap();
    assert_eq!(capsule.view_count, 0);

    services.capsules.record_view(capsule.id).unwrap();
    services.capsules.record_view(capsule.id).unwrap();
    let viewed = services.capsules.record_view(capsule.id).unwrap();

    assert_eq!(viewed.view_count, 3);
    assert_eq!(viewed.status, CapsuleStatus::Sealed);

    let shared = services.capsules.record_share(capsule.id).unwrap();
    assert_eq!(shared.share_count, 1);

    let subscribed = services.capsules.subscribe(capsule.id, "0xFan").unwrap();
    assert_eq!(subscribed.subscription_count, 1);

    let err = services.capsules.record_view(404).unwrap_err();
    assert!(matches!(err, CapsuleError::NotFound(_)));
}

// ============================================================================
// Content round trip
// ============================================================================

#[tokio::test]
async fn test_sealed_content_round_trip() {
    let services = default_services();
    let payload = b"open me in a year".to_vec();

    let capsule = services
        .capsules
        .create(
            time_draft("with content", "0xBob", Utc::now() + Duration::hours(1)),
            Some(payload.clone()),
        )
        .await
        .unwrap();

    let content_ref = capsule.content_hash.clone().expect("content reference set");
    assert!(content_ref.starts_with("Qm"));

    let fetched = services.capsules.fetch_content(capsule.id).await.unwrap();
    assert_eq!(fetched, payload);

    // Empty uploads are skipped entirely
    let bare = services
        .capsules
        .create(
            time_draft("no content", "0xBob", Utc::now() + Duration::hours(1)),
            Some(vec![]),
        )
        .await
        .unwrap();
    assert!(bare.content_hash.is_none());

    let err = services.capsules.fetch_content(bare.id).await.unwrap_err();
    assert!(matches!(err, CapsuleError::NotFound(_)));
}

// ============================================================================
// Reconciliation views
// ============================================================================

#[tokio::test]
async fn test_ledger_state_reflects_lifecycle() {
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("reconciled", "0xBob", Utc::now() - Duration::minutes(1)),
            None,
        )
        .await
        .unwrap();

    let state = services.capsules.ledger_state(capsule.id).await.unwrap();
    assert_eq!(state.status, CapsuleStatus::Sealed);
    assert!(state.ready_to_open);
    assert_eq!(Some(state.ledger_id), capsule.ledger_id);

    services.capsules.open(capsule.id, "0xBob").await.unwrap();

    let state = services.capsules.ledger_state(capsule.id).await.unwrap();
    assert_eq!(state.status, CapsuleStatus::Opened);

    // No orphans under normal operation
    assert!(services.capsules.ledger_orphans().unwrap().is_empty());
}

#[tokio::test]
async fn test_lookup_by_ledger_id() {
    let services = default_services();
    let capsule = services
        .capsules
        .create(
            time_draft("indexed", "0xBob", Utc::now() + Duration::hours(1)),
            None,
        )
        .await
        .unwrap();

    let ledger_id = capsule.ledger_id.clone().unwrap();
    let found = services
        .capsules
        .get_by_ledger_id(&ledger_id)
        .unwrap()
        .expect("found by ledger id");
    assert_eq!(found.id, capsule.id);

    assert!(services
        .capsules
        .get_by_ledger_id("mock_unknown")
        .unwrap()
        .is_none());
}
