//! Capsule service - lifecycle logic for capsule operations
//!
//! Owns the state machine: DRAFT drafts become SEALED only after the content
//! upload (when present) and the ledger registration both succeed, the sweep
//! promotes SEALED to READY_TO_OPEN, and the recipient's open moves
//! SEALED/READY_TO_OPEN to OPENED. Every transition commits through a
//! status-guarded UPDATE in the db layer, and external calls are never made
//! while the db connection is held, so a failed collaborator call leaves no
//! half-applied transition.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::condition::{self, ConditionCheck};
use crate::content_store::ContentStore;
use crate::db::{capsules, CapsuleDb, EngagementCounter, LedgerOrphan, NewCapsule};
use crate::error::CapsuleError;
use crate::ledger::{Ledger, LedgerRegistration};
use crate::model::{Capsule, CapsuleDraft, CapsuleStatus, ConditionType};

use super::events::{CapsuleEvent, EventBus};

/// Ledger-side view of a capsule, for reconciliation against local state
#[derive(Debug, Clone, serde::Serialize)]
pub struct LedgerState {
    pub ledger_id: String,
    pub status: CapsuleStatus,
    pub ready_to_open: bool,
}

/// Capsule lifecycle service
pub struct CapsuleService {
    db: Arc<CapsuleDb>,
    ledger: Arc<dyn Ledger>,
    content_store: Arc<dyn ContentStore>,
    events: Arc<EventBus>,
}

impl CapsuleService {
    /// Create a new capsule service
    pub fn new(
        db: Arc<CapsuleDb>,
        ledger: Arc<dyn Ledger>,
        content_store: Arc<dyn ContentStore>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            db,
            ledger,
            content_store,
            events,
        }
    }

    // =========================================================================
    // Lifecycle Operations
    // =========================================================================

    /// Create a capsule, optionally sealing content into the content store
    ///
    /// Ordering matters: content upload, then ledger registration, then the
    /// local persist. A failure at any step aborts the whole operation, so
    /// no SEALED capsule can exist without a ledger id. The reverse does not
    /// hold - if the persist fails after registration, the ledger id is
    /// recorded in `ledger_orphans` for out-of-band reconciliation.
    pub async fn create(
        &self,
        draft: CapsuleDraft,
        content: Option<Vec<u8>>,
    ) -> Result<Capsule, CapsuleError> {
        info!(title = %draft.title, "Creating new time capsule");
        self.validate_draft(&draft)?;

        let mut content_hash = None;
        if let Some(data) = content.as_deref() {
            if !data.is_empty() {
                let content_ref = self.content_store.upload(data).await?;
                info!(content_ref = %content_ref, "Content uploaded to content store");
                content_hash = Some(content_ref);
            }
        }

        let registration = LedgerRegistration {
            title: draft.title.clone(),
            content_ref: content_hash.clone(),
            creator_address: draft.creator_address.clone(),
            recipient_address: draft.recipient_address.clone(),
            condition_type: draft.condition_type,
            condition_data: draft.condition_data.clone(),
        };
        let ledger_id = self.ledger.register(&registration).await?;
        info!(ledger_id = %ledger_id, "Capsule registered on ledger");

        let record = NewCapsule {
            title: draft.title,
            description: draft.description,
            ledger_id: ledger_id.clone(),
            creator_address: draft.creator_address,
            recipient_address: draft.recipient_address,
            content_hash,
            status: CapsuleStatus::Sealed,
            created_at: Utc::now(),
            open_date: draft.open_date,
            condition_type: draft.condition_type,
            condition_data: draft.condition_data,
            featured: draft.featured,
            assets: draft.assets,
        };

        let capsule = match self.db.with_conn_mut(|conn| capsules::insert_capsule(conn, &record)) {
            Ok(capsule) => capsule,
            Err(e) => {
                warn!(
                    ledger_id = %ledger_id,
                    error = %e,
                    "Persist failed after ledger registration, recording orphan"
                );
                let orphan = self.db.with_conn(|conn| {
                    capsules::record_ledger_orphan(
                        conn,
                        &ledger_id,
                        &record.title,
                        &e.to_string(),
                        Utc::now(),
                    )
                });
                if let Err(orphan_err) = orphan {
                    warn!(ledger_id = %ledger_id, error = %orphan_err, "Orphan record failed");
                }
                self.events.emit(CapsuleEvent::LedgerOrphaned { ledger_id });
                return Err(e);
            }
        };

        self.events.emit(CapsuleEvent::CapsuleSealed {
            id: capsule.id,
            ledger_id,
            title: capsule.title.clone(),
        });

        Ok(capsule)
    }

    /// Attempt to open a capsule on behalf of a requester
    ///
    /// Succeeds only when the capsule exists, is SEALED or READY_TO_OPEN,
    /// the requester is the recipient (case-insensitive), the opening
    /// condition is satisfied, and the ledger-side open goes through. The
    /// returned error carries the precise denial reason for diagnostics;
    /// outward-facing layers collapse all denials into one answer.
    pub async fn open(&self, id: i64, requester_address: &str) -> Result<Capsule, CapsuleError> {
        let capsule = self
            .db
            .with_conn(|conn| capsules::get_capsule(conn, id))?
            .ok_or_else(|| CapsuleError::NotFound(format!("Capsule {} not found", id)))?;

        if capsule.status != CapsuleStatus::Sealed && capsule.status != CapsuleStatus::ReadyToOpen {
            warn!(id = %id, status = %capsule.status, "Attempt to open capsule in invalid state");
            return Err(CapsuleError::Precondition(format!(
                "Capsule {} is {}",
                id, capsule.status
            )));
        }

        let authorized = capsule
            .recipient_address
            .as_deref()
            .map(|recipient| recipient.eq_ignore_ascii_case(requester_address))
            .unwrap_or(false);
        if !authorized {
            warn!(id = %id, requester = %requester_address, "Unauthorized attempt to open capsule");
            return Err(CapsuleError::Unauthorized(format!(
                "{} is not the recipient of capsule {}",
                requester_address, id
            )));
        }

        let now = Utc::now();
        match condition::evaluate(&capsule, now) {
            ConditionCheck::Satisfied => {}
            ConditionCheck::NotYetDue => {
                warn!(id = %id, "Attempt to open capsule before its open date");
                return Err(CapsuleError::Precondition(format!(
                    "Capsule {} is not due for opening yet",
                    id
                )));
            }
            ConditionCheck::Unsupported => {
                warn!(id = %id, condition = %capsule.condition_type, "Condition type not evaluable");
                return Err(CapsuleError::Precondition(format!(
                    "{} conditions cannot be opened",
                    capsule.condition_type
                )));
            }
        }

        // Invariant: a SEALED capsule always carries a ledger id
        let ledger_id = capsule
            .ledger_id
            .as_deref()
            .ok_or_else(|| CapsuleError::Ledger(format!("Capsule {} has no ledger id", id)))?;

        let opened = self.ledger.open(ledger_id, requester_address).await?;
        if !opened {
            return Err(CapsuleError::Ledger(format!(
                "Ledger refused to open capsule {}",
                id
            )));
        }

        let committed = self.db.with_conn(|conn| capsules::mark_opened(conn, id, now))?;
        if !committed {
            // Lost the race against a concurrent open or override
            return Err(CapsuleError::Precondition(format!(
                "Capsule {} changed state during open",
                id
            )));
        }

        let capsule = self
            .db
            .with_conn(|conn| capsules::get_capsule(conn, id))?
            .ok_or_else(|| CapsuleError::Internal("Capsule vanished after open".to_string()))?;

        info!(id = %id, requester = %requester_address, "Capsule opened");
        self.events.emit(CapsuleEvent::CapsuleOpened {
            id,
            opened_by: requester_address.to_string(),
        });

        Ok(capsule)
    }

    /// Administrative status override
    ///
    /// Bypasses the state machine guards entirely; an escape hatch for
    /// operators, not a lifecycle operation. Setting OPENED stamps
    /// `opened_at = now`, and re-stamps it on repeat calls.
    pub fn update_status(
        &self,
        id: i64,
        status: CapsuleStatus,
    ) -> Result<Capsule, CapsuleError> {
        let opened_at = (status == CapsuleStatus::Opened).then(Utc::now);

        let changed = self
            .db
            .with_conn(|conn| capsules::set_status(conn, id, status, opened_at))?;
        if !changed {
            return Err(CapsuleError::NotFound(format!("Capsule {} not found", id)));
        }

        info!(id = %id, status = %status, "Capsule status overridden");
        self.events.emit(CapsuleEvent::StatusOverridden { id, status });

        self.db
            .with_conn(|conn| capsules::get_capsule(conn, id))?
            .ok_or_else(|| CapsuleError::Internal("Capsule vanished after update".to_string()))
    }

    /// Promote sealed TIME capsules whose open date has passed
    ///
    /// The sweep body: promotion is a per-capsule guarded transition, so a
    /// concurrent sweep or open promotes each capsule at most once, and a
    /// failure on one record never blocks the rest of the batch. Purely a
    /// discoverability cache - `open` re-evaluates the condition itself.
    pub fn process_due_capsules(&self) -> Result<usize, CapsuleError> {
        debug!("Checking for capsules due for opening");
        let now = Utc::now();

        let due = self
            .db
            .with_conn(|conn| capsules::find_due_for_promotion(conn, now))?;

        let mut promoted = 0;
        for capsule in due {
            match self
                .db
                .with_conn(|conn| capsules::promote_to_ready(conn, capsule.id))
            {
                Ok(true) => {
                    promoted += 1;
                    self.events.emit(CapsuleEvent::CapsulePromoted { id: capsule.id });
                }
                Ok(false) => {
                    debug!(id = %capsule.id, "Capsule already left SEALED, skipping");
                }
                Err(e) => {
                    warn!(id = %capsule.id, error = %e, "Promotion failed, continuing sweep");
                }
            }
        }

        if promoted > 0 {
            info!(promoted = promoted, "Promoted capsules ready to open");
        }

        Ok(promoted)
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Get a capsule by id
    pub fn get(&self, id: i64) -> Result<Option<Capsule>, CapsuleError> {
        self.db.with_conn(|conn| capsules::get_capsule(conn, id))
    }

    /// Get a capsule by its ledger id
    pub fn get_by_ledger_id(&self, ledger_id: &str) -> Result<Option<Capsule>, CapsuleError> {
        self.db
            .with_conn(|conn| capsules::get_capsule_by_ledger_id(conn, ledger_id))
    }

    /// Capsules created by an address
    pub fn list_by_creator(&self, address: &str) -> Result<Vec<Capsule>, CapsuleError> {
        self.db.with_conn(|conn| capsules::list_by_creator(conn, address))
    }

    /// Capsules addressed to a recipient
    pub fn list_by_recipient(&self, address: &str) -> Result<Vec<Capsule>, CapsuleError> {
        self.db
            .with_conn(|conn| capsules::list_by_recipient(conn, address))
    }

    /// Capsules an address is party to, as creator or recipient
    pub fn list_by_address(&self, address: &str) -> Result<Vec<Capsule>, CapsuleError> {
        self.db.with_conn(|conn| capsules::list_by_address(conn, address))
    }

    /// Sealed or opened capsules by view count
    pub fn popular(&self, limit: u32) -> Result<Vec<Capsule>, CapsuleError> {
        self.db.with_conn(|conn| capsules::list_popular(conn, limit))
    }

    /// Manually curated capsules
    pub fn featured(&self) -> Result<Vec<Capsule>, CapsuleError> {
        self.db.with_conn(capsules::list_featured)
    }

    /// Most recently opened capsules
    pub fn recently_opened(&self, limit: u32) -> Result<Vec<Capsule>, CapsuleError> {
        self.db
            .with_conn(|conn| capsules::list_recently_opened(conn, limit))
    }

    /// Sealed capsules by subscription count
    pub fn most_subscribed(&self, limit: u32) -> Result<Vec<Capsule>, CapsuleError> {
        self.db
            .with_conn(|conn| capsules::list_most_subscribed(conn, limit))
    }

    /// Fetch a capsule's sealed content from the content store
    pub async fn fetch_content(&self, id: i64) -> Result<Vec<u8>, CapsuleError> {
        let capsule = self
            .db
            .with_conn(|conn| capsules::get_capsule(conn, id))?
            .ok_or_else(|| CapsuleError::NotFound(format!("Capsule {} not found", id)))?;

        let content_ref = capsule
            .content_hash
            .ok_or_else(|| CapsuleError::NotFound(format!("Capsule {} has no content", id)))?;

        self.content_store.fetch(&content_ref).await
    }

    /// Ledger-side view of a capsule, for reconciling against local state
    pub async fn ledger_state(&self, id: i64) -> Result<LedgerState, CapsuleError> {
        let capsule = self
            .db
            .with_conn(|conn| capsules::get_capsule(conn, id))?
            .ok_or_else(|| CapsuleError::NotFound(format!("Capsule {} not found", id)))?;

        let ledger_id = capsule
            .ledger_id
            .ok_or_else(|| CapsuleError::Ledger(format!("Capsule {} has no ledger id", id)))?;

        let status = self.ledger.status(&ledger_id).await?;
        let ready_to_open = self.ledger.is_ready_to_open(&ledger_id).await?;

        Ok(LedgerState {
            ledger_id,
            status,
            ready_to_open,
        })
    }

    /// Ledger registrations that outlived a failed persist
    pub fn ledger_orphans(&self) -> Result<Vec<LedgerOrphan>, CapsuleError> {
        self.db.with_conn(capsules::list_ledger_orphans)
    }

    // =========================================================================
    // Engagement Operations
    // =========================================================================

    /// Increment the view counter
    pub fn record_view(&self, id: i64) -> Result<Capsule, CapsuleError> {
        self.bump(id, EngagementCounter::Views)
    }

    /// Increment the share counter
    pub fn record_share(&self, id: i64) -> Result<Capsule, CapsuleError> {
        self.bump(id, EngagementCounter::Shares)
    }

    /// Subscribe a user to be notified when the capsule opens
    ///
    /// Counts every call - subscriptions are not deduplicated per address.
    pub fn subscribe(&self, id: i64, user_address: &str) -> Result<Capsule, CapsuleError> {
        let capsule = self.bump(id, EngagementCounter::Subscriptions)?;
        self.events.emit(CapsuleEvent::CapsuleSubscribed {
            id,
            user_address: user_address.to_string(),
        });
        Ok(capsule)
    }

    fn bump(&self, id: i64, counter: EngagementCounter) -> Result<Capsule, CapsuleError> {
        let changed = self
            .db
            .with_conn(|conn| capsules::increment_counter(conn, id, counter))?;
        if !changed {
            return Err(CapsuleError::NotFound(format!("Capsule {} not found", id)));
        }

        self.db
            .with_conn(|conn| capsules::get_capsule(conn, id))?
            .ok_or_else(|| CapsuleError::Internal("Capsule vanished after counter update".to_string()))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Delete a capsule; asset rows cascade with it
    pub fn delete(&self, id: i64) -> Result<bool, CapsuleError> {
        let deleted = self.db.with_conn(|conn| capsules::delete_capsule(conn, id))?;

        if deleted {
            self.events.emit(CapsuleEvent::CapsuleDeleted { id });
        }

        Ok(deleted)
    }

    fn validate_draft(&self, draft: &CapsuleDraft) -> Result<(), CapsuleError> {
        if draft.title.trim().is_empty() {
            return Err(CapsuleError::InvalidInput("title is required".to_string()));
        }
        if draft.creator_address.trim().is_empty() {
            return Err(CapsuleError::InvalidInput(
                "creator address is required".to_string(),
            ));
        }
        if draft.condition_type == ConditionType::Time && draft.open_date.is_none() {
            return Err(CapsuleError::InvalidInput(
                "TIME capsules require an open date".to_string(),
            ));
        }
        Ok(())
    }
}
