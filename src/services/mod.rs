//! Service layer for capsule-vault
//!
//! Services encapsulate lifecycle logic between HTTP handlers and the
//! record store:
//! - Input validation
//! - Orchestration of the ledger and content-store collaborators
//! - State-machine enforcement
//! - Event emission for audit/notifications
//!
//! ## Architecture
//!
//! ```text
//! HTTP Handlers (thin)
//!     |
//! Service Layer (lifecycle logic)
//!     |            \
//! Repository      Collaborators
//! (db/*.rs)       (ledger, content store)
//!     |
//! SQLite Database
//! ```

pub mod response;
pub mod events;
pub mod capsule_service;

// Re-exports
pub use capsule_service::{CapsuleService, LedgerState};
pub use events::{CapsuleEvent, EventBus, EventListener};

use std::sync::Arc;

use crate::content_store::ContentStore;
use crate::db::CapsuleDb;
use crate::ledger::Ledger;

/// Service container for dependency injection
///
/// Holds the services with their shared database and collaborators.
/// Pass this to HttpServer for handler access.
pub struct Services {
    pub capsules: Arc<CapsuleService>,
    pub events: Arc<EventBus>,
    pub db: Arc<CapsuleDb>,
}

impl Services {
    /// Create all services with shared database and collaborators
    pub fn new(
        db: Arc<CapsuleDb>,
        ledger: Arc<dyn Ledger>,
        content_store: Arc<dyn ContentStore>,
    ) -> Self {
        let events = Arc::new(EventBus::new());

        Self {
            capsules: Arc::new(CapsuleService::new(
                db.clone(),
                ledger,
                content_store,
                events.clone(),
            )),
            events,
            db,
        }
    }
}
