//! Lifecycle event bus
//!
//! Capsule transitions are broadcast to in-process listeners. The audit log
//! rides on this, and it is the hook for future subscriber notifications -
//! the lifecycle itself never depends on anyone listening.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::model::CapsuleStatus;

const DEFAULT_CAPACITY: usize = 1024;

/// Lifecycle events emitted by the capsule service
#[derive(Debug, Clone)]
pub enum CapsuleEvent {
    /// Capsule registered on the ledger and persisted
    CapsuleSealed {
        id: i64,
        ledger_id: String,
        title: String,
    },
    /// Sweep found the capsule's condition satisfied
    CapsulePromoted { id: i64 },
    /// Recipient opened the capsule
    CapsuleOpened { id: i64, opened_by: String },
    /// Administrative status write bypassing the state machine
    StatusOverridden { id: i64, status: CapsuleStatus },
    CapsuleSubscribed { id: i64, user_address: String },
    CapsuleDeleted { id: i64 },
    /// Ledger registration survived a failed local persist
    LedgerOrphaned { ledger_id: String },
}

/// Handles events delivered by a listener task
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &CapsuleEvent);
}

/// Broadcast channel fanning lifecycle events out to listeners
pub struct EventBus {
    sender: broadcast::Sender<CapsuleEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Broadcast an event; a bus without subscribers swallows it
    pub fn emit(&self, event: CapsuleEvent) {
        trace!(event = ?event, "Emitting capsule event");
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CapsuleEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Listener writing the audit trail to the log
pub struct LoggingEventListener;

impl EventListener for LoggingEventListener {
    fn on_event(&self, event: &CapsuleEvent) {
        match event {
            CapsuleEvent::CapsuleSealed {
                id,
                ledger_id,
                title,
            } => {
                info!(id = %id, ledger_id = %ledger_id, title = %title, "Capsule sealed");
            }
            CapsuleEvent::CapsulePromoted { id } => {
                debug!(id = %id, "Capsule ready to open");
            }
            CapsuleEvent::CapsuleOpened { id, opened_by } => {
                info!(id = %id, opened_by = %opened_by, "Capsule opened");
            }
            CapsuleEvent::StatusOverridden { id, status } => {
                warn!(id = %id, status = %status, "Capsule status overridden");
            }
            CapsuleEvent::LedgerOrphaned { ledger_id } => {
                warn!(ledger_id = %ledger_id, "Ledger registration orphaned");
            }
            _ => {
                trace!(event = ?event, "Capsule event");
            }
        }
    }
}

/// Run the audit listener until the bus closes
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    let listener = LoggingEventListener;

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => listener.on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    // The audit log tolerates gaps; lifecycle state does not
                    // live here
                    debug!(skipped = n, "Event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
