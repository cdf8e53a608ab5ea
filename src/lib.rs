//! Capsule Vault - time capsule lifecycle service
//!
//! Seals capsules by registering them on an external ledger, optionally
//! storing their content in a content-addressed store, and releases them to
//! their recipient once the opening condition matures.
//!
//! ## Architecture
//!
//! - **Ledger**: external system of record for registration/opening events
//!   (trait seam; shipped provider is an in-memory mock)
//! - **Content store**: content-addressed storage for capsule payloads
//!   (in-memory store or an IPFS HTTP API client)
//! - **capsule-vault**: owns the lifecycle state machine and the capsule
//!   record store (SQLite)
//!
//! ## Lifecycle
//!
//! ```text
//! DRAFT --create--------------------> SEALED     (content upload + ledger
//!                                                 registration both succeeded)
//! SEALED --sweep, condition true----> READY_TO_OPEN
//! SEALED | READY_TO_OPEN --open-----> OPENED     (recipient only, condition
//!                                                 re-checked, ledger agreed)
//! ```
//!
//! A failed collaborator call aborts the whole operation - no partial
//! transition is ever persisted. The readiness sweeper is purely a
//! discoverability cache: `open` re-evaluates the condition on its own.
//!
//! ## Storage Layout
//!
//! ```text
//! ~/.local/share/capsule-vault/
//! ├── capsules.db            # Capsule records, assets, ledger orphans
//! └── config.toml            # Configuration
//! ```

pub mod model;
pub mod condition;
pub mod error;
pub mod config;
pub mod db;
pub mod ledger;
pub mod content_store;
pub mod services;
pub mod sweeper;
pub mod http;

// Re-exports
pub use condition::ConditionCheck;
pub use config::Config;
pub use content_store::{ContentStore, IpfsClient, MemoryContentStore};
pub use db::CapsuleDb;
pub use error::CapsuleError;
pub use http::HttpServer;
pub use ledger::{Ledger, LedgerRegistration, MockLedger};
pub use model::{Capsule, CapsuleDraft, CapsuleStatus, ConditionType};
pub use services::{CapsuleService, EventBus, Services};
pub use sweeper::SweeperConfig;
