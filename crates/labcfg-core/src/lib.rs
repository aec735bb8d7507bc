//! LabCfg Core - reconciliation pipeline
//!
//! The request unit that turns a submitted child-collection snapshot into
//! committed rows:
//! - Checks prerequisites and runs the validation gate
//! - Resolves natural-key references strictly
//! - Plans inserts, updates and deletes (flat or hierarchical)
//! - Applies them inside one transaction, then binds partner links
//! - Answers with a uniform envelope carrying the refreshed snapshot
//!
//! # Core Concepts
//!
//! - [`ReconcileService`]: the pipeline; `submit`, `plan`, `fetch`
//! - [`PersistenceSession`]: the only collaborator the pipeline consumes
//! - [`InMemoryStore`]: transactional in-memory backend
//! - [`EngineConfig`]: discriminator and per-slot settings, from TOML
//! - [`Envelope`]: `{ success, message, data, validationErrors }`
//!
//! # Example
//!
//! ```rust,ignore
//! use labcfg_core::{EngineConfig, InMemoryStore, ReconcileService, SlotKey, SubmitRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! let slot = SlotKey::new(1, "procedure", 10, "fields");
//! store.add_root(1, "procedure", 10);
//!
//! let service = ReconcileService::new(EngineConfig::lab_defaults(), catalog);
//! let mut session = store.session();
//! let envelope = service.submit(&mut session, SubmitRequest::new(slot, records)).await;
//! assert!(envelope.success);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

// Core modules
pub mod config;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod session;
pub mod store;

// Re-exports for convenience
pub use config::{EngineConfig, SlotConfig, UniqueScope};
pub use envelope::{Envelope, SlotSnapshot};
pub use error::{ConfigError, EngineError, SessionError};
pub use pipeline::{ReconcileService, SubmitOutcome, SubmitRequest};
pub use session::{PersistenceSession, SlotKey};
pub use store::{InMemorySession, InMemoryStore};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with LabCfg Core
    pub use crate::{
        EngineConfig, EngineError, Envelope, InMemoryStore, PersistenceSession,
        ReconcileService, SlotKey, SubmitRequest,
    };
    pub use labcfg_record::{ChildRecord, RecordId, VariantCatalog, WireCodec};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod integration_tests {
    use super::*;
    use labcfg_record::RecordId;
    use labcfg_test_utils::{catalog, double_field, text_field};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn submit_then_fetch_agree() {
        let store = InMemoryStore::new();
        let slot = SlotKey::new(1, "procedure", 10, "fields");
        store.add_root(1, "procedure", 10);
        let service = ReconcileService::new(EngineConfig::lab_defaults(), catalog());
        let mut session = store.session();

        let saved = service
            .submit(
                &mut session,
                SubmitRequest::new(
                    slot.clone(),
                    vec![double_field(-1, 0.0, 3.0).with_order(0), text_field(-2).with_order(1)],
                ),
            )
            .await;
        assert!(saved.success, "{}", saved.message);

        let fetched = service.fetch(&session, &slot).await;
        let saved = saved.data.unwrap();
        assert_eq!(fetched.data.as_ref(), Some(&saved.snapshot));
        assert_eq!(saved.summary.inserts, 2);
        assert!(saved.ids.iter().all(|id| id.get() > 0 && *id != RecordId::NEW));
    }
}
