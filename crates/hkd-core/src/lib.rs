//! Core types shared by the device aggregator crates
//!
//! This crate provides the host-platform value types the aggregator observes
//! and commands: EntityId, EntityState, Context and ServiceCall, plus the
//! canonical state tokens and the per-domain service tables.

mod context;
pub mod domains;
mod entity_id;
mod service_call;
mod state;

pub use context::Context;
pub use entity_id::{EntityId, EntityIdError};
pub use service_call::ServiceCall;
pub use state::EntityState;

/// Canonical "on" token for binary entities
pub const STATE_ON: &str = "on";

/// Canonical "off" token for binary entities
pub const STATE_OFF: &str = "off";

/// State reported when the integration does not know the value
pub const STATE_UNKNOWN: &str = "unknown";

/// State reported when the entity cannot be reached
pub const STATE_UNAVAILABLE: &str = "unavailable";

/// Notification payloads delivered by the state hub
pub mod events {
    use super::*;

    /// Payload of a single entity state change
    ///
    /// `new_state` is `None` when the entity was removed.
    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    pub struct StateChangedData {
        pub entity_id: EntityId,
        pub old_state: Option<EntityState>,
        pub new_state: Option<EntityState>,
    }
}
