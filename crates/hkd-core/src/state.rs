//! Snapshot of an upstream entity's state

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Context, EntityId, STATE_ON, STATE_UNAVAILABLE, STATE_UNKNOWN};

/// The state of an entity at a point in time
///
/// The raw `state` is always a string ("on", "72.3", "armed_away", ...);
/// typed interpretation is left to the consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: EntityId,

    /// Raw state value
    pub state: String,

    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,

    /// When the raw state last differed from its predecessor
    pub last_changed: DateTime<Utc>,

    /// When the state or attributes were last written
    pub last_updated: DateTime<Utc>,

    pub context: Context,
}

impl EntityState {
    pub fn new(
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        Self {
            entity_id,
            state: state.into(),
            attributes,
            last_changed: now,
            last_updated: now,
            context,
        }
    }

    /// Successor state, keeping `last_changed` when the raw value is unchanged
    pub fn with_update(
        &self,
        new_state: impl Into<String>,
        new_attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> Self {
        let now = Utc::now();
        let new_state = new_state.into();
        let last_changed = if self.state == new_state {
            self.last_changed
        } else {
            now
        };

        Self {
            entity_id: self.entity_id.clone(),
            state: new_state,
            attributes: new_attributes,
            last_changed,
            last_updated: now,
            context,
        }
    }

    pub fn is_on(&self) -> bool {
        self.state == STATE_ON
    }

    pub fn is_unavailable(&self) -> bool {
        self.state == STATE_UNAVAILABLE
    }

    pub fn is_unknown(&self) -> bool {
        self.state == STATE_UNKNOWN
    }

    /// Typed attribute lookup; `None` when absent or of another shape
    pub fn attribute<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.attributes
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }
}

impl PartialEq for EntityState {
    fn eq(&self, other: &Self) -> bool {
        // Timestamps and context do not take part in equality
        self.entity_id == other.entity_id
            && self.state == other.state
            && self.attributes == other.attributes
    }
}
