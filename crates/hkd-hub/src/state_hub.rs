//! Entity state storage with per-entity change notification

use dashmap::DashMap;
use hkd_core::events::StateChangedData;
use hkd_core::{Context, EntityId, EntityState};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, trace, warn};

/// Default channel capacity for per-entity subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// The state hub tracks all entity states
///
/// The StateHub is responsible for:
/// - Storing the current state of every entity
/// - Maintaining a domain index for domain-based queries
/// - Delivering state changes to subscribers of the changed entity, in the
///   order they were written
pub struct StateHub {
    /// All entity states keyed by entity_id string
    states: DashMap<String, EntityState>,
    /// Index of entity_ids by domain
    domain_index: DashMap<String, Vec<String>>,
    /// One broadcast channel per subscribed entity
    channels: DashMap<String, broadcast::Sender<StateChangedData>>,
    capacity: usize,
}

impl StateHub {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a hub whose per-entity channels buffer `capacity` changes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            states: DashMap::new(),
            domain_index: DashMap::new(),
            channels: DashMap::new(),
            capacity,
        }
    }

    /// Set the state of an entity and notify its subscribers
    ///
    /// `last_changed` only moves when the raw state value changes.
    #[instrument(skip(self, state, attributes, context), fields(entity_id = %entity_id))]
    pub fn set(
        &self,
        entity_id: EntityId,
        state: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
        context: Context,
    ) -> EntityState {
        let key = entity_id.to_string();
        let old_state = self.states.get(&key).map(|s| s.clone());

        let new_state = match &old_state {
            Some(existing) => existing.with_update(state, attributes, context),
            None => EntityState::new(entity_id.clone(), state, attributes, context),
        };

        debug!(
            state = %new_state.state,
            changed = old_state.as_ref().map(|s| s.state != new_state.state).unwrap_or(true),
            "Setting entity state"
        );

        self.states.insert(key.clone(), new_state.clone());

        if old_state.is_none() {
            self.domain_index
                .entry(entity_id.domain().to_string())
                .or_default()
                .push(key.clone());
        }

        self.notify(
            &key,
            StateChangedData {
                entity_id,
                old_state,
                new_state: Some(new_state.clone()),
            },
        );

        new_state
    }

    /// Remove an entity, notifying subscribers with an absent new state
    #[instrument(skip(self), fields(entity_id = %entity_id))]
    pub fn remove(&self, entity_id: &EntityId) -> Option<EntityState> {
        let key = entity_id.to_string();
        let old_state = self.states.remove(&key).map(|(_, s)| s);

        if let Some(state) = &old_state {
            trace!("Removing entity state");
            if let Some(mut ids) = self.domain_index.get_mut(entity_id.domain()) {
                ids.retain(|id| id != &key);
            }
            self.notify(
                &key,
                StateChangedData {
                    entity_id: entity_id.clone(),
                    old_state: Some(state.clone()),
                    new_state: None,
                },
            );
        }

        old_state
    }

    fn notify(&self, key: &str, change: StateChangedData) {
        let delivered = match self.channels.get(key) {
            Some(sender) => sender.send(change).is_ok(),
            None => return,
        };
        if !delivered {
            // Every receiver is gone; a new subscriber recreates the channel
            if self
                .channels
                .remove_if(key, |_, sender| sender.receiver_count() == 0)
                .is_some()
            {
                trace!(entity_id = %key, "Dropped idle state channel");
            }
        }
    }

    pub fn get(&self, entity_id: &str) -> Option<EntityState> {
        self.states.get(entity_id).map(|s| s.clone())
    }

    /// Raw state value, or None if the entity doesn't exist
    pub fn get_state(&self, entity_id: &str) -> Option<String> {
        self.states.get(entity_id).map(|s| s.state.clone())
    }

    pub fn entity_ids(&self, domain: &str) -> Vec<String> {
        self.domain_index
            .get(domain)
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    pub fn entity_count(&self) -> usize {
        self.states.len()
    }

    /// Receive every future change of one entity
    pub fn subscribe(&self, entity_id: &EntityId) -> broadcast::Receiver<StateChangedData> {
        trace!(entity_id = %entity_id, "Subscribing to entity");
        self.channels
            .entry(entity_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Run `listener` for every change of `entity_id`, one at a time
    ///
    /// The listener runs on a spawned task, so this must be called from
    /// within a tokio runtime. Dropping the returned handle stops delivery;
    /// a change that has not started processing is never delivered after
    /// that.
    pub fn track_state_change<F, Fut>(&self, entity_id: &EntityId, listener: F) -> TrackHandle
    where
        F: Fn(StateChangedData) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.subscribe(entity_id);
        let tracked = entity_id.clone();

        let task = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => listener(change).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(entity_id = %tracked, skipped = n, "State listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        debug!(entity_id = %entity_id, "Tracking state changes");
        TrackHandle {
            entity_id: entity_id.clone(),
            task,
        }
    }

    /// Number of entities with a change channel
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of live receivers for an entity
    pub fn listener_count(&self, entity_id: &EntityId) -> usize {
        self.channels
            .get(&entity_id.to_string())
            .map(|s| s.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for StateHub {
    fn default() -> Self {
        Self::new()
    }
}

/// A running state-change listener; stops when dropped
#[derive(Debug)]
pub struct TrackHandle {
    entity_id: EntityId,
    task: JoinHandle<()>,
}

impl TrackHandle {
    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for TrackHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
