//! The aggregation bridge
//!
//! One [`AggregationBridge`] owns one aggregated device. Activation
//! declares the device downstream, subscribes once to every distinct bound
//! entity and publishes their current values. From then on each upstream
//! change is fanned out to every characteristic its entity feeds, and each
//! controller write is turned into a command for the bound entity.
//!
//! Runtime state sits behind a single mutex that is never held across an
//! await. Subscription listeners and the command handler only hold weak
//! references, so dropping the bridge releases everything it acquired.

use futures::FutureExt;
use hkd_core::events::StateChangedData;
use hkd_core::{EntityId, EntityState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, info, instrument, trace, warn};

use crate::characteristic::{characteristic_spec, CharacteristicKey, CharacteristicValue};
use crate::collaborators::{
    AccessoryBridge, CommandHandler, CommandSink, DeviceDeclaration, DeviceHandle, StateListener,
    StateSource, Subscription,
};
use crate::convert;
use crate::definition::DeviceDefinition;
use crate::error::{CollaboratorError, CommandError};

/// Lifecycle phase of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BridgePhase {
    #[default]
    Inactive,
    /// Declaring the device downstream
    Activating,
    Active,
}

/// Counters for what the bridge did with upstream and downstream traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeDiagnostics {
    /// Values published downstream
    pub pushes: u64,
    /// Values not published because they matched the last published one
    pub skipped_unchanged: u64,
    /// Upstream values that could not be converted
    pub conversion_failures: u64,
    /// Pushes the accessory bridge refused
    pub failed_pushes: u64,
    /// Controller writes that were not forwarded or failed upstream
    pub rejected_commands: u64,
    /// Notifications that arrived while the bridge was not active
    pub ignored_notifications: u64,
}

pub struct AggregationBridge {
    shared: Arc<Shared>,
}

struct Shared {
    definition: DeviceDefinition,
    source: Arc<dyn StateSource>,
    accessories: Arc<dyn AccessoryBridge>,
    commands: Arc<dyn CommandSink>,
    runtime: Mutex<Runtime>,
}

#[derive(Default)]
struct Runtime {
    phase: BridgePhase,
    device: Option<DeviceHandle>,
    reverse_index: HashMap<EntityId, Vec<CharacteristicKey>>,
    last_values: HashMap<CharacteristicKey, CharacteristicValue>,
    subscriptions: Vec<Subscription>,
    diagnostics: BridgeDiagnostics,
}

impl AggregationBridge {
    pub fn new(
        definition: DeviceDefinition,
        source: Arc<dyn StateSource>,
        accessories: Arc<dyn AccessoryBridge>,
        commands: Arc<dyn CommandSink>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                definition,
                source,
                accessories,
                commands,
                runtime: Mutex::new(Runtime::default()),
            }),
        }
    }

    pub fn definition(&self) -> &DeviceDefinition {
        &self.shared.definition
    }

    pub fn phase(&self) -> BridgePhase {
        self.shared.phase()
    }

    pub fn is_active(&self) -> bool {
        self.phase() == BridgePhase::Active
    }

    /// Downstream handle while the device is declared
    pub fn device(&self) -> Option<DeviceHandle> {
        self.shared.runtime().device
    }

    pub fn diagnostics(&self) -> BridgeDiagnostics {
        self.shared.runtime().diagnostics
    }

    /// Entities with a live subscription
    pub fn subscribed_entities(&self) -> Vec<EntityId> {
        self.shared
            .runtime()
            .subscriptions
            .iter()
            .map(|s| s.entity_id().clone())
            .collect()
    }

    /// Last value successfully published for `key`
    pub fn last_value(&self, key: CharacteristicKey) -> Option<CharacteristicValue> {
        self.shared.runtime().last_values.get(&key).cloned()
    }

    /// Declare the device, subscribe to its entities and publish their
    /// current values
    ///
    /// Activating an active bridge does nothing. Entities whose
    /// subscription fails are skipped; they are picked up again on the
    /// next activation.
    #[instrument(skip(self), fields(device = %self.shared.definition.name()))]
    pub async fn activate(&self) -> Result<(), CollaboratorError> {
        {
            let mut runtime = self.shared.runtime();
            if runtime.phase != BridgePhase::Inactive {
                debug!(phase = ?runtime.phase, "Already activated");
                return Ok(());
            }
            runtime.phase = BridgePhase::Activating;
        }

        let declaration = self.shared.declaration();
        let handler = self.shared.command_handler();
        let device = match self
            .shared
            .accessories
            .declare_device(declaration, Some(handler))
            .await
        {
            Ok(device) => device,
            Err(err) => {
                warn!(error = %err, "Failed to declare device");
                self.shared.runtime().phase = BridgePhase::Inactive;
                return Err(err);
            }
        };

        let cancelled = {
            let mut runtime = self.shared.runtime();
            if runtime.phase == BridgePhase::Activating {
                runtime.phase = BridgePhase::Active;
                runtime.device = Some(device);
                runtime.reverse_index = self.shared.definition.reverse_index();
                false
            } else {
                true
            }
        };
        if cancelled {
            debug!(device = %device, "Deactivated while declaring, removing device");
            if let Err(err) = self.shared.accessories.remove_device(device).await {
                warn!(device = %device, error = %err, "Failed to remove device");
            }
            return Ok(());
        }

        let entity_ids: Vec<EntityId> = self
            .shared
            .definition
            .entity_ids()
            .into_iter()
            .cloned()
            .collect();

        let mut subscriptions = Vec::with_capacity(entity_ids.len());
        for entity_id in &entity_ids {
            match self.shared.source.track(entity_id, self.shared.listener()) {
                Ok(subscription) => subscriptions.push(subscription),
                Err(err) => {
                    warn!(entity_id = %entity_id, error = %err, "Failed to subscribe, skipping entity")
                }
            }
        }

        let subscribed = subscriptions.len();
        let leftover = {
            let mut runtime = self.shared.runtime();
            if runtime.phase == BridgePhase::Active {
                runtime.subscriptions = subscriptions;
                None
            } else {
                Some(subscriptions)
            }
        };
        if let Some(leftover) = leftover {
            debug!("Deactivated while subscribing");
            drop(leftover);
            return Ok(());
        }

        info!(
            device = %device,
            entities = entity_ids.len(),
            subscribed,
            "Aggregated device active"
        );

        for entity_id in &entity_ids {
            match self.shared.source.read(entity_id) {
                Some(state) => self.shared.process(entity_id, &state).await,
                None => trace!(entity_id = %entity_id, "No current state yet"),
            }
        }

        Ok(())
    }

    /// Release every subscription and remove the device downstream
    ///
    /// Safe to call on a bridge that is not active.
    #[instrument(skip(self), fields(device = %self.shared.definition.name()))]
    pub async fn deactivate(&self) {
        let (subscriptions, device) = {
            let mut runtime = self.shared.runtime();
            match runtime.phase {
                BridgePhase::Inactive => {
                    trace!("Not active");
                    return;
                }
                BridgePhase::Activating => {
                    runtime.phase = BridgePhase::Inactive;
                    return;
                }
                BridgePhase::Active => {}
            }
            runtime.phase = BridgePhase::Inactive;
            runtime.reverse_index.clear();
            runtime.last_values.clear();
            (
                std::mem::take(&mut runtime.subscriptions),
                runtime.device.take(),
            )
        };

        let released = subscriptions.len();
        drop(subscriptions);

        if let Some(device) = device {
            if let Err(err) = self.shared.accessories.remove_device(device).await {
                warn!(device = %device, error = %err, "Failed to remove device");
            }
        }
        info!(released, "Aggregated device deactivated");
    }

    /// Publish the value an upstream change implies for each bound
    /// characteristic
    pub async fn handle_state_change(&self, change: StateChangedData) {
        self.shared.handle_state_change(change).await
    }

    /// Forward a controller write to the entity bound to `key`
    pub async fn handle_command(
        &self,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), CommandError> {
        self.shared.handle_command(key, value).await
    }
}

impl Drop for AggregationBridge {
    fn drop(&mut self) {
        let subscriptions = {
            let mut runtime = self.shared.runtime();
            if runtime.phase == BridgePhase::Inactive {
                return;
            }
            debug!(
                device = %self.shared.definition.name(),
                "Bridge dropped while active, releasing subscriptions"
            );
            runtime.phase = BridgePhase::Inactive;
            std::mem::take(&mut runtime.subscriptions)
        };
        drop(subscriptions);
    }
}

impl Shared {
    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> BridgePhase {
        self.runtime().phase
    }

    fn record(&self, update: impl FnOnce(&mut BridgeDiagnostics)) {
        update(&mut self.runtime().diagnostics);
    }

    fn declaration(&self) -> DeviceDeclaration {
        let definition = &self.definition;
        DeviceDeclaration {
            name: definition.name().to_string(),
            kind: definition.kind(),
            category: definition.kind().category(),
            characteristics: definition
                .characteristics()
                .into_iter()
                .map(|(key, _)| (key, characteristic_spec(key.role)))
                .collect(),
        }
    }

    fn listener(self: &Arc<Self>) -> StateListener {
        let shared: Weak<Shared> = Arc::downgrade(self);
        Arc::new(move |change: StateChangedData| {
            let shared = shared.clone();
            async move {
                if let Some(shared) = shared.upgrade() {
                    shared.handle_state_change(change).await;
                }
            }
            .boxed()
        })
    }

    fn command_handler(self: &Arc<Self>) -> CommandHandler {
        let shared: Weak<Shared> = Arc::downgrade(self);
        Arc::new(move |key: CharacteristicKey, value: CharacteristicValue| {
            let shared = shared.clone();
            async move {
                if let Some(shared) = shared.upgrade() {
                    // Failures are logged and counted by handle_command
                    let _ = shared.handle_command(key, value).await;
                }
            }
            .boxed()
        })
    }

    async fn handle_state_change(&self, change: StateChangedData) {
        let Some(new_state) = change.new_state else {
            debug!(entity_id = %change.entity_id, "Entity removed upstream, keeping last value");
            return;
        };
        self.process(&change.entity_id, &new_state).await;
    }

    async fn process(&self, entity_id: &EntityId, state: &EntityState) {
        let keys = {
            let mut runtime = self.runtime();
            if runtime.phase != BridgePhase::Active {
                runtime.diagnostics.ignored_notifications += 1;
                return;
            }
            match runtime.reverse_index.get(entity_id) {
                Some(keys) => keys.clone(),
                None => return,
            }
        };

        for key in keys {
            let converted = convert::to_characteristic(key.role, state, self.definition.options());
            match converted {
                Ok(value) => self.publish(key, value).await,
                Err(err) => {
                    warn!(
                        device = %self.definition.name(),
                        entity_id = %entity_id,
                        characteristic = %key,
                        error = %err,
                        "Dropping unconvertible upstream value"
                    );
                    self.record(|d| d.conversion_failures += 1);
                }
            }
        }
    }

    async fn publish(&self, key: CharacteristicKey, value: CharacteristicValue) {
        let device = {
            let mut runtime = self.runtime();
            if runtime.phase != BridgePhase::Active {
                return;
            }
            if runtime.last_values.get(&key) == Some(&value) {
                runtime.diagnostics.skipped_unchanged += 1;
                trace!(characteristic = %key, "Value unchanged");
                return;
            }
            match runtime.device {
                Some(device) => device,
                None => return,
            }
        };

        let pushed = self.accessories.push(device, key, value.clone()).await;
        match pushed {
            Ok(()) => {
                debug!(device = %device, characteristic = %key, value = ?value, "Published value");
                let mut runtime = self.runtime();
                runtime.diagnostics.pushes += 1;
                if runtime.phase == BridgePhase::Active {
                    runtime.last_values.insert(key, value);
                }
            }
            Err(err) => {
                warn!(device = %device, characteristic = %key, error = %err, "Failed to publish value");
                self.record(|d| d.failed_pushes += 1);
            }
        }
    }

    async fn handle_command(
        &self,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), CommandError> {
        let result = self.dispatch(key, value).await;
        if let Err(err) = &result {
            warn!(
                device = %self.definition.name(),
                characteristic = %key,
                error = %err,
                "Rejected command"
            );
            self.record(|d| d.rejected_commands += 1);
        }
        result
    }

    async fn dispatch(
        &self,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), CommandError> {
        if self.phase() != BridgePhase::Active {
            return Err(CommandError::Inactive);
        }
        let entity_id = self
            .definition
            .entity_for(key)
            .ok_or(CommandError::UnboundRole(key))?;
        if !characteristic_spec(key.role).writable {
            return Err(CommandError::ReadOnly(key.role));
        }

        let command = convert::to_command(key.role, entity_id, &value)?;
        debug!(characteristic = %key, command = ?command, "Forwarding command");
        self.commands.send(command).await?;
        Ok(())
    }
}
