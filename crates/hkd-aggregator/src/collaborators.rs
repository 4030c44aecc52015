//! Interfaces to the host platform and the accessory bridge
//!
//! The aggregator reads and subscribes through a [`StateSource`], publishes
//! through an [`AccessoryBridge`] and forwards controller writes through a
//! [`CommandSink`]. Implementations live elsewhere: [`crate::hub`] adapts
//! the in-process hub, and the HomeKit driver implements the bridge.

use async_trait::async_trait;
use futures::future::BoxFuture;
use hkd_core::events::StateChangedData;
use hkd_core::{EntityId, EntityState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::characteristic::{CharacteristicKey, CharacteristicSpec, CharacteristicValue};
use crate::error::CollaboratorError;
use crate::{DeviceKind, Role};

/// Callback invoked for every state change of a subscribed entity
pub type StateListener = Arc<dyn Fn(StateChangedData) -> BoxFuture<'static, ()> + Send + Sync>;

/// Callback invoked when a controller writes a characteristic
pub type CommandHandler =
    Arc<dyn Fn(CharacteristicKey, CharacteristicValue) -> BoxFuture<'static, ()> + Send + Sync>;

/// A live subscription to one upstream entity
///
/// Delivery stops when the subscription is cancelled or dropped.
pub struct Subscription {
    entity_id: EntityId,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(entity_id: EntityId, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            entity_id,
            release: Some(Box::new(release)),
        }
    }

    pub fn entity_id(&self) -> &EntityId {
        &self.entity_id
    }

    pub fn cancel(mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("entity_id", &self.entity_id)
            .field("active", &self.release.is_some())
            .finish()
    }
}

/// Upstream entity states
pub trait StateSource: Send + Sync {
    /// Deliver every future change of `entity_id` to `listener`
    fn track(
        &self,
        entity_id: &EntityId,
        listener: StateListener,
    ) -> Result<Subscription, CollaboratorError>;

    /// Current state of `entity_id`, if it exists
    fn read(&self, entity_id: &EntityId) -> Option<EntityState>;
}

/// Opaque handle of a declared downstream device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

impl fmt::Display for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device#{}", self.0)
    }
}

/// Everything the accessory bridge needs to expose a device
#[derive(Debug, Clone)]
pub struct DeviceDeclaration {
    pub name: String,
    pub kind: DeviceKind,
    pub category: u16,
    pub characteristics: Vec<(CharacteristicKey, CharacteristicSpec)>,
}

/// The downstream accessory protocol
#[async_trait]
pub trait AccessoryBridge: Send + Sync {
    /// Expose a device; `commands` receives controller writes
    async fn declare_device(
        &self,
        declaration: DeviceDeclaration,
        commands: Option<CommandHandler>,
    ) -> Result<DeviceHandle, CollaboratorError>;

    /// Publish a new characteristic value
    async fn push(
        &self,
        device: DeviceHandle,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), CollaboratorError>;

    async fn remove_device(&self, device: DeviceHandle) -> Result<(), CollaboratorError>;
}

/// A command for one upstream entity
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum UpstreamCommand {
    TurnOn {
        entity_id: EntityId,
    },
    TurnOff {
        entity_id: EntityId,
    },
    /// `role` tells the sink which attribute a numeric value is for
    SetValue {
        entity_id: EntityId,
        role: Role,
        value: f64,
    },
    SelectOption {
        entity_id: EntityId,
        option: String,
    },
    SetColor {
        entity_id: EntityId,
        hue: f64,
        saturation: f64,
    },
}

impl UpstreamCommand {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            UpstreamCommand::TurnOn { entity_id }
            | UpstreamCommand::TurnOff { entity_id }
            | UpstreamCommand::SetValue { entity_id, .. }
            | UpstreamCommand::SelectOption { entity_id, .. }
            | UpstreamCommand::SetColor { entity_id, .. } => entity_id,
        }
    }
}

/// Where controller writes are sent
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn send(&self, command: UpstreamCommand) -> Result<(), CollaboratorError>;
}
