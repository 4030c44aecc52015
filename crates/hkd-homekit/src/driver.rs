//! In-memory HAP accessory driver
//!
//! Holds the bridged accessories, their current characteristic values and
//! command handlers. Value changes are broadcast to connected controllers
//! as [`CharacteristicEvent`]s; controller writes go through [`write`].
//!
//! [`write`]: AccessoryDriver::write

use async_trait::async_trait;
use dashmap::DashMap;
use hkd_aggregator::{
    AccessoryBridge, CharacteristicKey, CharacteristicSpec, CharacteristicValue,
    CollaboratorError, CommandHandler, DeviceDeclaration, DeviceHandle, Format,
};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};

use crate::accessory::{Accessory, FIRST_AID};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    #[error("unknown accessory {0}")]
    UnknownAccessory(u64),

    #[error("accessory {aid} has no characteristic {key}")]
    UnknownCharacteristic { aid: u64, key: CharacteristicKey },

    #[error("{key} does not accept {value:?}")]
    InvalidValue {
        key: CharacteristicKey,
        value: CharacteristicValue,
    },

    #[error("{0} is read-only")]
    ReadOnly(CharacteristicKey),

    #[error("accessory {0} does not accept commands")]
    NoHandler(u64),
}

impl From<DriverError> for CollaboratorError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::UnknownAccessory(aid) => CollaboratorError::UnknownDevice(DeviceHandle(aid)),
            other => CollaboratorError::Rejected(other.to_string()),
        }
    }
}

/// A characteristic value change sent to controllers
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicEvent {
    pub aid: u64,
    pub iid: u64,
    pub key: CharacteristicKey,
    pub value: CharacteristicValue,
}

pub struct AccessoryDriver {
    accessories: DashMap<u64, Accessory>,
    handlers: DashMap<u64, CommandHandler>,
    next_aid: AtomicU64,
    events: broadcast::Sender<CharacteristicEvent>,
}

impl AccessoryDriver {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create a driver whose event channel buffers `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            accessories: DashMap::new(),
            handlers: DashMap::new(),
            next_aid: AtomicU64::new(FIRST_AID),
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CharacteristicEvent> {
        self.events.subscribe()
    }

    /// Snapshot of one accessory
    pub fn accessory(&self, aid: u64) -> Option<Accessory> {
        self.accessories.get(&aid).map(|a| a.clone())
    }

    pub fn accessory_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.accessories.iter().map(|a| *a.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn accessory_count(&self) -> usize {
        self.accessories.len()
    }

    /// Current value of a characteristic
    pub fn value(&self, aid: u64, key: CharacteristicKey) -> Option<CharacteristicValue> {
        self.accessories
            .get(&aid)?
            .characteristic(key)?
            .value
            .clone()
    }

    /// Store a value, returning whether it changed
    ///
    /// Numbers are clamped into the characteristic's range and rounded for
    /// integer formats.
    pub fn update(
        &self,
        aid: u64,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<bool, DriverError> {
        let event = {
            let mut accessory = self
                .accessories
                .get_mut(&aid)
                .ok_or(DriverError::UnknownAccessory(aid))?;
            let characteristic = accessory
                .characteristic_mut(key)
                .ok_or(DriverError::UnknownCharacteristic { aid, key })?;

            let value = normalize(&characteristic.spec, key, value)?;
            if characteristic.value.as_ref() == Some(&value) {
                return Ok(false);
            }
            characteristic.value = Some(value.clone());
            CharacteristicEvent {
                aid,
                iid: characteristic.iid,
                key,
                value,
            }
        };

        debug!(aid, characteristic = %key, value = ?event.value, "Characteristic changed");
        // No receivers just means no controller is connected
        let _ = self.events.send(event);
        Ok(true)
    }

    /// Apply a write from a controller
    ///
    /// The stored value is left alone; the device reports the outcome with
    /// its next push.
    #[instrument(skip(self, value))]
    pub async fn write(
        &self,
        aid: u64,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), DriverError> {
        let value = {
            let accessory = self
                .accessories
                .get(&aid)
                .ok_or(DriverError::UnknownAccessory(aid))?;
            let characteristic = accessory
                .characteristic(key)
                .ok_or(DriverError::UnknownCharacteristic { aid, key })?;
            if !characteristic.spec.writable {
                return Err(DriverError::ReadOnly(key));
            }
            normalize(&characteristic.spec, key, value)?
        };

        let handler = self
            .handlers
            .get(&aid)
            .map(|h| h.clone())
            .ok_or(DriverError::NoHandler(aid))?;

        debug!(value = ?value, "Controller write");
        handler(key, value).await;
        Ok(())
    }
}

impl Default for AccessoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccessoryBridge for AccessoryDriver {
    async fn declare_device(
        &self,
        declaration: DeviceDeclaration,
        commands: Option<CommandHandler>,
    ) -> Result<DeviceHandle, CollaboratorError> {
        let aid = self.next_aid.fetch_add(1, Ordering::SeqCst);
        let accessory = Accessory::build(aid, &declaration);
        info!(
            aid,
            name = %accessory.name,
            category = accessory.category,
            services = accessory.services.len(),
            "Added accessory"
        );

        self.accessories.insert(aid, accessory);
        if let Some(commands) = commands {
            self.handlers.insert(aid, commands);
        }
        Ok(DeviceHandle(aid))
    }

    async fn push(
        &self,
        device: DeviceHandle,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), CollaboratorError> {
        self.update(device.0, key, value)?;
        Ok(())
    }

    async fn remove_device(&self, device: DeviceHandle) -> Result<(), CollaboratorError> {
        self.handlers.remove(&device.0);
        match self.accessories.remove(&device.0) {
            Some((aid, accessory)) => {
                info!(aid, name = %accessory.name, "Removed accessory");
                Ok(())
            }
            None => {
                warn!(aid = device.0, "Removing unknown accessory");
                Err(DriverError::UnknownAccessory(device.0).into())
            }
        }
    }
}

fn normalize(
    spec: &CharacteristicSpec,
    key: CharacteristicKey,
    value: CharacteristicValue,
) -> Result<CharacteristicValue, DriverError> {
    let clamp = |v: f64| {
        let v = spec.min.map_or(v, |min| v.max(min));
        spec.max.map_or(v, |max| v.min(max))
    };

    let normalized = match (spec.format, &value) {
        (Format::Bool, CharacteristicValue::Bool(_)) => Some(value.clone()),
        (Format::Float, CharacteristicValue::Float(_) | CharacteristicValue::Int(_)) => value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| CharacteristicValue::Float(clamp(v))),
        (Format::Int, CharacteristicValue::Float(_) | CharacteristicValue::Int(_)) => value
            .as_f64()
            .filter(|v| v.is_finite())
            .map(|v| CharacteristicValue::Int(clamp(v).round() as i64)),
        (Format::Enum, CharacteristicValue::Enum(code)) if spec.valid_values.contains(code) => {
            Some(value.clone())
        }
        (Format::Color, CharacteristicValue::Color { hue, saturation }) => {
            Some(CharacteristicValue::Color {
                hue: hue.clamp(0.0, 360.0),
                saturation: saturation.clamp(0.0, 100.0),
            })
        }
        (Format::Text, CharacteristicValue::Text(_)) => Some(value.clone()),
        _ => None,
    };

    normalized.ok_or(DriverError::InvalidValue { key, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use hkd_aggregator::{characteristic_spec, DeviceKind, Role};
    use std::sync::{Arc, Mutex};

    fn kettle() -> DeviceDeclaration {
        let keys: [CharacteristicKey; 4] = [
            Role::Power.into(),
            Role::CurrentTemperature.into(),
            Role::Countdown.into(),
            Role::KeepWarm.into(),
        ];
        DeviceDeclaration {
            name: "Kettle".into(),
            kind: DeviceKind::Kettle,
            category: 27,
            characteristics: keys
                .iter()
                .map(|key| (*key, characteristic_spec(key.role)))
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_declare_assigns_aids() {
        let driver = AccessoryDriver::new();
        let first = driver.declare_device(kettle(), None).await.unwrap();
        let second = driver.declare_device(kettle(), None).await.unwrap();

        assert_eq!(first, DeviceHandle(2));
        assert_eq!(second, DeviceHandle(3));
        assert_eq!(driver.accessory_ids(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_push_stores_and_broadcasts_changes() {
        let driver = AccessoryDriver::new();
        let device = driver.declare_device(kettle(), None).await.unwrap();
        let mut events = driver.subscribe_events();
        let key: CharacteristicKey = Role::CurrentTemperature.into();

        driver.push(device, key, CharacteristicValue::Float(72.3)).await.unwrap();
        driver.push(device, key, CharacteristicValue::Float(72.3)).await.unwrap();

        let event = events.try_recv().unwrap();
        assert_eq!(event.value, CharacteristicValue::Float(72.3));
        assert_eq!(event.key, key);
        assert!(events.try_recv().is_err());
        assert_eq!(driver.value(2, key), Some(CharacteristicValue::Float(72.3)));
    }

    #[tokio::test]
    async fn test_push_clamps_and_rounds() {
        let driver = AccessoryDriver::new();
        let device = driver.declare_device(kettle(), None).await.unwrap();

        driver
            .push(device, Role::CurrentTemperature.into(), CharacteristicValue::Float(140.0))
            .await
            .unwrap();
        driver
            .push(device, Role::Countdown.into(), CharacteristicValue::Float(12.6))
            .await
            .unwrap();

        assert_eq!(
            driver.value(device.0, Role::CurrentTemperature.into()),
            Some(CharacteristicValue::Float(100.0))
        );
        assert_eq!(
            driver.value(device.0, Role::Countdown.into()),
            Some(CharacteristicValue::Int(13))
        );
    }

    #[tokio::test]
    async fn test_push_rejects_wrong_format() {
        let driver = AccessoryDriver::new();
        let device = driver.declare_device(kettle(), None).await.unwrap();

        let err = driver
            .push(device, Role::Power.into(), CharacteristicValue::Float(1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));

        let err = driver
            .push(device, Role::KeepWarm.into(), CharacteristicValue::Enum(7))
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::Rejected(_)));

        let err = driver
            .push(DeviceHandle(99), Role::Power.into(), CharacteristicValue::Bool(true))
            .await
            .unwrap_err();
        assert_eq!(err, CollaboratorError::UnknownDevice(DeviceHandle(99)));
    }

    #[tokio::test]
    async fn test_write_calls_handler() {
        let driver = AccessoryDriver::new();
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = received.clone();
        let handler: CommandHandler = Arc::new(move |key: CharacteristicKey, value: CharacteristicValue| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push((key, value));
            }
            .boxed()
        });
        let device = driver.declare_device(kettle(), Some(handler)).await.unwrap();

        driver
            .write(device.0, Role::Power.into(), CharacteristicValue::Bool(false))
            .await
            .unwrap();
        assert_eq!(
            received.lock().unwrap().clone(),
            vec![(CharacteristicKey::new(Role::Power), CharacteristicValue::Bool(false))]
        );

        assert_eq!(
            driver
                .write(device.0, Role::CurrentTemperature.into(), CharacteristicValue::Float(50.0))
                .await,
            Err(DriverError::ReadOnly(Role::CurrentTemperature.into()))
        );
        assert!(matches!(
            driver
                .write(device.0, Role::TargetTemperature.into(), CharacteristicValue::Float(50.0))
                .await,
            Err(DriverError::UnknownCharacteristic { .. })
        ));
        assert_eq!(received.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_write_without_handler() {
        let driver = AccessoryDriver::new();
        let device = driver.declare_device(kettle(), None).await.unwrap();
        assert_eq!(
            driver
                .write(device.0, Role::Power.into(), CharacteristicValue::Bool(true))
                .await,
            Err(DriverError::NoHandler(device.0))
        );
    }

    #[tokio::test]
    async fn test_remove_device() {
        let driver = AccessoryDriver::new();
        let device = driver.declare_device(kettle(), None).await.unwrap();

        driver.remove_device(device).await.unwrap();
        assert_eq!(driver.accessory_count(), 0);
        assert!(driver.remove_device(device).await.is_err());
        assert!(driver
            .push(device, Role::Power.into(), CharacteristicValue::Bool(true))
            .await
            .is_err());
    }
}
