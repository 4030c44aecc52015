//! Test harness for aggregation tests
//!
//! [`TestHub`] is an isolated hub with captured service calls, and
//! [`RecordingAccessories`] stands in for the accessory bridge, recording
//! every declaration and push and letting tests play controller writes.

#![allow(dead_code)]

use async_trait::async_trait;
use hkd_aggregator::{
    AccessoryBridge, CharacteristicKey, CharacteristicValue, CollaboratorError, CommandHandler,
    CommandSink, DeviceDeclaration, DeviceHandle, HubCommandSink, HubStateSource, StateSource,
};
use hkd_core::{Context, EntityId, EntityState, ServiceCall};
use hkd_hub::{register_default_services, ServiceRegistry, StateHub};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A hub with the default services and captured service calls
pub struct TestHub {
    pub states: Arc<StateHub>,
    pub services: Arc<ServiceRegistry>,
    captured_service_calls: Arc<Mutex<Vec<ServiceCall>>>,
}

impl TestHub {
    pub fn new() -> Self {
        let states = Arc::new(StateHub::new());
        let services = Arc::new(ServiceRegistry::new());
        register_default_services(&services, states.clone());

        Self {
            states,
            services,
            captured_service_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn set_state(
        &self,
        entity_id: &str,
        state: &str,
        attributes: HashMap<String, serde_json::Value>,
    ) -> EntityState {
        let entity_id: EntityId = entity_id.parse().expect("Invalid entity_id");
        self.states.set(entity_id, state, attributes, Context::new())
    }

    pub fn set(&self, entity_id: &str, state: &str) -> EntityState {
        self.set_state(entity_id, state, HashMap::new())
    }

    pub fn assert_state(&self, entity_id: &str, expected: &str) {
        let state = self.states.get_state(entity_id);
        assert_eq!(
            state.as_deref(),
            Some(expected),
            "Expected entity {} to be in state '{}', but was {:?}",
            entity_id,
            expected,
            state
        );
    }

    /// Replace a service with one that only records its calls
    pub fn capture_service(&self, domain: &str, service: &str) {
        let captured = self.captured_service_calls.clone();
        self.services.register(domain, service, move |call: ServiceCall| {
            let captured = captured.clone();
            async move {
                captured.lock().unwrap().push(call);
                Ok(())
            }
        });
    }

    pub fn captured_service_calls(&self) -> Vec<ServiceCall> {
        self.captured_service_calls.lock().unwrap().clone()
    }

    pub fn listener_count(&self, entity_id: &str) -> usize {
        self.states
            .listener_count(&entity_id.parse().expect("Invalid entity_id"))
    }

    pub fn source(&self) -> Arc<dyn StateSource> {
        Arc::new(HubStateSource::new(self.states.clone()))
    }

    pub fn commands(&self) -> Arc<dyn CommandSink> {
        Arc::new(HubCommandSink::new(self.services.clone()))
    }
}

impl Default for TestHub {
    fn default() -> Self {
        Self::new()
    }
}

/// Accessory bridge that records what it is told
#[derive(Default)]
pub struct RecordingAccessories {
    next_device: AtomicU64,
    declarations: Mutex<Vec<DeviceDeclaration>>,
    handlers: Mutex<HashMap<DeviceHandle, CommandHandler>>,
    pushes: Mutex<Vec<(DeviceHandle, CharacteristicKey, CharacteristicValue)>>,
    removed: Mutex<Vec<DeviceHandle>>,
}

impl RecordingAccessories {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn declarations(&self) -> Vec<DeviceDeclaration> {
        self.declarations.lock().unwrap().clone()
    }

    pub fn pushes(&self) -> Vec<(CharacteristicKey, CharacteristicValue)> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, key, value)| (*key, value.clone()))
            .collect()
    }

    pub fn pushes_for(&self, key: impl Into<CharacteristicKey>) -> Vec<CharacteristicValue> {
        let key = key.into();
        self.pushes()
            .into_iter()
            .filter(|(k, _)| *k == key)
            .map(|(_, value)| value)
            .collect()
    }

    pub fn removed(&self) -> Vec<DeviceHandle> {
        self.removed.lock().unwrap().clone()
    }

    /// Play a controller write through the device's command handler
    pub async fn write(
        &self,
        device: DeviceHandle,
        key: impl Into<CharacteristicKey>,
        value: CharacteristicValue,
    ) {
        let handler = self
            .handlers
            .lock()
            .unwrap()
            .get(&device)
            .cloned()
            .expect("device has no command handler");
        handler(key.into(), value).await;
    }
}

#[async_trait]
impl AccessoryBridge for RecordingAccessories {
    async fn declare_device(
        &self,
        declaration: DeviceDeclaration,
        commands: Option<CommandHandler>,
    ) -> Result<DeviceHandle, CollaboratorError> {
        let device = DeviceHandle(self.next_device.fetch_add(1, Ordering::SeqCst) + 2);
        self.declarations.lock().unwrap().push(declaration);
        if let Some(commands) = commands {
            self.handlers.lock().unwrap().insert(device, commands);
        }
        Ok(device)
    }

    async fn push(
        &self,
        device: DeviceHandle,
        key: CharacteristicKey,
        value: CharacteristicValue,
    ) -> Result<(), CollaboratorError> {
        self.pushes.lock().unwrap().push((device, key, value));
        Ok(())
    }

    async fn remove_device(&self, device: DeviceHandle) -> Result<(), CollaboratorError> {
        self.handlers.lock().unwrap().remove(&device);
        self.removed.lock().unwrap().push(device);
        Ok(())
    }
}

/// Poll `condition` until it holds or a second has passed
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(1);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Give spawned listeners time to run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
