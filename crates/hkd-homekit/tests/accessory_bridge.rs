//! Hub entities exposed as HomeKit accessories, both directions

use hkd_aggregator::{
    AggregationBridge, CharacteristicKey, CharacteristicValue, DeviceDefinition, DeviceKind,
    HubCommandSink, HubStateSource, Role,
};
use hkd_core::{Context, EntityId};
use hkd_homekit::{AccessoryDriver, ServiceType};
use hkd_hub::{register_default_services, ServiceRegistry, StateHub};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

struct Harness {
    states: Arc<StateHub>,
    driver: Arc<AccessoryDriver>,
    bridge: AggregationBridge,
}

fn harness(definition: DeviceDefinition) -> Harness {
    let states = Arc::new(StateHub::new());
    let services = Arc::new(ServiceRegistry::new());
    register_default_services(&services, states.clone());
    let driver = Arc::new(AccessoryDriver::new());

    let bridge = AggregationBridge::new(
        definition,
        Arc::new(HubStateSource::new(states.clone())),
        driver.clone(),
        Arc::new(HubCommandSink::new(services)),
    );
    Harness {
        states,
        driver,
        bridge,
    }
}

fn set(states: &StateHub, entity_id: &str, state: &str) {
    let entity_id: EntityId = entity_id.parse().unwrap();
    states.set(entity_id, state, HashMap::new(), Context::new());
}

async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

fn kettle() -> DeviceDefinition {
    DeviceDefinition::builder("Kettle", DeviceKind::Kettle)
        .bind(Role::Power, "switch.kettle".parse().unwrap())
        .bind(Role::CurrentTemperature, "sensor.kettle_temperature".parse().unwrap())
        .bind(Role::Countdown, "sensor.kettle_countdown".parse().unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_kettle_accessory() {
    let h = harness(kettle());
    set(&h.states, "switch.kettle", "on");
    assert_ok!(h.bridge.activate().await);

    let aid = h.bridge.device().unwrap().0;
    let accessory = h.driver.accessory(aid).unwrap();
    assert_eq!(accessory.category, 27);
    assert!(accessory.service(ServiceType::Switch).is_some());
    assert!(accessory.service(ServiceType::Thermostat).is_some());

    assert_eq!(
        h.driver.value(aid, Role::Power.into()),
        Some(CharacteristicValue::Bool(true))
    );

    let mut events = h.driver.subscribe_events();
    set(&h.states, "sensor.kettle_temperature", "72.3");
    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.key, CharacteristicKey::new(Role::CurrentTemperature));
    assert_eq!(event.value, CharacteristicValue::Float(72.3));

    set(&h.states, "sensor.kettle_countdown", "4.6");
    let countdown = CharacteristicKey::new(Role::Countdown);
    assert!(wait_for(|| h.driver.value(aid, countdown).is_some()).await);
    assert_eq!(h.driver.value(aid, countdown), Some(CharacteristicValue::Int(5)));
}

#[tokio::test]
async fn test_controller_write_reaches_hub() {
    let h = harness(kettle());
    set(&h.states, "switch.kettle", "on");
    assert_ok!(h.bridge.activate().await);
    let aid = h.bridge.device().unwrap().0;

    assert_ok!(
        h.driver
            .write(aid, Role::Power.into(), CharacteristicValue::Bool(false))
            .await
    );
    assert_eq!(h.states.get_state("switch.kettle").as_deref(), Some("off"));

    // The new state comes back around to the accessory
    assert!(
        wait_for(|| h.driver.value(aid, Role::Power.into()) == Some(CharacteristicValue::Bool(false)))
            .await
    );
}

#[tokio::test]
async fn test_deactivate_removes_accessory() {
    let h = harness(kettle());
    assert_ok!(h.bridge.activate().await);
    assert_eq!(h.driver.accessory_count(), 1);

    h.bridge.deactivate().await;
    assert_eq!(h.driver.accessory_count(), 0);

    // Reactivation declares a fresh accessory
    assert_ok!(h.bridge.activate().await);
    assert_eq!(h.driver.accessory_ids(), vec![3]);
}

#[tokio::test]
async fn test_security_system_sensors() {
    let definition = DeviceDefinition::builder("House", DeviceKind::SecuritySystem)
        .bind(Role::AlarmState, "alarm_control_panel.house".parse().unwrap())
        .bind(Role::SecuritySensor, "binary_sensor.front_door".parse().unwrap())
        .bind(Role::SecuritySensor, "binary_sensor.back_door".parse().unwrap())
        .build()
        .unwrap();
    let h = harness(definition);
    set(&h.states, "alarm_control_panel.house", "armed_night");
    set(&h.states, "binary_sensor.back_door", "on");
    assert_ok!(h.bridge.activate().await);
    let aid = h.bridge.device().unwrap().0;

    let accessory = h.driver.accessory(aid).unwrap();
    let contact_sensors = accessory
        .services
        .iter()
        .filter(|s| s.service_type == ServiceType::ContactSensor)
        .count();
    assert_eq!(contact_sensors, 2);

    assert_eq!(
        h.driver.value(aid, Role::AlarmState.into()),
        Some(CharacteristicValue::Enum(2))
    );
    assert_eq!(
        h.driver.value(aid, CharacteristicKey::indexed(Role::SecuritySensor, 1)),
        Some(CharacteristicValue::Bool(true))
    );
    assert_eq!(
        h.driver.value(aid, CharacteristicKey::indexed(Role::SecuritySensor, 0)),
        None
    );
}
