//! HAP accessory model
//!
//! An [`Accessory`] is built from a [`DeviceDeclaration`]: an information
//! service first, then one service per HomeKit service type the device's
//! characteristics belong to. Instance ids are assigned in order from 1.

use hkd_aggregator::{
    CharacteristicKey, CharacteristicSpec, CharacteristicValue, DeviceDeclaration, DeviceKind,
    Format, Role,
};
use serde::Serialize;

/// Accessory id of the bridge itself
pub const BRIDGE_AID: u64 = 1;

/// Accessory id given to the first bridged device
pub const FIRST_AID: u64 = 2;

pub const MANUFACTURER: &str = "HomeKit Device";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ServiceType {
    AccessoryInformation,
    AirPurifier,
    AirQualitySensor,
    ContactSensor,
    Fan,
    FilterMaintenance,
    GarageDoorOpener,
    HumidifierDehumidifier,
    Lightbulb,
    MotionSensor,
    SecuritySystem,
    Switch,
    Thermostat,
}

/// Main service of a device kind
pub fn primary_service(kind: DeviceKind) -> ServiceType {
    match kind {
        DeviceKind::Kettle | DeviceKind::Thermostat => ServiceType::Thermostat,
        DeviceKind::Fan => ServiceType::Fan,
        DeviceKind::Light => ServiceType::Lightbulb,
        DeviceKind::Humidifier => ServiceType::HumidifierDehumidifier,
        DeviceKind::AirPurifier => ServiceType::AirPurifier,
        DeviceKind::GarageDoor => ServiceType::GarageDoorOpener,
        DeviceKind::SecuritySystem => ServiceType::SecuritySystem,
    }
}

/// Service a role's characteristic is published under
pub fn service_type_for(kind: DeviceKind, role: Role) -> ServiceType {
    match role {
        Role::Power if matches!(kind, DeviceKind::Kettle | DeviceKind::GarageDoor) => {
            ServiceType::Switch
        }
        Role::LightSwitch => ServiceType::Lightbulb,
        Role::Motion => ServiceType::MotionSensor,
        Role::SecuritySensor => ServiceType::ContactSensor,
        Role::Siren => ServiceType::Switch,
        Role::AirQuality | Role::Pm25 | Role::Voc => ServiceType::AirQualitySensor,
        Role::FilterLife => ServiceType::FilterMaintenance,
        _ => primary_service(kind),
    }
}

#[derive(Debug, Clone)]
pub struct Characteristic {
    pub iid: u64,
    /// `None` for accessory information characteristics
    pub key: Option<CharacteristicKey>,
    pub spec: CharacteristicSpec,
    pub value: Option<CharacteristicValue>,
}

#[derive(Debug, Clone)]
pub struct Service {
    pub iid: u64,
    pub service_type: ServiceType,
    /// Distinguishes repeated services of one type, e.g. contact sensors
    pub subtype: u16,
    pub characteristics: Vec<Characteristic>,
}

#[derive(Debug, Clone)]
pub struct Accessory {
    pub aid: u64,
    pub name: String,
    pub kind: DeviceKind,
    pub category: u16,
    pub services: Vec<Service>,
}

impl Accessory {
    pub fn build(aid: u64, declaration: &DeviceDeclaration) -> Self {
        let mut next_iid = 1u64;
        let mut iid = || {
            let id = next_iid;
            next_iid += 1;
            id
        };

        let info_iid = iid();
        let information = [
            ("Name", declaration.name.clone()),
            ("Manufacturer", MANUFACTURER.to_string()),
            ("Model", declaration.kind.as_str().to_string()),
            ("SerialNumber", format!("hkd-{}", aid)),
        ]
        .into_iter()
        .map(|(name, value)| Characteristic {
            iid: iid(),
            key: None,
            spec: information_spec(name),
            value: Some(CharacteristicValue::Text(value)),
        })
        .collect();

        let mut services = vec![Service {
            iid: info_iid,
            service_type: ServiceType::AccessoryInformation,
            subtype: 0,
            characteristics: information,
        }];

        for (key, spec) in &declaration.characteristics {
            let service_type = service_type_for(declaration.kind, key.role);
            let subtype = if key.role.is_repeatable() { key.index } else { 0 };

            let position = services
                .iter()
                .position(|s| s.service_type == service_type && s.subtype == subtype);
            let position = match position {
                Some(position) => position,
                None => {
                    services.push(Service {
                        iid: iid(),
                        service_type,
                        subtype,
                        characteristics: Vec::new(),
                    });
                    services.len() - 1
                }
            };

            services[position].characteristics.push(Characteristic {
                iid: iid(),
                key: Some(*key),
                spec: spec.clone(),
                value: None,
            });
        }

        Self {
            aid,
            name: declaration.name.clone(),
            kind: declaration.kind,
            category: declaration.category,
            services,
        }
    }

    pub fn service(&self, service_type: ServiceType) -> Option<&Service> {
        self.services.iter().find(|s| s.service_type == service_type)
    }

    pub fn characteristic(&self, key: CharacteristicKey) -> Option<&Characteristic> {
        self.services
            .iter()
            .flat_map(|s| s.characteristics.iter())
            .find(|c| c.key == Some(key))
    }

    pub fn characteristic_mut(&mut self, key: CharacteristicKey) -> Option<&mut Characteristic> {
        self.services
            .iter_mut()
            .flat_map(|s| s.characteristics.iter_mut())
            .find(|c| c.key == Some(key))
    }
}

fn information_spec(name: &'static str) -> CharacteristicSpec {
    CharacteristicSpec {
        name,
        format: Format::Text,
        unit: None,
        min: None,
        max: None,
        step: None,
        valid_values: &[],
        writable: false,
    }
}
