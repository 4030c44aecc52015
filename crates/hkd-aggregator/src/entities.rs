//! Mirror entities exposed back to the host platform
//!
//! Each bound role that has a host platform gets one mirror entity that
//! follows its source entity. This module only plans them; registering
//! them with an entity platform is up to the host.

use hkd_core::{EntityId, EntityState, STATE_OFF, STATE_ON};
use serde::Serialize;
use std::collections::HashMap;

use crate::characteristic::CharacteristicKey;
use crate::convert::{self, vocabulary};
use crate::definition::DeviceDefinition;
use crate::Role;

/// Prefix of every mirror entity's unique id
pub const UNIQUE_ID_PREFIX: &str = "homekit_device";

/// Host platform a mirror entity belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Switch,
    Sensor,
    BinarySensor,
    Number,
    Select,
    Light,
}

impl Platform {
    fn is_binary(self) -> bool {
        matches!(self, Platform::Switch | Platform::BinarySensor | Platform::Light)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumberRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

/// A planned mirror entity
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SynthesizedEntity {
    pub platform: Platform,
    pub role: Role,
    pub name: String,
    pub unique_id: String,
    pub source: EntityId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<NumberRange>,
}

struct MirrorSpec {
    platform: Platform,
    suffix: &'static str,
    unit: Option<&'static str>,
}

const fn mirror(platform: Platform, suffix: &'static str, unit: Option<&'static str>) -> MirrorSpec {
    MirrorSpec {
        platform,
        suffix,
        unit,
    }
}

fn mirror_spec(role: Role) -> Option<MirrorSpec> {
    use Platform::*;

    let spec = match role {
        Role::Power => mirror(Switch, "Power", None),
        Role::Oscillation => mirror(Switch, "Oscillation", None),
        Role::Siren => mirror(Switch, "Siren", None),
        Role::StatusSensor => mirror(Sensor, "Status", None),
        Role::CurrentTemperature => mirror(Sensor, "Temperature", Some("°C")),
        Role::Countdown => mirror(Sensor, "Countdown", Some("min")),
        Role::Fault => mirror(Sensor, "Fault", None),
        Role::CurrentHumidity => mirror(Sensor, "Humidity", Some("%")),
        Role::WaterLevel => mirror(Sensor, "Water Level", Some("%")),
        Role::AirQuality => mirror(Sensor, "Air Quality", None),
        Role::FilterLife => mirror(Sensor, "Filter Life", Some("%")),
        Role::Pm25 => mirror(Sensor, "PM2.5", Some("µg/m³")),
        Role::Voc => mirror(Sensor, "VOC", Some("ppb")),
        Role::TargetTemperature => mirror(Number, "Target Temperature", Some("°C")),
        Role::KeepWarm => mirror(Select, "Keep Warm", None),
        Role::Direction => mirror(Select, "Direction", None),
        Role::Obstruction => mirror(BinarySensor, "Obstruction", None),
        Role::Motion => mirror(BinarySensor, "Motion", None),
        Role::SecuritySensor => mirror(BinarySensor, "Sensor", None),
        Role::LightSwitch => mirror(Light, "Light", None),
        _ => return None,
    };
    Some(spec)
}

/// Plan the mirror entities of one config entry
///
/// A source mirrored once keeps the plain `<prefix>_<entry>_<source>` unique
/// id; a source mirrored under several roles gets the role's config key
/// appended so every id stays distinct.
pub fn synthesized_entities(entry_id: &str, definition: &DeviceDefinition) -> Vec<SynthesizedEntity> {
    let mirrored: Vec<_> = definition
        .characteristics()
        .into_iter()
        .filter_map(|(key, source)| Some((key, source, mirror_spec(key.role)?)))
        .collect();

    let mut uses: HashMap<&EntityId, usize> = HashMap::new();
    for (_, source, _) in &mirrored {
        *uses.entry(*source).or_default() += 1;
    }

    mirrored
        .into_iter()
        .map(|(key, source, spec)| {
            let name = if key.role.is_repeatable() {
                format!("{} {} {}", definition.name(), spec.suffix, u32::from(key.index) + 1)
            } else {
                format!("{} {}", definition.name(), spec.suffix)
            };
            let unique_id = if uses.get(source).copied().unwrap_or(0) > 1 {
                format!("{}_{}_{}_{}", UNIQUE_ID_PREFIX, entry_id, source, id_suffix(key))
            } else {
                format!("{}_{}_{}", UNIQUE_ID_PREFIX, entry_id, source)
            };
            let options = match spec.platform {
                Platform::Select => vocabulary(key.role)
                    .map(|v| v.tokens().collect())
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            let range = match spec.platform {
                Platform::Number => Some(NumberRange {
                    min: 0.0,
                    max: 100.0,
                    step: 1.0,
                }),
                _ => None,
            };

            SynthesizedEntity {
                platform: spec.platform,
                role: key.role,
                name,
                unique_id,
                source: source.clone(),
                unit: spec.unit,
                options,
                range,
            }
        })
        .collect()
}

fn id_suffix(key: CharacteristicKey) -> String {
    if key.role.is_repeatable() {
        format!("{}_{}", key.role.config_key(), key.index)
    } else {
        key.role.config_key().to_string()
    }
}

/// State a mirror entity shows for its source's `state`
///
/// Returns `None` while the source is unavailable or unknown.
pub fn mirrored_state(entity: &SynthesizedEntity, state: &EntityState) -> Option<String> {
    if state.is_unavailable() || state.is_unknown() {
        return None;
    }
    if entity.platform.is_binary() {
        let on = convert::is_on(&state.state);
        return Some(if on { STATE_ON } else { STATE_OFF }.to_string());
    }
    Some(state.state.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceKind;
    use std::collections::HashSet;
    use hkd_core::Context;

    fn id(raw: &str) -> EntityId {
        raw.parse().unwrap()
    }

    #[test]
    fn test_kettle_entities() {
        let definition = DeviceDefinition::builder("Kettle", DeviceKind::Kettle)
            .bind(Role::Power, id("switch.kettle"))
            .bind(Role::CurrentTemperature, id("sensor.kettle_temperature"))
            .bind(Role::TargetTemperature, id("number.kettle_target"))
            .bind(Role::KeepWarm, id("select.kettle_keep_warm"))
            .bind(Role::KeepWarmTime, id("number.kettle_keep_warm_time"))
            .build()
            .unwrap();

        let entities = synthesized_entities("abc123", &definition);
        // KeepWarmTime has no mirror
        assert_eq!(entities.len(), 4);

        let power = &entities[0];
        assert_eq!(power.platform, Platform::Switch);
        assert_eq!(power.name, "Kettle Power");
        assert_eq!(power.unique_id, "homekit_device_abc123_switch.kettle");

        let temperature = entities
            .iter()
            .find(|e| e.role == Role::CurrentTemperature)
            .unwrap();
        assert_eq!(temperature.name, "Kettle Temperature");
        assert_eq!(temperature.unit, Some("°C"));

        let keep_warm = entities.iter().find(|e| e.role == Role::KeepWarm).unwrap();
        assert_eq!(keep_warm.platform, Platform::Select);
        assert_eq!(keep_warm.options, vec!["Off", "30min", "60min", "90min", "120min"]);

        let target = entities
            .iter()
            .find(|e| e.role == Role::TargetTemperature)
            .unwrap();
        assert_eq!(
            target.range,
            Some(NumberRange {
                min: 0.0,
                max: 100.0,
                step: 1.0
            })
        );
    }

    #[test]
    fn test_security_sensor_names() {
        let definition = DeviceDefinition::builder("House", DeviceKind::SecuritySystem)
            .bind(Role::AlarmState, id("alarm_control_panel.house"))
            .bind(Role::SecuritySensor, id("binary_sensor.front"))
            .bind(Role::SecuritySensor, id("binary_sensor.back"))
            .build()
            .unwrap();

        let names: Vec<_> = synthesized_entities("e1", &definition)
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["House Sensor 1", "House Sensor 2"]);
    }

    #[test]
    fn test_shared_source_gets_distinct_ids() {
        let definition = DeviceDefinition::builder("Kettle", DeviceKind::Kettle)
            .bind(Role::Power, id("switch.kettle"))
            .bind(Role::CurrentTemperature, id("sensor.kettle_temperature"))
            .bind(Role::StatusSensor, id("sensor.kettle_temperature"))
            .build()
            .unwrap();

        let entities = synthesized_entities("e1", &definition);
        let ids: HashSet<_> = entities.iter().map(|e| e.unique_id.as_str()).collect();
        assert_eq!(ids.len(), entities.len());

        let power = entities.iter().find(|e| e.role == Role::Power).unwrap();
        assert_eq!(power.unique_id, "homekit_device_e1_switch.kettle");
        let temperature = entities
            .iter()
            .find(|e| e.role == Role::CurrentTemperature)
            .unwrap();
        assert_eq!(
            temperature.unique_id,
            "homekit_device_e1_sensor.kettle_temperature_current_temperature"
        );
    }

    #[test]
    fn test_repeated_security_sensor_ids() {
        let definition = DeviceDefinition::builder("House", DeviceKind::SecuritySystem)
            .bind(Role::AlarmState, id("alarm_control_panel.house"))
            .bind(Role::SecuritySensor, id("binary_sensor.front"))
            .bind(Role::SecuritySensor, id("binary_sensor.front"))
            .build()
            .unwrap();

        let ids: Vec<_> = synthesized_entities("e1", &definition)
            .into_iter()
            .map(|e| e.unique_id)
            .collect();
        assert_eq!(
            ids,
            vec![
                "homekit_device_e1_binary_sensor.front_sensors_0",
                "homekit_device_e1_binary_sensor.front_sensors_1",
            ]
        );
    }

    #[test]
    fn test_mirrored_state() {
        let definition = DeviceDefinition::builder("Garage", DeviceKind::GarageDoor)
            .bind(Role::Power, id("switch.garage"))
            .bind(Role::Motion, id("binary_sensor.garage_motion"))
            .build()
            .unwrap();
        let entities = synthesized_entities("e1", &definition);
        let motion = entities.iter().find(|e| e.role == Role::Motion).unwrap();

        let state = |raw: &str| {
            EntityState::new(id("binary_sensor.garage_motion"), raw, HashMap::new(), Context::new())
        };
        assert_eq!(mirrored_state(motion, &state("on")).as_deref(), Some("on"));
        assert_eq!(mirrored_state(motion, &state("detected")).as_deref(), Some("off"));
        assert_eq!(mirrored_state(motion, &state("unavailable")), None);
    }
}
