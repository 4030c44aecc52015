//! Roles an upstream entity can play inside an aggregated device

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a role's raw upstream state is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoleShape {
    /// `on` means true, anything else false
    Boolean,
    /// Raw state parsed as a float
    Numeric,
    /// Raw state looked up in the role's vocabulary table
    Enumerated,
    /// Hue and saturation read from the state attributes
    Color,
    /// Raw state passed through as text
    Text,
}

/// A semantic slot of an aggregated device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Power,
    CurrentTemperature,
    TargetTemperature,
    Countdown,
    Fault,
    KeepWarm,
    KeepWarmTime,
    Speed,
    Oscillation,
    Direction,
    Brightness,
    ColorTemperature,
    RgbColor,
    CurrentHumidity,
    TargetHumidity,
    WaterLevel,
    AirQuality,
    FilterLife,
    Pm25,
    Voc,
    DoorPosition,
    Obstruction,
    Motion,
    LightSwitch,
    AlarmState,
    SecuritySensor,
    Siren,
    StatusSensor,
}

impl Role {
    pub const ALL: [Role; 28] = [
        Role::Power,
        Role::CurrentTemperature,
        Role::TargetTemperature,
        Role::Countdown,
        Role::Fault,
        Role::KeepWarm,
        Role::KeepWarmTime,
        Role::Speed,
        Role::Oscillation,
        Role::Direction,
        Role::Brightness,
        Role::ColorTemperature,
        Role::RgbColor,
        Role::CurrentHumidity,
        Role::TargetHumidity,
        Role::WaterLevel,
        Role::AirQuality,
        Role::FilterLife,
        Role::Pm25,
        Role::Voc,
        Role::DoorPosition,
        Role::Obstruction,
        Role::Motion,
        Role::LightSwitch,
        Role::AlarmState,
        Role::SecuritySensor,
        Role::Siren,
        Role::StatusSensor,
    ];

    /// Configuration key that binds this role
    pub fn config_key(self) -> &'static str {
        match self {
            Role::Power => "power_switch",
            Role::CurrentTemperature => "current_temperature",
            Role::TargetTemperature => "target_temperature",
            Role::Countdown => "countdown_timer",
            Role::Fault => "fault_status",
            Role::KeepWarm => "keep_warm_mode",
            Role::KeepWarmTime => "keep_warm_idle_time",
            Role::Speed => "speed_control",
            Role::Oscillation => "oscillation",
            Role::Direction => "direction",
            Role::Brightness => "brightness",
            Role::ColorTemperature => "color_temperature",
            Role::RgbColor => "rgb_control",
            Role::CurrentHumidity => "current_humidity",
            Role::TargetHumidity => "target_humidity",
            Role::WaterLevel => "water_level",
            Role::AirQuality => "air_quality",
            Role::FilterLife => "filter_life",
            Role::Pm25 => "pm25",
            Role::Voc => "voc",
            Role::DoorPosition => "door_position",
            Role::Obstruction => "obstruction_detected",
            Role::Motion => "motion_sensor",
            Role::LightSwitch => "light_switch",
            Role::AlarmState => "alarm_state",
            Role::SecuritySensor => "sensors",
            Role::Siren => "siren",
            Role::StatusSensor => "status_sensor",
        }
    }

    pub fn from_config_key(key: &str) -> Option<Role> {
        Role::ALL.into_iter().find(|role| role.config_key() == key)
    }

    pub fn shape(self) -> RoleShape {
        match self {
            Role::Power
            | Role::Fault
            | Role::Oscillation
            | Role::Obstruction
            | Role::Motion
            | Role::LightSwitch
            | Role::SecuritySensor
            | Role::Siren => RoleShape::Boolean,
            Role::CurrentTemperature
            | Role::TargetTemperature
            | Role::Countdown
            | Role::KeepWarmTime
            | Role::Speed
            | Role::Brightness
            | Role::ColorTemperature
            | Role::CurrentHumidity
            | Role::TargetHumidity
            | Role::WaterLevel
            | Role::FilterLife
            | Role::Pm25
            | Role::Voc => RoleShape::Numeric,
            Role::KeepWarm
            | Role::Direction
            | Role::DoorPosition
            | Role::AlarmState
            | Role::AirQuality => RoleShape::Enumerated,
            Role::RgbColor => RoleShape::Color,
            Role::StatusSensor => RoleShape::Text,
        }
    }

    /// Whether the role binds a list of entities rather than one
    pub fn is_repeatable(self) -> bool {
        self == Role::SecuritySensor
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.config_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_keys_are_unique_and_reversible() {
        for role in Role::ALL {
            assert_eq!(Role::from_config_key(role.config_key()), Some(role));
        }
        assert_eq!(Role::from_config_key("device_type"), None);
        assert_eq!(Role::from_config_key("name"), None);
    }

    #[test]
    fn test_shapes() {
        assert_eq!(Role::Power.shape(), RoleShape::Boolean);
        assert_eq!(Role::SecuritySensor.shape(), RoleShape::Boolean);
        assert_eq!(Role::CurrentTemperature.shape(), RoleShape::Numeric);
        assert_eq!(Role::AlarmState.shape(), RoleShape::Enumerated);
        assert_eq!(Role::RgbColor.shape(), RoleShape::Color);
        assert_eq!(Role::StatusSensor.shape(), RoleShape::Text);
    }

    #[test]
    fn test_only_sensors_repeat() {
        let repeatable: Vec<_> = Role::ALL.into_iter().filter(|r| r.is_repeatable()).collect();
        assert_eq!(repeatable, vec![Role::SecuritySensor]);
    }
}
