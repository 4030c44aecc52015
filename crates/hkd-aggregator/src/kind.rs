//! Kinds of aggregated device

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigurationError;
use crate::Role;

/// The category of device being synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    Kettle,
    Thermostat,
    Fan,
    Light,
    Humidifier,
    AirPurifier,
    GarageDoor,
    SecuritySystem,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 8] = [
        DeviceKind::Kettle,
        DeviceKind::Thermostat,
        DeviceKind::Fan,
        DeviceKind::Light,
        DeviceKind::Humidifier,
        DeviceKind::AirPurifier,
        DeviceKind::GarageDoor,
        DeviceKind::SecuritySystem,
    ];

    /// Value of the `device_type` configuration key
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceKind::Kettle => "kettle",
            DeviceKind::Thermostat => "thermostat",
            DeviceKind::Fan => "fan",
            DeviceKind::Light => "light",
            DeviceKind::Humidifier => "humidifier",
            DeviceKind::AirPurifier => "air_purifier",
            DeviceKind::GarageDoor => "garage_door",
            DeviceKind::SecuritySystem => "security_system",
        }
    }

    /// HomeKit accessory category
    pub fn category(self) -> u16 {
        match self {
            DeviceKind::Fan => 3,
            DeviceKind::GarageDoor => 4,
            DeviceKind::Light => 5,
            DeviceKind::SecuritySystem => 7,
            DeviceKind::Thermostat => 9,
            DeviceKind::Kettle => 27,
            DeviceKind::AirPurifier => 28,
            DeviceKind::Humidifier => 29,
        }
    }

    /// The binding every device of this kind must have
    pub fn required_role(self) -> Role {
        match self {
            DeviceKind::SecuritySystem => Role::AlarmState,
            _ => Role::Power,
        }
    }

    /// Roles a device of this kind may bind, required role first
    pub fn roles(self) -> &'static [Role] {
        match self {
            DeviceKind::Kettle => &[
                Role::Power,
                Role::StatusSensor,
                Role::CurrentTemperature,
                Role::TargetTemperature,
                Role::Countdown,
                Role::Fault,
                Role::KeepWarm,
                Role::KeepWarmTime,
            ],
            DeviceKind::Thermostat => &[
                Role::Power,
                Role::StatusSensor,
                Role::CurrentTemperature,
                Role::TargetTemperature,
            ],
            DeviceKind::Fan => &[
                Role::Power,
                Role::StatusSensor,
                Role::Speed,
                Role::Oscillation,
                Role::Direction,
            ],
            DeviceKind::Light => &[
                Role::Power,
                Role::StatusSensor,
                Role::Brightness,
                Role::ColorTemperature,
                Role::RgbColor,
            ],
            DeviceKind::Humidifier => &[
                Role::Power,
                Role::StatusSensor,
                Role::CurrentHumidity,
                Role::TargetHumidity,
                Role::WaterLevel,
            ],
            DeviceKind::AirPurifier => &[
                Role::Power,
                Role::StatusSensor,
                Role::AirQuality,
                Role::FilterLife,
                Role::Pm25,
                Role::Voc,
            ],
            DeviceKind::GarageDoor => &[
                Role::Power,
                Role::StatusSensor,
                Role::DoorPosition,
                Role::Obstruction,
                Role::Motion,
                Role::LightSwitch,
            ],
            DeviceKind::SecuritySystem => &[
                Role::AlarmState,
                Role::StatusSensor,
                Role::SecuritySensor,
                Role::Siren,
            ],
        }
    }

    pub fn supports(self, role: Role) -> bool {
        self.roles().contains(&role)
    }
}

impl FromStr for DeviceKind {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnsupportedDeviceKind(s.to_string()))
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_type() {
        assert_eq!("kettle".parse::<DeviceKind>().unwrap(), DeviceKind::Kettle);
        assert_eq!(
            "air_purifier".parse::<DeviceKind>().unwrap(),
            DeviceKind::AirPurifier
        );
        assert!(matches!(
            "toaster".parse::<DeviceKind>(),
            Err(ConfigurationError::UnsupportedDeviceKind(_))
        ));
    }

    #[test]
    fn test_required_role_is_always_supported() {
        for kind in DeviceKind::ALL {
            assert!(kind.supports(kind.required_role()));
            assert_eq!(kind.roles()[0], kind.required_role());
        }
        assert_eq!(DeviceKind::SecuritySystem.required_role(), Role::AlarmState);
        assert!(!DeviceKind::SecuritySystem.supports(Role::Power));
    }

    #[test]
    fn test_categories() {
        assert_eq!(DeviceKind::Kettle.category(), 27);
        assert_eq!(DeviceKind::GarageDoor.category(), 4);
    }
}
