//! Downstream characteristics and the static role table

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Role;

/// Identifies one downstream characteristic of an aggregated device
///
/// `index` is 0 for single-valued roles and the list position for
/// [`Role::SecuritySensor`], so every sensor gets its own characteristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacteristicKey {
    pub role: Role,
    pub index: u16,
}

impl CharacteristicKey {
    pub fn new(role: Role) -> Self {
        Self { role, index: 0 }
    }

    pub fn indexed(role: Role, index: u16) -> Self {
        Self { role, index }
    }
}

impl From<Role> for CharacteristicKey {
    fn from(role: Role) -> Self {
        Self::new(role)
    }
}

impl fmt::Display for CharacteristicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.role.is_repeatable() {
            write!(f, "{}[{}]", self.role, self.index)
        } else {
            write!(f, "{}", self.role)
        }
    }
}

/// Wire format of a characteristic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    Bool,
    Float,
    /// Integer on the wire; float values are rounded
    Int,
    /// Code from a fixed set of valid values
    Enum,
    /// Hue (0-360) and saturation (0-100)
    Color,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    Celsius,
    Percentage,
    Minutes,
    Mireds,
    MicrogramsPerCubicMeter,
    PartsPerBillion,
}

/// Static description of a characteristic
#[derive(Debug, Clone, PartialEq)]
pub struct CharacteristicSpec {
    /// HomeKit characteristic type name
    pub name: &'static str,
    pub format: Format,
    pub unit: Option<Unit>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub step: Option<f64>,
    /// Accepted codes for [`Format::Enum`]
    pub valid_values: &'static [u8],
    /// Whether controllers may write it
    pub writable: bool,
}

impl CharacteristicSpec {
    const fn new(name: &'static str, format: Format, writable: bool) -> Self {
        Self {
            name,
            format,
            unit: None,
            min: None,
            max: None,
            step: None,
            valid_values: &[],
            writable,
        }
    }

    const fn range(mut self, unit: Unit, min: f64, max: f64, step: f64) -> Self {
        self.unit = Some(unit);
        self.min = Some(min);
        self.max = Some(max);
        self.step = Some(step);
        self
    }

    const fn values(mut self, valid_values: &'static [u8]) -> Self {
        self.valid_values = valid_values;
        self
    }
}

/// The characteristic each role is published as
pub fn characteristic_spec(role: Role) -> CharacteristicSpec {
    use Format::*;
    use Unit::*;

    match role {
        Role::Power => CharacteristicSpec::new("On", Bool, true),
        Role::CurrentTemperature => CharacteristicSpec::new("CurrentTemperature", Float, false)
            .range(Celsius, 0.0, 100.0, 0.1),
        Role::TargetTemperature => CharacteristicSpec::new("TargetTemperature", Float, true)
            .range(Celsius, 0.0, 100.0, 1.0),
        Role::Countdown => CharacteristicSpec::new("RemainingDuration", Int, false)
            .range(Minutes, 0.0, 1440.0, 1.0),
        Role::Fault => CharacteristicSpec::new("StatusFault", Bool, false),
        Role::KeepWarm => CharacteristicSpec::new("KeepWarmMode", Enum, true).values(&[0, 1, 2, 3, 4]),
        Role::KeepWarmTime => CharacteristicSpec::new("KeepWarmDuration", Int, true)
            .range(Minutes, 0.0, 1440.0, 1.0),
        Role::Speed => CharacteristicSpec::new("RotationSpeed", Int, true)
            .range(Percentage, 0.0, 100.0, 1.0),
        Role::Oscillation => CharacteristicSpec::new("SwingMode", Bool, true),
        Role::Direction => CharacteristicSpec::new("RotationDirection", Enum, true).values(&[0, 1]),
        Role::Brightness => CharacteristicSpec::new("Brightness", Int, true)
            .range(Percentage, 0.0, 100.0, 1.0),
        Role::ColorTemperature => CharacteristicSpec::new("ColorTemperature", Int, true)
            .range(Mireds, 140.0, 500.0, 1.0),
        Role::RgbColor => CharacteristicSpec::new("HueSaturation", Color, true),
        Role::CurrentHumidity => CharacteristicSpec::new("CurrentRelativeHumidity", Float, false)
            .range(Percentage, 0.0, 100.0, 1.0),
        Role::TargetHumidity => {
            CharacteristicSpec::new("RelativeHumidityHumidifierThreshold", Float, true)
                .range(Percentage, 0.0, 100.0, 1.0)
        }
        Role::WaterLevel => CharacteristicSpec::new("WaterLevel", Float, false)
            .range(Percentage, 0.0, 100.0, 1.0),
        Role::AirQuality => {
            CharacteristicSpec::new("AirQuality", Enum, false).values(&[0, 1, 2, 3, 4, 5])
        }
        Role::FilterLife => CharacteristicSpec::new("FilterLifeLevel", Float, false)
            .range(Percentage, 0.0, 100.0, 1.0),
        Role::Pm25 => CharacteristicSpec::new("PM2.5Density", Float, false)
            .range(MicrogramsPerCubicMeter, 0.0, 1000.0, 1.0),
        Role::Voc => CharacteristicSpec::new("VOCDensity", Float, false)
            .range(PartsPerBillion, 0.0, 1000.0, 1.0),
        Role::DoorPosition => {
            CharacteristicSpec::new("CurrentDoorState", Enum, false).values(&[0, 1, 2, 3, 4])
        }
        Role::Obstruction => CharacteristicSpec::new("ObstructionDetected", Bool, false),
        Role::Motion => CharacteristicSpec::new("MotionDetected", Bool, false),
        Role::LightSwitch => CharacteristicSpec::new("On", Bool, true),
        Role::AlarmState => CharacteristicSpec::new("SecuritySystemCurrentState", Enum, true)
            .values(&[0, 1, 2, 3, 4]),
        Role::SecuritySensor => CharacteristicSpec::new("ContactSensorState", Bool, false),
        Role::Siren => CharacteristicSpec::new("On", Bool, true),
        Role::StatusSensor => CharacteristicSpec::new("StatusText", Text, false),
    }
}

/// A typed downstream value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "snake_case")]
pub enum CharacteristicValue {
    Bool(bool),
    Float(f64),
    Int(i64),
    Enum(u8),
    Color { hue: f64, saturation: f64 },
    Text(String),
}

impl CharacteristicValue {
    pub fn format(&self) -> Format {
        match self {
            CharacteristicValue::Bool(_) => Format::Bool,
            CharacteristicValue::Float(_) => Format::Float,
            CharacteristicValue::Int(_) => Format::Int,
            CharacteristicValue::Enum(_) => Format::Enum,
            CharacteristicValue::Color { .. } => Format::Color,
            CharacteristicValue::Text(_) => Format::Text,
        }
    }

    /// Numeric view of Float and Int values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CharacteristicValue::Float(v) => Some(*v),
            CharacteristicValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }
}
