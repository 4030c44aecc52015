//! Translation between upstream entity states and characteristic values
//!
//! Every function here is pure. Upstream data that cannot be translated
//! yields a [`ConversionError`] and the caller drops that one update.

use hkd_core::{EntityId, EntityState, STATE_ON};
use serde::{Deserialize, Serialize};

use crate::characteristic::{characteristic_spec, CharacteristicValue};
use crate::collaborators::UpstreamCommand;
use crate::error::{CommandError, ConversionError};
use crate::{Role, RoleShape};

/// Per-device conversion settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Raw state that means "no fault" for [`Role::Fault`]
    ///
    /// When unset a fault is reported whenever the raw state is `on`.
    pub fault_ok_state: Option<String>,
}

/// Fixed mapping between upstream tokens and characteristic codes
#[derive(Debug)]
pub struct Vocabulary {
    entries: &'static [(&'static str, u8)],
}

impl Vocabulary {
    pub fn code(&self, token: &str) -> Option<u8> {
        self.entries
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, code)| *code)
    }

    pub fn token(&self, code: u8) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, c)| *c == code)
            .map(|(token, _)| *token)
    }

    pub fn tokens(&self) -> impl Iterator<Item = &'static str> {
        self.entries.iter().map(|(token, _)| *token)
    }
}

static KEEP_WARM: Vocabulary = Vocabulary {
    entries: &[("Off", 0), ("30min", 1), ("60min", 2), ("90min", 3), ("120min", 4)],
};

static DIRECTION: Vocabulary = Vocabulary {
    entries: &[("forward", 0), ("reverse", 1)],
};

static DOOR_POSITION: Vocabulary = Vocabulary {
    entries: &[
        ("open", 0),
        ("closed", 1),
        ("opening", 2),
        ("closing", 3),
        ("stopped", 4),
    ],
};

static ALARM_STATE: Vocabulary = Vocabulary {
    entries: &[
        ("armed_home", 0),
        ("armed_away", 1),
        ("armed_night", 2),
        ("disarmed", 3),
        ("triggered", 4),
    ],
};

static AIR_QUALITY: Vocabulary = Vocabulary {
    entries: &[
        ("excellent", 1),
        ("good", 2),
        ("fair", 3),
        ("inferior", 4),
        ("poor", 5),
    ],
};

/// Vocabulary of an enumerated role
pub fn vocabulary(role: Role) -> Option<&'static Vocabulary> {
    match role {
        Role::KeepWarm => Some(&KEEP_WARM),
        Role::Direction => Some(&DIRECTION),
        Role::DoorPosition => Some(&DOOR_POSITION),
        Role::AlarmState => Some(&ALARM_STATE),
        Role::AirQuality => Some(&AIR_QUALITY),
        _ => None,
    }
}

pub fn is_on(raw: &str) -> bool {
    raw == STATE_ON
}

/// Parse a raw state as a finite float
pub fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Convert an RGB triple to hue (degrees) and saturation (percent)
pub fn rgb_to_hs(rgb: [u8; 3]) -> (f64, f64) {
    let [r, g, b] = rgb.map(|c| c as f64 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * ((g - b) / delta).rem_euclid(6.0)
    } else if max == g {
        60.0 * ((b - r) / delta + 2.0)
    } else {
        60.0 * ((r - g) / delta + 4.0)
    };
    let saturation = if max == 0.0 { 0.0 } else { delta / max * 100.0 };

    (round1(hue), round1(saturation))
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

/// Translate an upstream state into the value of a `role` characteristic
pub fn to_characteristic(
    role: Role,
    state: &EntityState,
    options: &ConversionOptions,
) -> Result<CharacteristicValue, ConversionError> {
    let raw = state.state.as_str();

    match role.shape() {
        RoleShape::Boolean => {
            let value = match (role, &options.fault_ok_state) {
                (Role::Fault, Some(ok_state)) => raw != ok_state,
                _ => is_on(raw),
            };
            Ok(CharacteristicValue::Bool(value))
        }
        RoleShape::Numeric => parse_number(raw)
            .or_else(|| numeric_attribute(role, state))
            .map(CharacteristicValue::Float)
            .ok_or_else(|| ConversionError::NotNumeric {
                role,
                raw: raw.to_string(),
            }),
        RoleShape::Enumerated => vocabulary(role)
            .and_then(|vocabulary| vocabulary.code(raw))
            .map(CharacteristicValue::Enum)
            .ok_or_else(|| ConversionError::UnknownOption {
                role,
                raw: raw.to_string(),
            }),
        RoleShape::Color => {
            let (hue, saturation) = state
                .attribute::<[f64; 2]>("hs_color")
                .map(|[h, s]| (h, s))
                .or_else(|| state.attribute::<[u8; 3]>("rgb_color").map(rgb_to_hs))
                .ok_or(ConversionError::MissingColor { role })?;
            Ok(CharacteristicValue::Color { hue, saturation })
        }
        RoleShape::Text => Ok(CharacteristicValue::Text(raw.to_string())),
    }
}

/// Light entities carry brightness and colour temperature as attributes
fn numeric_attribute(role: Role, state: &EntityState) -> Option<f64> {
    match role {
        Role::Brightness => state
            .attribute::<f64>("brightness")
            .map(|b| (b.clamp(0.0, 255.0) * 100.0 / 255.0).round()),
        Role::ColorTemperature => state.attribute::<f64>("color_temp"),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Translate a value written by a controller into an upstream command
pub fn to_command(
    role: Role,
    entity_id: &EntityId,
    value: &CharacteristicValue,
) -> Result<UpstreamCommand, CommandError> {
    if !characteristic_spec(role).writable {
        return Err(CommandError::ReadOnly(role));
    }
    let entity_id = entity_id.clone();
    let mismatch = || CommandError::ValueMismatch {
        role,
        value: value.clone(),
    };

    match (role.shape(), value) {
        (RoleShape::Boolean, CharacteristicValue::Bool(true)) => {
            Ok(UpstreamCommand::TurnOn { entity_id })
        }
        (RoleShape::Boolean, CharacteristicValue::Bool(false)) => {
            Ok(UpstreamCommand::TurnOff { entity_id })
        }
        (RoleShape::Numeric, value) => {
            let value = value.as_f64().filter(|v| v.is_finite()).ok_or_else(mismatch)?;
            Ok(UpstreamCommand::SetValue {
                entity_id,
                role,
                value,
            })
        }
        (RoleShape::Enumerated, CharacteristicValue::Enum(code)) => {
            let option = vocabulary(role)
                .and_then(|vocabulary| vocabulary.token(*code))
                .ok_or_else(mismatch)?;
            Ok(UpstreamCommand::SelectOption {
                entity_id,
                option: option.to_string(),
            })
        }
        (RoleShape::Color, CharacteristicValue::Color { hue, saturation }) => {
            Ok(UpstreamCommand::SetColor {
                entity_id,
                hue: *hue,
                saturation: *saturation,
            })
        }
        _ => Err(mismatch()),
    }
}
