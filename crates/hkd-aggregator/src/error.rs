//! Error types for the device aggregator

use hkd_core::EntityIdError;
use thiserror::Error;

use crate::characteristic::{CharacteristicKey, CharacteristicValue};
use crate::collaborators::DeviceHandle;
use crate::Role;

/// A device definition could not be built from its configuration
///
/// Fatal for that device: its bridge is never created.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("missing required binding '{role}'")]
    MissingBinding { role: Role },

    #[error("missing configuration key '{0}'")]
    MissingKey(&'static str),

    #[error("unsupported device type '{0}'")]
    UnsupportedDeviceKind(String),

    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("invalid entity id for '{key}': {source}")]
    InvalidEntityId {
        key: String,
        #[source]
        source: EntityIdError,
    },

    #[error("empty entry at position {index} in '{key}'")]
    EmptyListEntry { key: String, index: usize },

    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// An upstream value could not be translated for one characteristic
///
/// Recovered locally: the update for that characteristic is dropped.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    #[error("'{raw}' is not a number")]
    NotNumeric { role: Role, raw: String },

    #[error("'{raw}' is not a known {role} option")]
    UnknownOption { role: Role, raw: String },

    #[error("no usable hs_color or rgb_color attribute")]
    MissingColor { role: Role },
}

/// A command from the accessory bridge could not be forwarded upstream
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CommandError {
    #[error("no entity is bound to {0}")]
    UnboundRole(CharacteristicKey),

    #[error("{0} is read-only")]
    ReadOnly(Role),

    #[error("{role} cannot be set to {value:?}")]
    ValueMismatch {
        role: Role,
        value: CharacteristicValue,
    },

    #[error("aggregated device is not active")]
    Inactive,

    #[error(transparent)]
    Upstream(#[from] CollaboratorError),
}

/// A call into the state source, accessory bridge or command sink failed
///
/// Treated as transient: the next upstream change re-synchronizes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("cannot subscribe to {entity_id}: {reason}")]
    Subscribe { entity_id: String, reason: String },

    #[error("unknown device {0}")]
    UnknownDevice(DeviceHandle),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("unavailable: {0}")]
    Unavailable(String),
}
