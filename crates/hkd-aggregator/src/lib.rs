//! Device aggregation
//!
//! Combines several independent host entities (a switch, a temperature
//! sensor, a select...) into one composite device and keeps a HomeKit
//! accessory in sync with it in both directions.
//!
//! - [`DeviceDefinition`] binds entities to [`Role`]s of a [`DeviceKind`]
//! - [`AggregationBridge`] owns the subscriptions and the downstream device
//! - [`convert`] translates entity states into characteristic values and
//!   controller writes into [`UpstreamCommand`]s
//! - [`hub`] adapts the in-process hub as state source and command sink

pub mod bridge;
pub mod characteristic;
pub mod collaborators;
pub mod config;
pub mod convert;
pub mod definition;
pub mod entities;
pub mod error;
pub mod hub;
mod kind;
mod role;

pub use bridge::{AggregationBridge, BridgeDiagnostics, BridgePhase};
pub use characteristic::{
    characteristic_spec, CharacteristicKey, CharacteristicSpec, CharacteristicValue, Format, Unit,
};
pub use collaborators::{
    AccessoryBridge, CommandHandler, CommandSink, DeviceDeclaration, DeviceHandle, StateListener,
    StateSource, Subscription, UpstreamCommand,
};
pub use convert::ConversionOptions;
pub use definition::{Binding, DeviceDefinition, DeviceDefinitionBuilder};
pub use error::{CollaboratorError, CommandError, ConfigurationError, ConversionError};
pub use hub::{HubCommandSink, HubStateSource};
pub use kind::DeviceKind;
pub use role::{Role, RoleShape};
