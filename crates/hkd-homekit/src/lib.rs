//! HomeKit accessory driver
//!
//! [`AccessoryDriver`] implements the aggregator's
//! [`AccessoryBridge`](hkd_aggregator::AccessoryBridge): each declared
//! device becomes a bridged HAP [`Accessory`] whose characteristic values
//! are pushed by the aggregation bridge and written by controllers.

mod accessory;
mod driver;

pub use accessory::{
    primary_service, service_type_for, Accessory, Characteristic, Service, ServiceType,
    BRIDGE_AID, FIRST_AID, MANUFACTURER,
};
pub use driver::{AccessoryDriver, CharacteristicEvent, DriverError};
