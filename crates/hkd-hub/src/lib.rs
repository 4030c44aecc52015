//! In-process host automation platform
//!
//! This crate provides the two host services the device aggregator talks to:
//! the [`StateHub`], which stores entity states and notifies per-entity
//! subscribers when they change, and the [`ServiceRegistry`], which routes
//! service calls to async handlers. [`register_default_services`] wires the
//! usual on/off, set-value and select-option services back into the hub.

mod platform;
mod services;
mod state_hub;

pub use platform::register_default_services;
pub use services::{ServiceError, ServiceFuture, ServiceHandler, ServiceRegistry, ServiceResult};
pub use state_hub::{StateHub, TrackHandle};

use std::sync::Arc;

/// Thread-safe wrapper for StateHub
pub type SharedStateHub = Arc<StateHub>;

/// Thread-safe wrapper for ServiceRegistry
pub type SharedServiceRegistry = Arc<ServiceRegistry>;
