//! Collaborators backed by the in-process hub
//!
//! [`HubStateSource`] subscribes through [`StateHub::track_state_change`]
//! and [`HubCommandSink`] turns upstream commands into service calls.

use async_trait::async_trait;
use hkd_core::domains::{
    is_readonly_domain, select_option_service, set_value_service, turn_off_service,
    turn_on_service,
};
use hkd_core::{Context, EntityId, EntityState};
use hkd_hub::{ServiceRegistry, StateHub};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::collaborators::{CommandSink, StateListener, StateSource, Subscription, UpstreamCommand};
use crate::error::CollaboratorError;
use crate::Role;

/// Reads and subscribes to entity states held by a [`StateHub`]
#[derive(Clone)]
pub struct HubStateSource {
    states: Arc<StateHub>,
}

impl HubStateSource {
    pub fn new(states: Arc<StateHub>) -> Self {
        Self { states }
    }
}

impl StateSource for HubStateSource {
    fn track(
        &self,
        entity_id: &EntityId,
        listener: StateListener,
    ) -> Result<Subscription, CollaboratorError> {
        // Delivery runs on a spawned task
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(CollaboratorError::Subscribe {
                entity_id: entity_id.to_string(),
                reason: "no tokio runtime".to_string(),
            });
        }

        let handle = self
            .states
            .track_state_change(entity_id, move |change| listener(change));
        Ok(Subscription::new(entity_id.clone(), move || drop(handle)))
    }

    fn read(&self, entity_id: &EntityId) -> Option<EntityState> {
        self.states.get(&entity_id.to_string())
    }
}

/// Sends upstream commands as service calls
#[derive(Clone)]
pub struct HubCommandSink {
    services: Arc<ServiceRegistry>,
    context: Context,
}

impl HubCommandSink {
    pub fn new(services: Arc<ServiceRegistry>) -> Self {
        Self {
            services,
            context: Context::new(),
        }
    }
}

#[async_trait]
impl CommandSink for HubCommandSink {
    async fn send(&self, command: UpstreamCommand) -> Result<(), CollaboratorError> {
        let call = service_call_for(&command)?;
        debug!(
            domain = %call.domain,
            service = %call.service,
            entity_id = %command.entity_id(),
            "Calling service for command"
        );
        self.services
            .call(&call.domain, call.service, call.data, self.context.child())
            .await
            .map_err(|err| CollaboratorError::Rejected(err.to_string()))
    }
}

/// A service call that carries out one [`UpstreamCommand`]
#[derive(Debug, Clone, PartialEq)]
pub struct CommandCall {
    pub domain: String,
    pub service: &'static str,
    pub data: Value,
}

/// Map a command onto the service of its entity's domain
///
/// Commands for read-only domains, and commands a domain has no service
/// for, are rejected.
pub fn service_call_for(command: &UpstreamCommand) -> Result<CommandCall, CollaboratorError> {
    let entity_id = command.entity_id();
    let domain = entity_id.domain();
    if is_readonly_domain(domain) {
        return Err(CollaboratorError::Rejected(format!(
            "{} is read-only",
            entity_id
        )));
    }
    let unsupported = || {
        CollaboratorError::Rejected(format!("{} does not support this command", entity_id))
    };

    let mut data = Map::new();
    data.insert("entity_id".to_string(), json!(entity_id.to_string()));

    let service = match command {
        UpstreamCommand::TurnOn { .. } => turn_on_service(domain),
        UpstreamCommand::TurnOff { .. } => turn_off_service(domain),
        UpstreamCommand::SetValue { role, value, .. } => {
            let (service, key) = set_value_service(domain).ok_or_else(unsupported)?;
            let key = match (domain, role) {
                ("light", Role::ColorTemperature) => "color_temp",
                _ => key,
            };
            data.insert(key.to_string(), json!(value));
            service
        }
        UpstreamCommand::SelectOption { option, .. } => {
            let (service, extra) = select_option_service(domain, option).ok_or_else(unsupported)?;
            if let Value::Object(extra) = extra {
                data.extend(extra);
            }
            service
        }
        UpstreamCommand::SetColor {
            hue, saturation, ..
        } => {
            if domain != "light" {
                return Err(unsupported());
            }
            data.insert("hs_color".to_string(), json!([hue, saturation]));
            "turn_on"
        }
    };

    Ok(CommandCall {
        domain: domain.to_string(),
        service,
        data: Value::Object(data),
    })
}
