//! Default entity services
//!
//! Registers the services that command plain entities held in the hub:
//! on/off for switch-like domains, `set_value` for numbers and
//! `select_option` for selects. Each handler rewrites the targeted entity's
//! state, which in turn notifies its subscribers.

use hkd_core::{EntityState, ServiceCall, STATE_OFF, STATE_ON};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{ServiceError, ServiceRegistry, StateHub};

const SWITCH_DOMAINS: &[&str] = &["switch", "input_boolean", "fan", "siren", "humidifier"];
const NUMBER_DOMAINS: &[&str] = &["number", "input_number"];
const SELECT_DOMAINS: &[&str] = &["select", "input_select"];

/// Register the built-in entity services against `states`
pub fn register_default_services(services: &ServiceRegistry, states: Arc<StateHub>) {
    for &domain in SWITCH_DOMAINS {
        register_writer(services, &states, domain, "turn_on", |_, _, _| {
            Ok(STATE_ON.to_string())
        });
        register_writer(services, &states, domain, "turn_off", |_, _, _| {
            Ok(STATE_OFF.to_string())
        });
    }

    register_writer(services, &states, "light", "turn_on", light_turn_on);
    register_writer(services, &states, "light", "turn_off", |_, _, _| {
        Ok(STATE_OFF.to_string())
    });

    for &domain in NUMBER_DOMAINS {
        register_writer(services, &states, domain, "set_value", |current, call, _| {
            let value: f64 = call
                .get("value")
                .ok_or_else(|| ServiceError::InvalidData("missing 'value'".into()))?;
            let min = current.attribute::<f64>("min").unwrap_or(f64::MIN);
            let max = current.attribute::<f64>("max").unwrap_or(f64::MAX);
            if value < min || value > max {
                return Err(ServiceError::InvalidData(format!(
                    "value {} outside [{}, {}]",
                    value, min, max
                )));
            }
            Ok(value.to_string())
        });
    }

    for &domain in SELECT_DOMAINS {
        register_writer(services, &states, domain, "select_option", |current, call, _| {
            let option: String = call
                .get("option")
                .ok_or_else(|| ServiceError::InvalidData("missing 'option'".into()))?;
            if let Some(options) = current.attribute::<Vec<String>>("options") {
                if !options.contains(&option) {
                    return Err(ServiceError::InvalidData(format!(
                        "'{}' is not one of {:?}",
                        option, options
                    )));
                }
            }
            Ok(option)
        });
    }

    info!(count = services.service_count(), "Registered default entity services");
}

/// `light.turn_on` also carries brightness and colour
fn light_turn_on(
    _current: &EntityState,
    call: &ServiceCall,
    attributes: &mut HashMap<String, Value>,
) -> Result<String, ServiceError> {
    if let Some(pct) = call.get::<f64>("brightness_pct") {
        let brightness = (pct.clamp(0.0, 100.0) * 255.0 / 100.0).round();
        attributes.insert("brightness".to_string(), json!(brightness));
    }
    if let Some(mireds) = call.get::<f64>("color_temp") {
        attributes.insert("color_temp".to_string(), json!(mireds));
    }
    if let Some(hs) = call.get::<[f64; 2]>("hs_color") {
        attributes.insert("hs_color".to_string(), json!(hs));
        attributes.remove("rgb_color");
    }
    Ok(STATE_ON.to_string())
}

fn register_writer<F>(
    services: &ServiceRegistry,
    states: &Arc<StateHub>,
    domain: &'static str,
    service: &'static str,
    write: F,
) where
    F: Fn(&EntityState, &ServiceCall, &mut HashMap<String, Value>) -> Result<String, ServiceError>
        + Send
        + Sync
        + 'static,
{
    let states = states.clone();
    let write = Arc::new(write);

    services.register(domain, service, move |call: ServiceCall| {
        let states = states.clone();
        let write = write.clone();
        async move {
            for entity_id in call.entity_ids() {
                let Some(current) = states.get(&entity_id) else {
                    warn!(entity_id = %entity_id, service = %call.service_id(), "Target entity not found");
                    continue;
                };
                let mut attributes = current.attributes.clone();
                let new_state = write(&current, &call, &mut attributes)?;
                states.set(
                    current.entity_id.clone(),
                    new_state,
                    attributes,
                    call.context.clone(),
                );
            }
            Ok(())
        }
    });
}
