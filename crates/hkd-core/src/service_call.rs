//! Service call type for commanding upstream entities

use crate::Context;
use serde::{Deserialize, Serialize};

/// A call to a host-platform service (e.g. `switch.turn_off`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    /// Domain the service belongs to ("switch", "number", "select", ...)
    pub domain: String,

    /// Service name ("turn_on", "set_value", "select_option", ...)
    pub service: String,

    /// Service data, always a JSON object
    pub service_data: serde_json::Value,

    pub context: Context,
}

impl ServiceCall {
    pub fn new(
        domain: impl Into<String>,
        service: impl Into<String>,
        service_data: serde_json::Value,
        context: Context,
    ) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            service_data,
            context,
        }
    }

    /// Full service identifier (domain.service)
    pub fn service_id(&self) -> String {
        format!("{}.{}", self.domain, self.service)
    }

    pub fn get<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.service_data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Targeted entity ids, accepting a single string or an array
    pub fn entity_ids(&self) -> Vec<String> {
        match self.service_data.get("entity_id") {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(arr)) => arr
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => vec![],
        }
    }
}
