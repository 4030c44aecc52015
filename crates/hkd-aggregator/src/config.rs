//! YAML configuration
//!
//! ```yaml
//! homekit_device:
//!   - name: Kettle
//!     device_type: kettle
//!     power_switch: switch.kettle
//!     current_temperature: sensor.kettle_temperature
//! ```

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use crate::definition::{DeviceDefinition, DEVICE_TYPE_KEY, NAME_KEY};
use crate::error::ConfigurationError;

/// Top-level key holding the device list
pub const CONFIG_KEY: &str = "homekit_device";

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default, rename = "homekit_device")]
    devices: Vec<DeviceEntry>,
}

/// One device as written in YAML
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEntry {
    #[serde(default)]
    pub name: Option<String>,
    pub device_type: String,
    /// Role keys and any other settings
    #[serde(flatten)]
    pub settings: HashMap<String, Value>,
}

impl DeviceEntry {
    /// Flat key/value view, as stored in a config entry
    pub fn into_entry_data(self) -> HashMap<String, Value> {
        let mut data = self.settings;
        data.insert(DEVICE_TYPE_KEY.to_string(), Value::String(self.device_type));
        if let Some(name) = self.name {
            data.insert(NAME_KEY.to_string(), Value::String(name));
        }
        data
    }
}

/// Parse device definitions from a YAML document
///
/// A document without the `homekit_device` key defines no devices. The
/// first invalid device fails the whole document.
pub fn parse_definitions(yaml: &str) -> Result<Vec<DeviceDefinition>, ConfigurationError> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: Option<ConfigFile> = serde_yaml::from_str(yaml)?;
    let entries = file.map(|f| f.devices).unwrap_or_default();

    let definitions = entries
        .into_iter()
        .map(|entry| DeviceDefinition::from_entry_data(&entry.into_entry_data()))
        .collect::<Result<Vec<_>, _>>()?;

    for definition in &definitions {
        debug!(
            name = %definition.name(),
            kind = %definition.kind(),
            roles = definition.roles().count(),
            "Parsed device definition"
        );
    }
    Ok(definitions)
}

/// Load device definitions from a YAML file
pub fn load_definitions(path: impl AsRef<Path>) -> Result<Vec<DeviceDefinition>, ConfigurationError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|err| ConfigurationError::InvalidValue {
        key: CONFIG_KEY.to_string(),
        reason: format!("cannot read {}: {}", path.display(), err),
    })?;
    let definitions = parse_definitions(&contents)?;
    info!(path = %path.display(), count = definitions.len(), "Loaded aggregated devices");
    Ok(definitions)
}
