//! Aggregated device definitions
//!
//! A [`DeviceDefinition`] is immutable once built: the bridge reads it but
//! never changes it. Definitions come from the builder, from a flat
//! configuration map (one config entry) or from YAML via [`crate::config`].

use hkd_core::EntityId;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, trace, warn};

use crate::characteristic::CharacteristicKey;
use crate::convert::ConversionOptions;
use crate::error::ConfigurationError;
use crate::{DeviceKind, Role};

/// Name used when a config entry does not set one
pub const DEFAULT_NAME: &str = "Aggregated Device";

/// Configuration key holding the device kind
pub const DEVICE_TYPE_KEY: &str = "device_type";

pub const NAME_KEY: &str = "name";

/// Configuration key holding the "no fault" state token
pub const FAULT_OK_STATE_KEY: &str = "fault_ok_state";

/// Entities bound to one role
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Single(EntityId),
    Multiple(Vec<EntityId>),
}

impl Binding {
    pub fn entity_ids(&self) -> &[EntityId] {
        match self {
            Binding::Single(id) => std::slice::from_ref(id),
            Binding::Multiple(ids) => ids,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeviceDefinition {
    name: String,
    kind: DeviceKind,
    bindings: BTreeMap<Role, Binding>,
    options: ConversionOptions,
}

impl DeviceDefinition {
    pub fn builder(name: impl Into<String>, kind: DeviceKind) -> DeviceDefinitionBuilder {
        DeviceDefinitionBuilder {
            name: name.into(),
            kind,
            bindings: BTreeMap::new(),
            options: ConversionOptions::default(),
        }
    }

    /// Build from the role keys of one config entry
    ///
    /// Empty strings and nulls leave a role unbound. Keys that are not role
    /// keys, and roles `kind` does not use, are ignored.
    pub fn from_config(
        name: impl Into<String>,
        kind: DeviceKind,
        config: &HashMap<String, Value>,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = Self::builder(name, kind);

        for (key, value) in config {
            if key == FAULT_OK_STATE_KEY {
                match value {
                    Value::Null => {}
                    Value::String(s) if s.is_empty() => {}
                    Value::String(s) => builder = builder.fault_ok_state(s.clone()),
                    other => return Err(invalid_value(key, other)),
                }
                continue;
            }

            let Some(role) = Role::from_config_key(key) else {
                trace!(key = %key, "Ignoring non-role configuration key");
                continue;
            };
            if !kind.supports(role) {
                debug!(kind = %kind, key = %key, "Ignoring role not used by this device type");
                continue;
            }

            if role.is_repeatable() {
                for (index, item) in list_entries(key, value)?.iter().enumerate() {
                    let raw = item.as_str().ok_or_else(|| invalid_value(key, item))?;
                    if raw.trim().is_empty() {
                        return Err(ConfigurationError::EmptyListEntry {
                            key: key.clone(),
                            index,
                        });
                    }
                    builder = builder.bind(role, parse_entity_id(key, raw)?);
                }
            } else {
                match value {
                    Value::Null => {}
                    Value::String(s) if s.trim().is_empty() => {}
                    Value::String(s) => builder = builder.bind(role, parse_entity_id(key, s)?),
                    other => return Err(invalid_value(key, other)),
                }
            }
        }

        builder.build()
    }

    /// Build from the data of a stored config entry
    ///
    /// Reads `name` (defaulting to [`DEFAULT_NAME`]) and `device_type`
    /// alongside the role keys.
    pub fn from_entry_data(data: &HashMap<String, Value>) -> Result<Self, ConfigurationError> {
        let name = data
            .get(NAME_KEY)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_NAME)
            .to_string();

        let kind: DeviceKind = match data.get(DEVICE_TYPE_KEY) {
            Some(Value::String(kind)) => kind.parse()?,
            Some(other) => return Err(invalid_value(DEVICE_TYPE_KEY, other)),
            None => return Err(ConfigurationError::MissingKey(DEVICE_TYPE_KEY)),
        };

        Self::from_config(name, kind, data)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub fn options(&self) -> &ConversionOptions {
        &self.options
    }

    pub fn binding(&self, role: Role) -> Option<&Binding> {
        self.bindings.get(&role)
    }

    /// Bound roles in role order
    pub fn roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.bindings.keys().copied()
    }

    /// Entity behind one characteristic
    pub fn entity_for(&self, key: CharacteristicKey) -> Option<&EntityId> {
        self.bindings
            .get(&key.role)?
            .entity_ids()
            .get(usize::from(key.index))
    }

    /// Every characteristic with the entity feeding it
    pub fn characteristics(&self) -> Vec<(CharacteristicKey, &EntityId)> {
        self.bindings
            .iter()
            .flat_map(|(role, binding)| {
                binding
                    .entity_ids()
                    .iter()
                    .enumerate()
                    .filter_map(move |(index, id)| match u16::try_from(index) {
                        Ok(index) => Some((CharacteristicKey::indexed(*role, index), id)),
                        Err(_) => {
                            warn!(role = %role, entity_id = %id, "Binding index out of range, skipped");
                            None
                        }
                    })
            })
            .collect()
    }

    /// Distinct bound entities in first-seen order
    pub fn entity_ids(&self) -> Vec<&EntityId> {
        let mut seen = HashSet::new();
        self.bindings
            .values()
            .flat_map(Binding::entity_ids)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Characteristics fed by each entity
    pub fn reverse_index(&self) -> HashMap<EntityId, Vec<CharacteristicKey>> {
        let mut index: HashMap<EntityId, Vec<CharacteristicKey>> = HashMap::new();
        for (key, entity_id) in self.characteristics() {
            index.entry(entity_id.clone()).or_default().push(key);
        }
        index
    }
}

pub struct DeviceDefinitionBuilder {
    name: String,
    kind: DeviceKind,
    bindings: BTreeMap<Role, Binding>,
    options: ConversionOptions,
}

impl DeviceDefinitionBuilder {
    /// Bind `entity_id` to `role`
    ///
    /// Repeatable roles append; other roles keep the last binding.
    pub fn bind(mut self, role: Role, entity_id: EntityId) -> Self {
        if !self.kind.supports(role) {
            debug!(kind = %self.kind, role = %role, "Ignoring role not used by this device type");
            return self;
        }

        if role.is_repeatable() {
            match self.bindings.entry(role).or_insert_with(|| Binding::Multiple(Vec::new())) {
                Binding::Multiple(ids) => ids.push(entity_id),
                single => *single = Binding::Multiple(vec![entity_id]),
            }
        } else if let Some(previous) = self.bindings.insert(role, Binding::Single(entity_id)) {
            debug!(role = %role, previous = ?previous, "Replacing binding");
        }
        self
    }

    pub fn fault_ok_state(mut self, state: impl Into<String>) -> Self {
        self.options.fault_ok_state = Some(state.into());
        self
    }

    pub fn build(self) -> Result<DeviceDefinition, ConfigurationError> {
        let required = self.kind.required_role();
        let bound = self
            .bindings
            .get(&required)
            .is_some_and(|binding| !binding.entity_ids().is_empty());
        if !bound {
            return Err(ConfigurationError::MissingBinding { role: required });
        }

        Ok(DeviceDefinition {
            name: self.name,
            kind: self.kind,
            bindings: self.bindings,
            options: self.options,
        })
    }
}

fn list_entries<'a>(key: &str, value: &'a Value) -> Result<&'a [Value], ConfigurationError> {
    match value {
        Value::Null => Ok(&[]),
        Value::Array(items) => Ok(items),
        Value::String(s) if s.trim().is_empty() => Ok(&[]),
        Value::String(_) => Ok(std::slice::from_ref(value)),
        other => Err(invalid_value(key, other)),
    }
}

fn parse_entity_id(key: &str, raw: &str) -> Result<EntityId, ConfigurationError> {
    raw.trim()
        .parse()
        .map_err(|source| ConfigurationError::InvalidEntityId {
            key: key.to_string(),
            source,
        })
}

fn invalid_value(key: &str, value: &Value) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected an entity id string, got {}", value),
    }
}
