//! Context attached to state writes and service calls

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifies who caused a state write or a service call
///
/// Commands forwarded from the accessory bridge carry a child context of the
/// bridge's own context, so the echoed state change can be traced back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// ULID of this context
    pub id: String,

    /// Context that caused this one, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

impl Context {
    pub fn new() -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: None,
        }
    }

    /// Create a context caused by this one
    pub fn child(&self) -> Self {
        Self {
            id: Ulid::new().to_string(),
            parent_id: Some(self.id.clone()),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_links_parent() {
        let parent = Context::new();
        let child = parent.child();
        assert_eq!(child.parent_id.as_deref(), Some(parent.id.as_str()));
        assert_ne!(child.id, parent.id);
    }
}
