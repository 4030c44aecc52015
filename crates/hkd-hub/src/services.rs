//! Service registry with async handlers

use dashmap::DashMap;
use hkd_core::{Context, ServiceCall};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Result type for service calls
pub type ServiceResult = Result<(), ServiceError>;

/// Future type for async service handlers
pub type ServiceFuture = Pin<Box<dyn Future<Output = ServiceResult> + Send>>;

/// Service handler function type
pub type ServiceHandler = Arc<dyn Fn(ServiceCall) -> ServiceFuture + Send + Sync>;

/// Errors that can occur when calling services
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("service not found: {domain}.{service}")]
    NotFound { domain: String, service: String },

    #[error("service call failed: {0}")]
    CallFailed(String),

    #[error("invalid service data: {0}")]
    InvalidData(String),
}

/// Routes service calls to registered handlers
///
/// Services are keyed by `domain.service`. Registering the same key twice
/// replaces the earlier handler.
pub struct ServiceRegistry {
    services: DashMap<String, ServiceHandler>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: DashMap::new(),
        }
    }

    /// Register an async handler for `domain.service`
    #[instrument(skip(self, domain, service, handler))]
    pub fn register<F, Fut>(&self, domain: impl Into<String>, service: impl Into<String>, handler: F)
    where
        F: Fn(ServiceCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ServiceResult> + Send + 'static,
    {
        let domain = domain.into();
        let service = service.into();
        debug!(domain = %domain, service = %service, "Registering service");

        let handler: ServiceHandler =
            Arc::new(move |call| Box::pin(handler(call)) as ServiceFuture);
        self.services.insert(format!("{}.{}", domain, service), handler);
    }

    /// Call a service and wait for its handler to finish
    #[instrument(skip(self, service_data, context))]
    pub async fn call(
        &self,
        domain: &str,
        service: &str,
        service_data: serde_json::Value,
        context: Context,
    ) -> ServiceResult {
        let key = format!("{}.{}", domain, service);

        let handler = self
            .services
            .get(&key)
            .map(|h| h.clone())
            .ok_or_else(|| {
                warn!(domain = %domain, service = %service, "Service not found");
                ServiceError::NotFound {
                    domain: domain.to_string(),
                    service: service.to_string(),
                }
            })?;
        // The map guard is released above, before the handler runs

        debug!(domain = %domain, service = %service, "Calling service");
        handler(ServiceCall::new(domain, service, service_data, context)).await
    }

    pub fn has_service(&self, domain: &str, service: &str) -> bool {
        self.services.contains_key(&format!("{}.{}", domain, service))
    }

    #[instrument(skip(self))]
    pub fn unregister(&self, domain: &str, service: &str) -> bool {
        let removed = self
            .services
            .remove(&format!("{}.{}", domain, service))
            .is_some();
        if removed {
            debug!(domain = %domain, service = %service, "Unregistered service");
        }
        removed
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

impl Default for ServiceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_register_and_call() {
        let registry = ServiceRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        registry.register("switch", "turn_off", move |call: ServiceCall| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().extend(call.entity_ids());
                Ok(())
            }
        });

        tokio_test::assert_ok!(
            registry
                .call(
                    "switch",
                    "turn_off",
                    json!({"entity_id": "switch.kettle"}),
                    Context::new(),
                )
                .await
        );
        assert_eq!(*seen.lock().unwrap(), vec!["switch.kettle".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_service() {
        let registry = ServiceRegistry::new();
        let err = registry
            .call("number", "set_value", json!({}), Context::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            ServiceError::NotFound {
                domain: "number".into(),
                service: "set_value".into()
            }
        );
    }

    #[tokio::test]
    async fn test_handler_error_propagates() {
        let registry = ServiceRegistry::new();
        registry.register("select", "select_option", |_call: ServiceCall| async {
            Err(ServiceError::InvalidData("missing 'option'".into()))
        });

        let err = registry
            .call("select", "select_option", json!({}), Context::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidData(_)));
    }

    #[test]
    fn test_unregister() {
        let registry = ServiceRegistry::new();
        registry.register("siren", "turn_on", |_call: ServiceCall| async { Ok(()) });
        assert!(registry.has_service("siren", "turn_on"));
        assert_eq!(registry.service_count(), 1);

        assert!(registry.unregister("siren", "turn_on"));
        assert!(!registry.unregister("siren", "turn_on"));
        assert!(!registry.has_service("siren", "turn_on"));
    }
}
