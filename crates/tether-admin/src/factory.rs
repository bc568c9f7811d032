//! Export and import factories.
//!
//! Factories are registered per interface name at runtime and looked up during
//! reconciliation. They are invoked while the registry lock is held, so they
//! must only build local objects: no network I/O and no calls back into the
//! admin.

use crate::service::ServiceObject;
use crate::transport::RemoteInvoker;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tether_types::EndpointDescription;

/// Server-side entry point of one exported (service, interface) pair.
///
/// The payload format is private to the interface's export and import
/// factories; the admin only moves bytes.
#[async_trait]
pub trait EndpointHandler: Send + Sync + 'static {
    /// Handle one call. `None` means the call produced no reply.
    async fn handle_request(&self, payload: Bytes) -> Option<Bytes>;
}

/// Wraps local services of one interface into endpoint handlers.
pub trait ExportServiceFactory: Send + Sync + 'static {
    /// Interface this factory serves.
    fn service_name(&self) -> &str;

    /// Wrap `service` into a handler for the endpoint being created.
    fn create_endpoint(
        &self,
        service: &ServiceObject,
        description: &EndpointDescription,
    ) -> Result<Arc<dyn EndpointHandler>, String>;

    /// Teardown hook, called when the export is removed.
    fn remove_endpoint(&self, _description: &EndpointDescription) {}
}

/// Builds local proxies for remote endpoints of one interface.
pub trait ImportServiceFactory: Send + Sync + 'static {
    /// Interface this factory serves.
    fn service_name(&self) -> &str;

    /// Build a proxy; the proxy forwards calls through `invoker`.
    fn create_proxy(
        &self,
        description: &EndpointDescription,
        invoker: RemoteInvoker,
    ) -> Result<ServiceObject, String>;

    /// Unregister hook, called when the import is removed.
    fn remove_proxy(&self, _description: &EndpointDescription) {}
}

/// Either kind of factory, as delivered by a service-tracker notification.
#[derive(Clone)]
pub enum Factory {
    Export(Arc<dyn ExportServiceFactory>),
    Import(Arc<dyn ImportServiceFactory>),
}

impl std::fmt::Debug for Factory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Factory::Export(x) => write!(f, "Factory::Export({})", x.service_name()),
            Factory::Import(x) => write!(f, "Factory::Import({})", x.service_name()),
        }
    }
}
