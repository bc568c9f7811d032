//! Built-in echo service exported by `tether serve`.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tether_admin::service::{service_object, ServiceObject};
use tether_admin::{EndpointHandler, ExportServiceFactory};
use tether_types::constants::{OBJECTCLASS, SERVICE_EXPORTED_INTERFACES, SERVICE_ID};
use tether_types::{EndpointDescription, Properties};

pub const ECHO_INTERFACE: &str = "tether.Echo";

/// Service id the echo service is registered under.
pub const ECHO_SERVICE_ID: i64 = 1;

/// Replies with the request body.
pub struct EchoEndpoint;

#[async_trait]
impl EndpointHandler for EchoEndpoint {
    async fn handle_request(&self, payload: Bytes) -> Option<Bytes> {
        Some(payload)
    }
}

pub struct EchoExportFactory;

impl ExportServiceFactory for EchoExportFactory {
    fn service_name(&self) -> &str {
        ECHO_INTERFACE
    }

    fn create_endpoint(
        &self,
        _service: &ServiceObject,
        _description: &EndpointDescription,
    ) -> Result<Arc<dyn EndpointHandler>, String> {
        Ok(Arc::new(EchoEndpoint))
    }
}

/// The echo service object and its registration properties.
pub fn echo_service() -> (ServiceObject, Properties) {
    let properties = Properties::from([
        (SERVICE_ID, ECHO_SERVICE_ID.to_string()),
        (OBJECTCLASS, ECHO_INTERFACE.to_string()),
        (SERVICE_EXPORTED_INTERFACES, "*".to_string()),
    ]);
    (service_object(EchoEndpoint), properties)
}
