//! Transport binding seam.
//!
//! A transport describes how exported endpoints are reached (the connection
//! properties written into each endpoint description) and carries proxy calls
//! to remote endpoints. The HTTP reference binding lives in `tether-http`.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tether_types::{EndpointDescription, ImportCallError, Properties, RsaError};

/// Reply to one remote call, with the transport status alongside.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteReply {
    pub status: u16,
    pub payload: Bytes,
}

#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Configuration type advertised in `service.imported.configs`.
    fn configuration_type(&self) -> &str;

    /// Connection properties for a new export of `interface` by `service_id`.
    fn endpoint_properties(&self, service_id: i64, interface: &str) -> Result<Properties, RsaError>;

    /// Send one call to `endpoint`. Runs on the caller's task, never under
    /// the registry lock.
    async fn send(
        &self,
        endpoint: &EndpointDescription,
        payload: Bytes,
    ) -> Result<RemoteReply, ImportCallError>;
}

/// Handed to import factories: the proxy's way of reaching its endpoint.
#[derive(Clone)]
pub struct RemoteInvoker {
    endpoint: Arc<EndpointDescription>,
    transport: Arc<dyn Transport>,
}

impl RemoteInvoker {
    pub fn new(endpoint: EndpointDescription, transport: Arc<dyn Transport>) -> Self {
        Self {
            endpoint: Arc::new(endpoint),
            transport,
        }
    }

    pub fn endpoint(&self) -> &EndpointDescription {
        &self.endpoint
    }

    /// Send a payload and return the reply body.
    pub async fn invoke(&self, payload: impl Into<Bytes>) -> Result<Bytes, ImportCallError> {
        self.invoke_with_status(payload).await.map(|reply| reply.payload)
    }

    /// Send a payload and return the full reply, including the status.
    pub async fn invoke_with_status(
        &self,
        payload: impl Into<Bytes>,
    ) -> Result<RemoteReply, ImportCallError> {
        self.transport.send(&self.endpoint, payload.into()).await
    }
}

impl std::fmt::Debug for RemoteInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteInvoker")
            .field("endpoint", &self.endpoint.id())
            .finish()
    }
}
