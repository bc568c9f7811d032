//! HTTP transport binding: endpoint URLs on the export side, a pooled
//! `reqwest` client on the import side.

use crate::server::{serve, HttpServerHandle};
use async_trait::async_trait;
use bytes::Bytes;
use std::net::Ipv6Addr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use tether_admin::{RemoteReply, RemoteServiceAdmin, Transport};
use tether_types::config::HttpConfig;
use tether_types::constants::{HTTP_CONFIGURATION_TYPE, HTTP_ENDPOINT_URL};
use tether_types::{EndpointDescription, ImportCallError, Properties, RsaError};
use tokio::net::TcpListener;
use tracing::{debug, warn};
use url::Url;

pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpConfig,
    /// Port written into endpoint URLs; the bound port once started.
    advertised_port: AtomicU16,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Arc<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .unwrap_or_default();
        Arc::new(Self {
            client,
            config: config.clone(),
            advertised_port: AtomicU16::new(config.port),
        })
    }

    /// Bind the configured listen address and serve `admin`'s exports.
    ///
    /// Start before exporting services so their URLs carry the bound port
    /// (relevant when the configured port is 0). A bind failure only affects
    /// the export side; imports keep working.
    pub async fn start(&self, admin: Arc<RemoteServiceAdmin>) -> Result<HttpServerHandle, RsaError> {
        let addr = self.config.listen_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RsaError::Transport(format!("failed to bind {addr}: {e}")))?;
        let handle = serve(listener, admin)
            .map_err(|e| RsaError::Transport(format!("listener on {addr} unusable: {e}")))?;
        self.advertised_port
            .store(handle.local_addr().port(), Ordering::Release);
        Ok(handle)
    }

    /// `http://host:port/` peers use to reach this process.
    pub fn base_url(&self) -> Result<Url, RsaError> {
        let host = self.config.advertised_host();
        let port = self.advertised_port.load(Ordering::Acquire);
        let raw = if host.parse::<Ipv6Addr>().is_ok() {
            format!("http://[{host}]:{port}/")
        } else {
            format!("http://{host}:{port}/")
        };
        Url::parse(&raw).map_err(|e| RsaError::Config(format!("invalid endpoint base '{raw}': {e}")))
    }

    /// URL of the export of `interface` by `service_id`.
    pub fn endpoint_url(&self, service_id: i64, interface: &str) -> Result<Url, RsaError> {
        let mut url = self.base_url()?;
        url.path_segments_mut()
            .map_err(|_| RsaError::Config("endpoint base cannot carry a path".into()))?
            .clear()
            .push("service")
            .push(&service_id.to_string())
            .push(interface);
        Ok(url)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn configuration_type(&self) -> &str {
        HTTP_CONFIGURATION_TYPE
    }

    fn endpoint_properties(&self, service_id: i64, interface: &str) -> Result<Properties, RsaError> {
        let url = self.endpoint_url(service_id, interface)?;
        Ok(Properties::new().with(HTTP_ENDPOINT_URL, url.as_str()))
    }

    async fn send(
        &self,
        endpoint: &EndpointDescription,
        payload: Bytes,
    ) -> Result<RemoteReply, ImportCallError> {
        let url = endpoint.property(HTTP_ENDPOINT_URL).ok_or_else(|| {
            ImportCallError::ConnectionFailed(format!(
                "endpoint {} has no {HTTP_ENDPOINT_URL}",
                endpoint.id()
            ))
        })?;
        debug!(endpoint_id = %endpoint.id(), url, bytes = payload.len(), "Remote call");

        let resp = self
            .client
            .post(url)
            .body(payload)
            .send()
            .await
            .map_err(classify)?;
        let status = resp.status();
        let body = resp.bytes().await.map_err(classify)?;

        if !status.is_success() {
            warn!(endpoint_id = %endpoint.id(), status = status.as_u16(), "Remote call failed");
            let message = if body.is_empty() {
                status.canonical_reason().unwrap_or_default().to_string()
            } else {
                String::from_utf8_lossy(&body).into_owned()
            };
            return Err(ImportCallError::RemoteFault {
                status: status.as_u16(),
                message,
            });
        }
        Ok(RemoteReply {
            status: status.as_u16(),
            payload: body,
        })
    }
}

fn classify(e: reqwest::Error) -> ImportCallError {
    if e.is_timeout() {
        ImportCallError::Timeout
    } else {
        ImportCallError::ConnectionFailed(e.to_string())
    }
}
