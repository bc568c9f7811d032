//! Configuration types for the remote service admin.
//!
//! All sections default sensibly, so an empty or missing config file yields a
//! working admin listening on port 8888.

use crate::error::RsaError;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// Port the HTTP transport listens on when nothing else is configured.
pub const DEFAULT_PORT: u16 = 8888;

/// Default bound on a single remote call.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Top-level configuration (`config.toml`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    /// UUID identifying this process in endpoint descriptions.
    /// Generated at startup when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework_uuid: Option<String>,
    /// Import endpoints exported by this very process.
    pub import_local_endpoints: bool,
    /// HTTP transport settings.
    pub http: HttpConfig,
}

/// `[http]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Listen port.
    pub port: u16,
    /// Address the listener binds to.
    pub bind_address: String,
    /// Host written into endpoint URLs. Defaults to the bind address, or
    /// `127.0.0.1` when binding to an unspecified address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_host: Option<String>,
    /// Client-side timeout for one remote call, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            advertise_host: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl HttpConfig {
    /// Socket address for the listener.
    pub fn listen_addr(&self) -> Result<SocketAddr, RsaError> {
        let ip: IpAddr = self.bind_address.parse().map_err(|e| {
            RsaError::Config(format!("invalid bind_address '{}': {e}", self.bind_address))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Host name or address peers should use to reach this process.
    pub fn advertised_host(&self) -> String {
        if let Some(host) = self.advertise_host.as_deref().filter(|h| !h.is_empty()) {
            return host.to_string();
        }
        match self.bind_address.parse::<IpAddr>() {
            Ok(ip) if ip.is_unspecified() => "127.0.0.1".to_string(),
            _ => self.bind_address.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
