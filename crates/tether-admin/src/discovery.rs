//! Discovery collaborators.
//!
//! Discovery propagates endpoint visibility between processes. The admin
//! calls [`Discovery::publish_endpoint`] / [`Discovery::retract_endpoint`]
//! after each export change, outside its lock; inbound discovery feeds
//! `add_endpoint` / `remove_endpoint` on the receiving admin.

use crate::admin::RemoteServiceAdmin;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tether_types::EndpointDescription;
use tracing::debug;

pub trait Discovery: Send + Sync + 'static {
    /// Announce a newly exported endpoint.
    fn publish_endpoint(&self, endpoint: &EndpointDescription);

    /// Withdraw an endpoint whose export was torn down.
    fn retract_endpoint(&self, endpoint: &EndpointDescription);
}

/// Discovery that announces nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDiscovery;

impl Discovery for NoopDiscovery {
    fn publish_endpoint(&self, endpoint: &EndpointDescription) {
        debug!(endpoint_id = %endpoint.id(), "Discovery disabled, not publishing");
    }

    fn retract_endpoint(&self, _endpoint: &EndpointDescription) {}
}

/// Fans endpoints out to every admin attached in this process.
///
/// Admins attached late receive every endpoint published so far. Each admin
/// skips endpoints of its own framework unless configured otherwise.
#[derive(Default)]
pub struct InProcessDiscovery {
    peers: RwLock<Vec<Weak<RemoteServiceAdmin>>>,
    published: Mutex<BTreeMap<String, EndpointDescription>>,
}

impl InProcessDiscovery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start delivering endpoints to `admin`.
    pub fn attach(&self, admin: &Arc<RemoteServiceAdmin>) {
        {
            let mut peers = self.peers.write().unwrap_or_else(|e| e.into_inner());
            peers.retain(|p| p.strong_count() > 0);
            peers.push(Arc::downgrade(admin));
        }
        let known: Vec<EndpointDescription> = {
            let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            published.values().cloned().collect()
        };
        for endpoint in known {
            admin.add_endpoint(endpoint);
        }
    }

    /// Endpoints currently announced.
    pub fn published(&self) -> Vec<EndpointDescription> {
        let published = self.published.lock().unwrap_or_else(|e| e.into_inner());
        published.values().cloned().collect()
    }

    fn live_peers(&self) -> Vec<Arc<RemoteServiceAdmin>> {
        let peers = self.peers.read().unwrap_or_else(|e| e.into_inner());
        peers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl Discovery for InProcessDiscovery {
    fn publish_endpoint(&self, endpoint: &EndpointDescription) {
        {
            let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            published.insert(endpoint.id().to_string(), endpoint.clone());
        }
        for peer in self.live_peers() {
            peer.add_endpoint(endpoint.clone());
        }
    }

    fn retract_endpoint(&self, endpoint: &EndpointDescription) {
        {
            let mut published = self.published.lock().unwrap_or_else(|e| e.into_inner());
            published.remove(endpoint.id());
        }
        for peer in self.live_peers() {
            peer.remove_endpoint(endpoint);
        }
    }
}
