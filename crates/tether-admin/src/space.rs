//! Local service space, where imported proxies become visible.

use crate::service::ServiceObject;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tether_types::constants::{OBJECTCLASS, SERVICE_ID, SERVICE_IMPORTED};
use tether_types::{Filter, Properties};
use tracing::debug;

/// The service registry collaborator, as far as imports are concerned.
///
/// Called after the admin lock is released, so implementations may call back
/// into the admin (e.g. a tracker forwarding registrations to `add_service`).
pub trait ServiceSpace: Send + Sync + 'static {
    /// Make `proxy` available under `interface`.
    fn register_proxy(
        &self,
        endpoint_id: &str,
        interface: &str,
        proxy: ServiceObject,
        properties: Properties,
    );

    /// Withdraw the proxy registered for `endpoint_id`.
    fn unregister_proxy(&self, endpoint_id: &str);
}

/// A proxy registered in a [`LocalServiceSpace`].
#[derive(Clone)]
pub struct RegisteredProxy {
    pub endpoint_id: String,
    pub object: ServiceObject,
    pub properties: Properties,
}

/// In-memory service space with filter lookups.
pub struct LocalServiceSpace {
    proxies: DashMap<String, RegisteredProxy>,
    next_service_id: AtomicI64,
}

impl LocalServiceSpace {
    pub fn new() -> Self {
        Self {
            proxies: DashMap::new(),
            next_service_id: AtomicI64::new(1),
        }
    }

    /// All registered proxies whose properties match `filter`.
    pub fn find(&self, filter: &Filter) -> Vec<RegisteredProxy> {
        let mut found: Vec<RegisteredProxy> = self
            .proxies
            .iter()
            .filter(|entry| filter.matches(&entry.value().properties))
            .map(|entry| entry.value().clone())
            .collect();
        found.sort_by_key(|p| p.properties.get_i64(SERVICE_ID).unwrap_or_default());
        found
    }

    /// First proxy registered under `interface`.
    pub fn get(&self, interface: &str) -> Option<ServiceObject> {
        self.find(&Filter::equal(OBJECTCLASS, interface))
            .into_iter()
            .next()
            .map(|p| p.object)
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

impl Default for LocalServiceSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceSpace for LocalServiceSpace {
    fn register_proxy(
        &self,
        endpoint_id: &str,
        interface: &str,
        proxy: ServiceObject,
        mut properties: Properties,
    ) {
        let service_id = self.next_service_id.fetch_add(1, Ordering::Relaxed);
        properties.set(SERVICE_ID, service_id.to_string());
        properties.set(OBJECTCLASS, interface);
        properties.set(SERVICE_IMPORTED, "true");
        debug!(endpoint_id, interface, service_id, "Registered proxy");
        self.proxies.insert(
            endpoint_id.to_string(),
            RegisteredProxy {
                endpoint_id: endpoint_id.to_string(),
                object: proxy,
                properties,
            },
        );
    }

    fn unregister_proxy(&self, endpoint_id: &str) {
        if self.proxies.remove(endpoint_id).is_some() {
            debug!(endpoint_id, "Unregistered proxy");
        }
    }
}
