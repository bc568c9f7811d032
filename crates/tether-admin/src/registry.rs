//! The service/factory registry.
//!
//! [`AdminState`] holds everything the admin knows: the exportable services,
//! the factory tables, the live export and import registrations and the two
//! pending queues. It is a plain single-threaded state machine; the
//! [`RemoteServiceAdmin`](crate::RemoteServiceAdmin) facade wraps it in a
//! mutex and runs one [`AdminState::reconcile`] pass after every mutation.
//!
//! Side effects on collaborators (discovery, the local service space) are not
//! performed here. They are queued as [`Effect`]s in lock order and dispatched
//! by the facade once the lock is released.

use crate::factory::{EndpointHandler, ExportServiceFactory, ImportServiceFactory};
use crate::service::ServiceObject;
use crate::transport::Transport;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use tether_types::constants::{
    OBJECTCLASS, REMOTE_SERVICE_NAME, SERVICE_EXPORTED_INTERFACES, SERVICE_ID, SERVICE_IMPORTED,
};
use tether_types::{EndpointDescription, Properties, RsaError};
use tracing::{debug, info, warn};

/// One exported (service, interface) pair.
#[derive(Clone)]
pub struct ExportRegistration {
    pub(crate) export_id: u64,
    pub(crate) service_id: i64,
    pub(crate) service: ServiceObject,
    pub(crate) description: EndpointDescription,
    pub(crate) handler: Arc<dyn EndpointHandler>,
    pub(crate) factory: Arc<dyn ExportServiceFactory>,
    pub(crate) exported_at: DateTime<Utc>,
}

impl ExportRegistration {
    /// Synthetic, process-local, monotonically increasing id.
    pub fn export_id(&self) -> u64 {
        self.export_id
    }

    pub fn service_id(&self) -> i64 {
        self.service_id
    }

    pub fn service(&self) -> &ServiceObject {
        &self.service
    }

    pub fn description(&self) -> &EndpointDescription {
        &self.description
    }

    pub fn interface_name(&self) -> &str {
        self.description.interface_name()
    }

    pub fn handler(&self) -> Arc<dyn EndpointHandler> {
        Arc::clone(&self.handler)
    }

    pub fn exported_at(&self) -> DateTime<Utc> {
        self.exported_at
    }
}

impl std::fmt::Debug for ExportRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRegistration")
            .field("export_id", &self.export_id)
            .field("service_id", &self.service_id)
            .field("endpoint_id", &self.description.id())
            .field("interface", &self.description.interface_name())
            .finish()
    }
}

/// One imported endpoint bound to a local proxy.
#[derive(Clone)]
pub struct ImportRegistration {
    pub(crate) description: EndpointDescription,
    pub(crate) proxy: ServiceObject,
    pub(crate) factory: Arc<dyn ImportServiceFactory>,
    pub(crate) imported_at: DateTime<Utc>,
}

impl ImportRegistration {
    pub fn endpoint_id(&self) -> &str {
        self.description.id()
    }

    pub fn description(&self) -> &EndpointDescription {
        &self.description
    }

    pub fn proxy(&self) -> &ServiceObject {
        &self.proxy
    }

    pub fn imported_at(&self) -> DateTime<Utc> {
        self.imported_at
    }
}

impl std::fmt::Debug for ImportRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportRegistration")
            .field("endpoint_id", &self.description.id())
            .field("interface", &self.description.interface_name())
            .finish()
    }
}

/// Per-interface import bookkeeping.
///
/// Lives while at least one discovered endpoint of the interface exists,
/// whether or not an import factory is bound to it.
#[derive(Clone)]
pub struct ImportRegistrationFactory {
    pub(crate) interface: String,
    pub(crate) endpoints: BTreeSet<String>,
    pub(crate) registrations: Vec<String>,
    pub(crate) factory: Option<Arc<dyn ImportServiceFactory>>,
}

impl ImportRegistrationFactory {
    pub(crate) fn new(interface: &str, factory: Option<Arc<dyn ImportServiceFactory>>) -> Self {
        Self {
            interface: interface.to_string(),
            endpoints: BTreeSet::new(),
            registrations: Vec::new(),
            factory,
        }
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Number of live imports using this entry.
    pub fn usage_count(&self) -> usize {
        self.registrations.len()
    }

    /// Number of discovered endpoints of this interface.
    pub fn endpoint_count(&self) -> usize {
        self.endpoints.len()
    }

    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }
}

impl std::fmt::Debug for ImportRegistrationFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportRegistrationFactory")
            .field("interface", &self.interface)
            .field("endpoints", &self.endpoints)
            .field("registrations", &self.registrations)
            .field("bound", &self.factory.is_some())
            .finish()
    }
}

/// A locally registered service that asked to be exported.
#[derive(Clone)]
pub(crate) struct TrackedService {
    pub(crate) object: ServiceObject,
    pub(crate) properties: Properties,
}

/// Collaborator call produced under the lock, performed after it.
#[derive(Clone)]
pub enum Effect {
    Publish(EndpointDescription),
    Retract(EndpointDescription),
    RegisterProxy {
        endpoint_id: String,
        interface: String,
        proxy: ServiceObject,
        properties: Properties,
    },
    UnregisterProxy {
        endpoint_id: String,
    },
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Effect::Publish(d) => write!(f, "Publish({})", d.id()),
            Effect::Retract(d) => write!(f, "Retract({})", d.id()),
            Effect::RegisterProxy { endpoint_id, .. } => write!(f, "RegisterProxy({endpoint_id})"),
            Effect::UnregisterProxy { endpoint_id } => write!(f, "UnregisterProxy({endpoint_id})"),
        }
    }
}

/// Registry state. See the module docs.
pub struct AdminState {
    pub(crate) framework_uuid: String,
    pub(crate) import_local_endpoints: bool,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) services: HashMap<i64, TrackedService>,
    pub(crate) export_factories: HashMap<String, Arc<dyn ExportServiceFactory>>,
    pub(crate) import_factories: HashMap<String, Arc<dyn ImportServiceFactory>>,
    pub(crate) exports: BTreeMap<u64, ExportRegistration>,
    pub(crate) imports: HashMap<String, ImportRegistration>,
    pub(crate) import_bookkeeping: HashMap<String, ImportRegistrationFactory>,
    pub(crate) to_be_exported: VecDeque<i64>,
    pub(crate) to_be_imported: VecDeque<EndpointDescription>,
    pub(crate) next_export_id: u64,
    pub(crate) effects: VecDeque<Effect>,
}

/// Name a factory is keyed by: `remote.service.name` when given, else the
/// factory's own service name.
fn factory_key(own_name: &str, properties: &Properties) -> String {
    properties
        .get(REMOTE_SERVICE_NAME)
        .filter(|n| !n.trim().is_empty())
        .map(|n| n.trim().to_string())
        .unwrap_or_else(|| own_name.to_string())
}

impl AdminState {
    pub fn new(
        framework_uuid: impl Into<String>,
        import_local_endpoints: bool,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            framework_uuid: framework_uuid.into(),
            import_local_endpoints,
            transport,
            services: HashMap::new(),
            export_factories: HashMap::new(),
            import_factories: HashMap::new(),
            exports: BTreeMap::new(),
            imports: HashMap::new(),
            import_bookkeeping: HashMap::new(),
            to_be_exported: VecDeque::new(),
            to_be_imported: VecDeque::new(),
            next_export_id: 1,
            effects: VecDeque::new(),
        }
    }

    pub fn framework_uuid(&self) -> &str {
        &self.framework_uuid
    }

    // ----- services -----------------------------------------------------

    /// Track a newly registered service; queue it when it asks to be exported.
    pub fn add_service(&mut self, object: ServiceObject, properties: &Properties) {
        let Some(exported) = properties
            .get(SERVICE_EXPORTED_INTERFACES)
            .filter(|v| !v.trim().is_empty())
        else {
            return;
        };
        if properties.get(SERVICE_IMPORTED).is_some() {
            debug!("Ignoring imported service, proxies are never re-exported");
            return;
        }
        let Some(service_id) = properties.get_i64(SERVICE_ID) else {
            warn!(exported, "Dropping exportable service without a valid {SERVICE_ID}");
            return;
        };
        if properties.get_list(OBJECTCLASS).is_empty() {
            warn!(service_id, "Dropping exportable service without {OBJECTCLASS}");
            return;
        }
        if self.services.contains_key(&service_id) {
            debug!(service_id, "Service already tracked");
            return;
        }
        debug!(service_id, exported, "Queueing service for export");
        self.services.insert(
            service_id,
            TrackedService {
                object,
                properties: properties.clone(),
            },
        );
        self.to_be_exported.push_back(service_id);
    }

    /// Forget a service and tear down all of its exports. Idempotent.
    pub fn remove_service(&mut self, properties: &Properties) {
        let Some(service_id) = properties.get_i64(SERVICE_ID) else {
            warn!("Cannot remove service without a valid {SERVICE_ID}");
            return;
        };
        self.services.remove(&service_id);
        self.to_be_exported.retain(|id| *id != service_id);
        let removed = self.unexport_service(service_id);
        if removed > 0 {
            info!(service_id, removed, "Service removed, exports torn down");
        }
    }

    // ----- export factories ---------------------------------------------

    pub fn add_export_factory(
        &mut self,
        factory: Arc<dyn ExportServiceFactory>,
        properties: &Properties,
    ) {
        let name = factory_key(factory.service_name(), properties);
        if let Some(previous) = self.export_factories.get(&name).cloned() {
            if Arc::ptr_eq(&previous, &factory) {
                return;
            }
            warn!(service_name = %name, "Replacing bound export factory");
            self.detach_export_factory(&name, &previous);
        }
        info!(service_name = %name, "Export factory added");
        self.export_factories.insert(name, factory);
    }

    pub fn remove_export_factory(
        &mut self,
        factory: &Arc<dyn ExportServiceFactory>,
        properties: &Properties,
    ) {
        let name = factory_key(factory.service_name(), properties);
        match self.export_factories.get(&name) {
            Some(bound) if Arc::ptr_eq(bound, factory) => {}
            _ => {
                debug!(service_name = %name, "Export factory not bound, nothing to remove");
                return;
            }
        }
        self.detach_export_factory(&name, factory);
        info!(service_name = %name, "Export factory removed");
    }

    /// Drop `factory` from the table and tear down everything it exported,
    /// re-queueing the affected services.
    fn detach_export_factory(&mut self, name: &str, factory: &Arc<dyn ExportServiceFactory>) {
        self.export_factories.remove(name);
        let produced: Vec<(u64, i64)> = self
            .exports
            .values()
            .filter(|r| Arc::ptr_eq(&r.factory, factory))
            .map(|r| (r.export_id, r.service_id))
            .collect();
        for (export_id, service_id) in produced {
            self.teardown_export(export_id);
            if self.services.contains_key(&service_id) && !self.to_be_exported.contains(&service_id)
            {
                self.to_be_exported.push_back(service_id);
            }
        }
    }

    // ----- import factories ---------------------------------------------

    pub fn add_import_factory(
        &mut self,
        factory: Arc<dyn ImportServiceFactory>,
        properties: &Properties,
    ) {
        let name = factory_key(factory.service_name(), properties);
        if let Some(previous) = self.import_factories.get(&name).cloned() {
            if Arc::ptr_eq(&previous, &factory) {
                return;
            }
            warn!(interface = %name, "Replacing bound import factory");
            self.detach_import_factory(&name);
        }
        info!(interface = %name, "Import factory added");
        if let Some(entry) = self.import_bookkeeping.get_mut(&name) {
            entry.factory = Some(Arc::clone(&factory));
        }
        self.import_factories.insert(name, factory);
    }

    pub fn remove_import_factory(
        &mut self,
        factory: &Arc<dyn ImportServiceFactory>,
        properties: &Properties,
    ) {
        let name = factory_key(factory.service_name(), properties);
        match self.import_factories.get(&name) {
            Some(bound) if Arc::ptr_eq(bound, factory) => {}
            _ => {
                debug!(interface = %name, "Import factory not bound, nothing to remove");
                return;
            }
        }
        self.detach_import_factory(&name);
        info!(interface = %name, "Import factory removed");
    }

    /// Unbind the factory for `interface`, tear down its imports and put
    /// their endpoints back in the queue. The bookkeeping entry survives.
    fn detach_import_factory(&mut self, interface: &str) {
        self.import_factories.remove(interface);
        let produced: Vec<EndpointDescription> = self
            .imports
            .values()
            .filter(|r| r.description.interface_name() == interface)
            .map(|r| r.description.clone())
            .collect();
        for description in produced {
            self.remove_import(&description);
            self.to_be_imported.push_back(description);
        }
        if let Some(entry) = self.import_bookkeeping.get_mut(interface) {
            entry.factory = None;
        }
    }

    // ----- endpoints ----------------------------------------------------

    /// A remote endpoint was discovered.
    pub fn add_endpoint(&mut self, description: EndpointDescription) {
        if !self.import_local_endpoints && description.framework_uuid() == self.framework_uuid {
            debug!(endpoint_id = %description.id(), "Skipping endpoint exported by this framework");
            return;
        }
        let id = description.id();
        if self.imports.contains_key(id) || self.to_be_imported.iter().any(|d| d.id() == id) {
            debug!(endpoint_id = %id, "Endpoint already known");
            return;
        }
        let interface = description.interface_name().to_string();
        let entry = self
            .import_bookkeeping
            .entry(interface.clone())
            .or_insert_with(|| {
                ImportRegistrationFactory::new(&interface, self.import_factories.get(&interface).cloned())
            });
        entry.endpoints.insert(id.to_string());
        debug!(endpoint_id = %id, interface = %interface, "Queueing endpoint for import");
        self.to_be_imported.push_back(description);
    }

    /// A remote endpoint disappeared.
    ///
    /// The endpoint is looked up by id; the interface it was announced under
    /// is taken from the stored import or queue entry.
    pub fn remove_endpoint(&mut self, description: &EndpointDescription) {
        let id = description.id();
        let known = self
            .imports
            .get(id)
            .map(|r| r.description.clone())
            .or_else(|| self.to_be_imported.iter().find(|d| d.id() == id).cloned());
        let Some(known) = known else {
            debug!(endpoint_id = %id, "Removed endpoint was never known");
            return;
        };
        self.to_be_imported.retain(|d| d.id() != id);
        self.remove_import(&known);

        let interface = known.interface_name();
        let now_unused = match self.import_bookkeeping.get_mut(interface) {
            Some(entry) => {
                entry.endpoints.remove(id);
                entry.endpoints.is_empty()
            }
            None => false,
        };
        if now_unused {
            info!(interface, "No endpoints left, closing import bookkeeping");
            self.import_bookkeeping.remove(interface);
        }
    }

    // ----- reconciliation -----------------------------------------------

    /// Drain both pending queues, matching entries against bound factories.
    ///
    /// Entries that cannot be completed go back to the queue in their
    /// original order; malformed ones are dropped.
    pub fn reconcile(&mut self) {
        let pending_exports = std::mem::take(&mut self.to_be_exported);
        for service_id in pending_exports {
            match self.export_service(service_id) {
                Ok(outcome) if outcome.pending.is_empty() => {}
                Ok(outcome) => {
                    debug!(
                        service_id,
                        created = outcome.created.len(),
                        waiting = ?outcome.pending,
                        "Export pending on factory"
                    );
                    self.to_be_exported.push_back(service_id);
                }
                Err(RsaError::IllegalArgument(reason)) => {
                    warn!(service_id, %reason, "Dropping service from export queue");
                    self.services.remove(&service_id);
                }
                Err(e) => {
                    warn!(service_id, error = %e, "Export failed, will retry on next reconciliation");
                    self.to_be_exported.push_back(service_id);
                }
            }
        }

        let pending_imports = std::mem::take(&mut self.to_be_imported);
        for description in pending_imports {
            match self.import_service(&description) {
                Ok(ImportOutcome::Imported(_)) => {}
                Ok(ImportOutcome::Pending) => self.to_be_imported.push_back(description),
                Err(e) => {
                    warn!(endpoint_id = %description.id(), error = %e, "Import failed, will retry on next reconciliation");
                    self.to_be_imported.push_back(description);
                }
            }
        }
    }

    /// Tear down every export and import; used on shutdown.
    pub fn clear(&mut self) {
        let export_ids: Vec<u64> = self.exports.keys().copied().collect();
        for export_id in export_ids {
            self.teardown_export(export_id);
        }
        let imported: Vec<EndpointDescription> =
            self.imports.values().map(|r| r.description.clone()).collect();
        for description in imported {
            self.remove_import(&description);
        }
        self.services.clear();
        self.to_be_exported.clear();
        self.to_be_imported.clear();
        self.import_bookkeeping.clear();
    }

    // ----- introspection ------------------------------------------------

    pub fn export_registrations(&self) -> Vec<ExportRegistration> {
        self.exports.values().cloned().collect()
    }

    pub fn import_registrations(&self) -> Vec<ImportRegistration> {
        let mut imports: Vec<ImportRegistration> = self.imports.values().cloned().collect();
        imports.sort_by(|a, b| a.endpoint_id().cmp(b.endpoint_id()));
        imports
    }

    pub fn import_bookkeeping(&self, interface: &str) -> Option<&ImportRegistrationFactory> {
        self.import_bookkeeping.get(interface)
    }

    pub fn pending_exports(&self) -> Vec<i64> {
        self.to_be_exported.iter().copied().collect()
    }

    pub fn pending_imports(&self) -> Vec<EndpointDescription> {
        self.to_be_imported.iter().cloned().collect()
    }

    /// Find the handler serving `service_id`, preferring an exact interface
    /// match when the service is exported under several interfaces.
    pub fn find_handler(&self, service_id: i64, interface: &str) -> Option<Arc<dyn EndpointHandler>> {
        let mut candidates = self.exports.values().filter(|r| r.service_id == service_id);
        let first = candidates.next()?;
        if first.interface_name() == interface {
            return Some(first.handler());
        }
        let chosen = candidates
            .find(|r| r.interface_name() == interface)
            .unwrap_or(first);
        Some(chosen.handler())
    }

    pub(crate) fn take_effect(&mut self) -> Option<Effect> {
        self.effects.pop_front()
    }
}

/// Result of one import attempt.
#[derive(Debug)]
pub enum ImportOutcome {
    Imported(ImportRegistration),
    /// No factory bound yet; the endpoint waits in the queue.
    Pending,
}

/// Result of one export attempt.
#[derive(Debug, Default)]
pub struct ExportOutcome {
    /// Registrations created by this attempt.
    pub created: Vec<ExportRegistration>,
    /// Interfaces still waiting for a factory.
    pub pending: Vec<String>,
}
