//! The Remote Service Admin facade.
//!
//! Every mutating call runs one reconciliation pass under the registry mutex,
//! then dispatches the collaborator effects that pass produced with the mutex
//! released. Only one thread dispatches at a time and it keeps draining until
//! the effect queue is empty, so publish/retract and proxy
//! register/unregister calls reach collaborators in the order they were
//! decided, even when a collaborator calls back into the admin.

use crate::discovery::Discovery;
use crate::factory::{EndpointHandler, ExportServiceFactory, Factory, ImportServiceFactory};
use crate::registry::{
    AdminState, Effect, ExportRegistration, ImportRegistration, ImportRegistrationFactory,
};
use crate::service::ServiceObject;
use crate::space::ServiceSpace;
use crate::transport::Transport;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tether_types::config::TetherConfig;
use tether_types::{EndpointDescription, Properties};
use tracing::{debug, info};
use uuid::Uuid;

pub struct RemoteServiceAdmin {
    state: Mutex<AdminState>,
    dispatching: AtomicBool,
    framework_uuid: String,
    transport: Arc<dyn Transport>,
    space: Arc<dyn ServiceSpace>,
    discovery: Arc<dyn Discovery>,
}

/// Clears the dispatching flag even if a collaborator panics.
struct DispatchGuard<'a>(&'a AtomicBool);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RemoteServiceAdmin {
    /// Create an admin. The framework UUID comes from the config, or a fresh
    /// v4 UUID when none is configured.
    pub fn new(
        config: &TetherConfig,
        transport: Arc<dyn Transport>,
        space: Arc<dyn ServiceSpace>,
        discovery: Arc<dyn Discovery>,
    ) -> Arc<Self> {
        let framework_uuid = config
            .framework_uuid
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        info!(
            framework_uuid = %framework_uuid,
            transport = transport.configuration_type(),
            "Remote service admin started"
        );
        Arc::new(Self {
            state: Mutex::new(AdminState::new(
                framework_uuid.clone(),
                config.import_local_endpoints,
                Arc::clone(&transport),
            )),
            dispatching: AtomicBool::new(false),
            framework_uuid,
            transport,
            space,
            discovery,
        })
    }

    pub fn framework_uuid(&self) -> &str {
        &self.framework_uuid
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    fn lock(&self) -> MutexGuard<'_, AdminState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// One atomic step: mutate, reconcile, release, dispatch.
    fn with_state<R>(&self, f: impl FnOnce(&mut AdminState) -> R) -> R {
        let result = {
            let mut state = self.lock();
            let result = f(&mut state);
            state.reconcile();
            result
        };
        self.dispatch_effects();
        result
    }

    fn dispatch_effects(&self) {
        loop {
            if self
                .dispatching
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // The active dispatcher drains what we queued.
                return;
            }
            {
                let _guard = DispatchGuard(&self.dispatching);
                loop {
                    let effect = self.lock().take_effect();
                    match effect {
                        Some(effect) => self.apply(effect),
                        None => break,
                    }
                }
            }
            // Effects queued between the last pop and clearing the flag.
            if self.lock().effects.is_empty() {
                return;
            }
        }
    }

    fn apply(&self, effect: Effect) {
        debug!(?effect, "Dispatching effect");
        match effect {
            Effect::Publish(description) => self.discovery.publish_endpoint(&description),
            Effect::Retract(description) => self.discovery.retract_endpoint(&description),
            Effect::RegisterProxy {
                endpoint_id,
                interface,
                proxy,
                properties,
            } => self
                .space
                .register_proxy(&endpoint_id, &interface, proxy, properties),
            Effect::UnregisterProxy { endpoint_id } => self.space.unregister_proxy(&endpoint_id),
        }
    }

    // ----- notifications --------------------------------------------------

    /// A local service was registered.
    pub fn add_service(&self, service: ServiceObject, properties: &Properties) {
        self.with_state(|s| s.add_service(service, properties));
    }

    /// A local service was unregistered.
    pub fn remove_service(&self, properties: &Properties) {
        self.with_state(|s| s.remove_service(properties));
    }

    pub fn add_export_factory(&self, factory: Arc<dyn ExportServiceFactory>, properties: &Properties) {
        self.with_state(|s| s.add_export_factory(factory, properties));
    }

    pub fn remove_export_factory(
        &self,
        factory: &Arc<dyn ExportServiceFactory>,
        properties: &Properties,
    ) {
        self.with_state(|s| s.remove_export_factory(factory, properties));
    }

    pub fn add_import_factory(&self, factory: Arc<dyn ImportServiceFactory>, properties: &Properties) {
        self.with_state(|s| s.add_import_factory(factory, properties));
    }

    pub fn remove_import_factory(
        &self,
        factory: &Arc<dyn ImportServiceFactory>,
        properties: &Properties,
    ) {
        self.with_state(|s| s.remove_import_factory(factory, properties));
    }

    /// Register either kind of factory.
    pub fn add_factory(&self, factory: Factory, properties: &Properties) {
        match factory {
            Factory::Export(f) => self.add_export_factory(f, properties),
            Factory::Import(f) => self.add_import_factory(f, properties),
        }
    }

    /// Unregister either kind of factory.
    pub fn remove_factory(&self, factory: &Factory, properties: &Properties) {
        match factory {
            Factory::Export(f) => self.remove_export_factory(f, properties),
            Factory::Import(f) => self.remove_import_factory(f, properties),
        }
    }

    /// Discovery found a remote endpoint.
    pub fn add_endpoint(&self, description: EndpointDescription) {
        self.with_state(|s| s.add_endpoint(description));
    }

    /// Discovery lost a remote endpoint.
    pub fn remove_endpoint(&self, description: &EndpointDescription) {
        self.with_state(|s| s.remove_endpoint(description));
    }

    /// Tear down every export and import.
    pub fn stop(&self) {
        info!(framework_uuid = %self.framework_uuid, "Stopping remote service admin");
        self.with_state(|s| s.clear());
    }

    // ----- lookups --------------------------------------------------------

    /// Request handler for an inbound call, cloned out of the registry so the
    /// caller can run it without the lock.
    pub fn endpoint_handler(&self, service_id: i64, interface: &str) -> Option<Arc<dyn EndpointHandler>> {
        self.lock().find_handler(service_id, interface)
    }

    pub fn export_registrations(&self) -> Vec<ExportRegistration> {
        self.lock().export_registrations()
    }

    pub fn import_registrations(&self) -> Vec<ImportRegistration> {
        self.lock().import_registrations()
    }

    /// Descriptions of every live export, in export order.
    pub fn exported_endpoints(&self) -> Vec<EndpointDescription> {
        self.export_registrations()
            .into_iter()
            .map(|r| r.description)
            .collect()
    }

    /// Descriptions of every live import, ordered by endpoint id.
    pub fn imported_endpoints(&self) -> Vec<EndpointDescription> {
        self.import_registrations()
            .into_iter()
            .map(|r| r.description)
            .collect()
    }

    /// Service ids waiting for an export factory.
    pub fn pending_exports(&self) -> Vec<i64> {
        self.lock().pending_exports()
    }

    /// Endpoints waiting for an import factory.
    pub fn pending_imports(&self) -> Vec<EndpointDescription> {
        self.lock().pending_imports()
    }

    /// Bookkeeping entry of an interface, while one exists.
    pub fn import_bookkeeping(&self, interface: &str) -> Option<ImportRegistrationFactory> {
        self.lock().import_bookkeeping(interface).cloned()
    }

    /// Live imports of `interface`; `None` once its bookkeeping is gone.
    pub fn import_usage(&self, interface: &str) -> Option<usize> {
        self.lock()
            .import_bookkeeping(interface)
            .map(ImportRegistrationFactory::usage_count)
    }
}

impl std::fmt::Debug for RemoteServiceAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteServiceAdmin")
            .field("framework_uuid", &self.framework_uuid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::InProcessDiscovery;
    use crate::service::{downcast_service, service_object};
    use crate::space::LocalServiceSpace;
    use crate::transport::{RemoteInvoker, RemoteReply};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;
    use tether_types::constants::*;
    use tether_types::{ImportCallError, RsaError};

    const CALC: &str = "com.example.Calc";

    struct MockTransport {
        sent: Mutex<Vec<(String, Bytes)>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                sent: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn configuration_type(&self) -> &str {
            "tether.remote.admin.mock"
        }

        fn endpoint_properties(
            &self,
            service_id: i64,
            interface: &str,
        ) -> Result<Properties, RsaError> {
            Ok(Properties::from([(
                "mock.url",
                format!("mock://{service_id}/{interface}"),
            )]))
        }

        async fn send(
            &self,
            endpoint: &EndpointDescription,
            payload: Bytes,
        ) -> Result<RemoteReply, ImportCallError> {
            self.sent
                .lock()
                .unwrap()
                .push((endpoint.id().to_string(), payload));
            Ok(RemoteReply {
                status: 200,
                payload: Bytes::from_static(br#"{"result":3}"#),
            })
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl EndpointHandler for EchoHandler {
        async fn handle_request(&self, payload: Bytes) -> Option<Bytes> {
            Some(payload)
        }
    }

    struct EchoExportFactory {
        name: String,
        removed: AtomicUsize,
    }

    impl EchoExportFactory {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                removed: AtomicUsize::new(0),
            })
        }
    }

    impl ExportServiceFactory for EchoExportFactory {
        fn service_name(&self) -> &str {
            &self.name
        }

        fn create_endpoint(
            &self,
            _service: &ServiceObject,
            _description: &EndpointDescription,
        ) -> Result<Arc<dyn EndpointHandler>, String> {
            Ok(Arc::new(EchoHandler))
        }

        fn remove_endpoint(&self, _description: &EndpointDescription) {
            self.removed.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct BrokenExportFactory(&'static str);

    impl ExportServiceFactory for BrokenExportFactory {
        fn service_name(&self) -> &str {
            self.0
        }

        fn create_endpoint(
            &self,
            _service: &ServiceObject,
            _description: &EndpointDescription,
        ) -> Result<Arc<dyn EndpointHandler>, String> {
            Err("endpoint construction failed".to_string())
        }
    }

    struct CalcProxy {
        invoker: RemoteInvoker,
    }

    struct CalcImportFactory {
        name: String,
        fail: AtomicBool,
    }

    impl CalcImportFactory {
        fn new(name: &str) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail: AtomicBool::new(false),
            })
        }
    }

    impl ImportServiceFactory for CalcImportFactory {
        fn service_name(&self) -> &str {
            &self.name
        }

        fn create_proxy(
            &self,
            _description: &EndpointDescription,
            invoker: RemoteInvoker,
        ) -> Result<ServiceObject, String> {
            if self.fail.load(Ordering::SeqCst) {
                return Err("proxy construction failed".to_string());
            }
            Ok(service_object(CalcProxy { invoker }))
        }
    }

    #[derive(Default)]
    struct RecordingDiscovery {
        events: Mutex<Vec<String>>,
    }

    impl RecordingDiscovery {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl Discovery for RecordingDiscovery {
        fn publish_endpoint(&self, endpoint: &EndpointDescription) {
            self.events
                .lock()
                .unwrap()
                .push(format!("publish:{}", endpoint.id()));
        }

        fn retract_endpoint(&self, endpoint: &EndpointDescription) {
            self.events
                .lock()
                .unwrap()
                .push(format!("retract:{}", endpoint.id()));
        }
    }

    struct Fixture {
        admin: Arc<RemoteServiceAdmin>,
        transport: Arc<MockTransport>,
        space: Arc<LocalServiceSpace>,
        discovery: Arc<RecordingDiscovery>,
    }

    fn fixture() -> Fixture {
        let config = TetherConfig {
            framework_uuid: Some("local-fw".to_string()),
            ..Default::default()
        };
        let transport = MockTransport::new();
        let space = Arc::new(LocalServiceSpace::new());
        let discovery = Arc::new(RecordingDiscovery::default());
        let admin = RemoteServiceAdmin::new(
            &config,
            transport.clone(),
            space.clone(),
            discovery.clone(),
        );
        Fixture {
            admin,
            transport,
            space,
            discovery,
        }
    }

    fn service_props(id: i64, classes: &str, exported: &str) -> Properties {
        Properties::from([
            (SERVICE_ID, id.to_string()),
            (OBJECTCLASS, classes.to_string()),
            (SERVICE_EXPORTED_INTERFACES, exported.to_string()),
        ])
    }

    fn remote_endpoint(id: &str, interface: &str) -> EndpointDescription {
        EndpointDescription::new(
            id,
            42,
            "remote-fw",
            interface,
            Properties::from([(
                HTTP_ENDPOINT_URL,
                format!("http://host:8888/service/42/{interface}"),
            )]),
        )
    }

    #[test]
    fn test_wildcard_exports_every_interface() {
        let f = fixture();
        f.admin.add_export_factory(EchoExportFactory::new("A"), &Properties::new());
        f.admin.add_export_factory(EchoExportFactory::new("B"), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(7, "A,B", "*"));

        let exported = f.admin.exported_endpoints();
        assert_eq!(exported.len(), 2);
        assert_ne!(exported[0].id(), exported[1].id());
        let mut interfaces: Vec<&str> = exported.iter().map(|d| d.interface_name()).collect();
        interfaces.sort();
        assert_eq!(interfaces, vec!["A", "B"]);
        assert!(f.admin.pending_exports().is_empty());
        assert_eq!(f.discovery.events().len(), 2);
    }

    #[test]
    fn test_export_intersects_requested_interfaces() {
        let f = fixture();
        f.admin.add_export_factory(EchoExportFactory::new("A"), &Properties::new());
        f.admin.add_export_factory(EchoExportFactory::new("B"), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(7, "A,B", "A"));

        let exported = f.admin.exported_endpoints();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].interface_name(), "A");
    }

    #[test]
    fn test_scenario_calc_description() {
        let f = fixture();
        f.admin.add_export_factory(EchoExportFactory::new(CALC), &Properties::new());
        let props = service_props(42, CALC, "*").with("region", "eu");
        f.admin.add_service(service_object(()), &props);

        let exported = f.admin.exported_endpoints();
        assert_eq!(exported.len(), 1);
        let d = &exported[0];
        assert_eq!(d.service_id(), 42);
        assert_eq!(d.interface_name(), CALC);
        assert!(!d.id().is_empty());
        assert_eq!(d.framework_uuid(), "local-fw");
        assert_eq!(d.property("region"), Some("eu"));
        assert_eq!(d.property("mock.url"), Some("mock://42/com.example.Calc"));
        assert_eq!(d.property(SERVICE_IMPORTED), Some("true"));
        assert_eq!(
            d.property(SERVICE_IMPORTED_CONFIGS),
            Some("tether.remote.admin.mock")
        );
        assert!(d.property(SERVICE_EXPORTED_INTERFACES).is_none());
        assert!(d.property(SERVICE_ID).is_none());

        let handler = f.admin.endpoint_handler(42, CALC).unwrap();
        let reply = tokio_test::block_on(handler.handle_request(Bytes::from_static(b"ping")));
        assert_eq!(reply, Some(Bytes::from_static(b"ping")));
        assert!(f.admin.endpoint_handler(43, CALC).is_none());
    }

    #[test]
    fn test_service_waits_for_export_factory() {
        let f = fixture();
        f.admin
            .add_service(service_object(()), &service_props(7, CALC, "*"));
        assert_eq!(f.admin.pending_exports(), vec![7]);
        assert!(f.admin.exported_endpoints().is_empty());

        f.admin.add_export_factory(EchoExportFactory::new(CALC), &Properties::new());
        assert!(f.admin.pending_exports().is_empty());
        assert_eq!(f.admin.exported_endpoints().len(), 1);
    }

    #[test]
    fn test_partial_export_stays_pending() {
        let f = fixture();
        f.admin.add_export_factory(EchoExportFactory::new("A"), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(7, "A,B", "*"));
        assert_eq!(f.admin.exported_endpoints().len(), 1);
        assert_eq!(f.admin.pending_exports(), vec![7]);

        f.admin.add_export_factory(EchoExportFactory::new("B"), &Properties::new());
        assert_eq!(f.admin.exported_endpoints().len(), 2);
        assert!(f.admin.pending_exports().is_empty());
    }

    #[test]
    fn test_export_factory_failure_stays_queued() {
        let f = fixture();
        f.admin
            .add_export_factory(Arc::new(BrokenExportFactory("A")), &Properties::new());
        f.admin.add_export_factory(EchoExportFactory::new("B"), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(7, "A,B", "*"));

        let exported = f.admin.exported_endpoints();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].interface_name(), "B");
        assert_eq!(f.admin.pending_exports(), vec![7]);

        f.admin.add_export_factory(EchoExportFactory::new("A"), &Properties::new());
        assert_eq!(f.admin.exported_endpoints().len(), 2);
        assert!(f.admin.pending_exports().is_empty());
        assert_eq!(f.discovery.events().len(), 2);
    }

    #[test]
    fn test_non_exportable_and_malformed_services_ignored() {
        let f = fixture();
        f.admin.add_export_factory(EchoExportFactory::new(CALC), &Properties::new());
        f.admin.add_service(
            service_object(()),
            &Properties::from([(SERVICE_ID, "1"), (OBJECTCLASS, CALC)]),
        );
        f.admin.add_service(
            service_object(()),
            &Properties::from([(OBJECTCLASS, CALC), (SERVICE_EXPORTED_INTERFACES, "*")]),
        );
        f.admin.add_service(
            service_object(()),
            &Properties::from([(SERVICE_ID, "3"), (SERVICE_EXPORTED_INTERFACES, "*")]),
        );
        f.admin.add_service(
            service_object(()),
            &service_props(4, CALC, "*").with(SERVICE_IMPORTED, "true"),
        );
        assert!(f.admin.exported_endpoints().is_empty());
        assert!(f.admin.pending_exports().is_empty());
    }

    #[test]
    fn test_remove_service_twice_is_noop() {
        let f = fixture();
        let factory = EchoExportFactory::new(CALC);
        f.admin.add_export_factory(factory.clone(), &Properties::new());
        let props = service_props(42, CALC, "*");
        f.admin.add_service(service_object(()), &props);
        let endpoint_id = f.admin.exported_endpoints()[0].id().to_string();

        f.admin.remove_service(&props);
        f.admin.remove_service(&props);
        assert!(f.admin.exported_endpoints().is_empty());
        assert!(f.admin.endpoint_handler(42, CALC).is_none());
        assert_eq!(factory.removed.load(Ordering::SeqCst), 1);
        assert_eq!(
            f.discovery.events(),
            vec![format!("publish:{endpoint_id}"), format!("retract:{endpoint_id}")]
        );
    }

    #[test]
    fn test_export_factory_removal_requeues_service() {
        let f = fixture();
        let factory = EchoExportFactory::new(CALC);
        let as_dyn: Arc<dyn ExportServiceFactory> = factory.clone();
        f.admin.add_export_factory(as_dyn.clone(), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(42, CALC, "*"));
        let first = f.admin.exported_endpoints()[0].id().to_string();

        f.admin.remove_export_factory(&as_dyn, &Properties::new());
        assert!(f.admin.exported_endpoints().is_empty());
        assert_eq!(f.admin.pending_exports(), vec![42]);
        assert_eq!(factory.removed.load(Ordering::SeqCst), 1);

        f.admin.add_export_factory(as_dyn, &Properties::new());
        let exported = f.admin.exported_endpoints();
        assert_eq!(exported.len(), 1);
        assert_ne!(exported[0].id(), first);
    }

    #[test]
    fn test_remove_unbound_export_factory_ignored() {
        let f = fixture();
        f.admin.add_export_factory(EchoExportFactory::new(CALC), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(42, CALC, "*"));

        let stranger: Arc<dyn ExportServiceFactory> = EchoExportFactory::new(CALC);
        f.admin.remove_export_factory(&stranger, &Properties::new());
        assert_eq!(f.admin.exported_endpoints().len(), 1);
    }

    #[test]
    fn test_remote_service_name_keys_factory() {
        let f = fixture();
        f.admin.add_factory(
            Factory::Export(EchoExportFactory::new("ignored")),
            &Properties::from([(REMOTE_SERVICE_NAME, CALC)]),
        );
        f.admin
            .add_service(service_object(()), &service_props(42, CALC, "*"));
        assert_eq!(f.admin.exported_endpoints().len(), 1);
    }

    #[test]
    fn test_import_factory_before_or_after_endpoint() {
        let before = fixture();
        before
            .admin
            .add_import_factory(CalcImportFactory::new(CALC), &Properties::new());
        before.admin.add_endpoint(remote_endpoint("e1", CALC));

        let after = fixture();
        after.admin.add_endpoint(remote_endpoint("e1", CALC));
        assert_eq!(after.admin.pending_imports().len(), 1);
        assert_eq!(after.admin.import_usage(CALC), Some(0));
        after
            .admin
            .add_import_factory(CalcImportFactory::new(CALC), &Properties::new());

        for f in [&before, &after] {
            let imported = f.admin.imported_endpoints();
            assert_eq!(imported.len(), 1);
            assert_eq!(imported[0].id(), "e1");
            assert!(f.admin.pending_imports().is_empty());
            assert_eq!(f.admin.import_usage(CALC), Some(1));
            assert!(f.space.get(CALC).is_some());
        }
    }

    #[test]
    fn test_usage_count_and_bookkeeping_teardown() {
        let f = fixture();
        f.admin
            .add_import_factory(CalcImportFactory::new("X"), &Properties::new());
        let e1 = remote_endpoint("e1", "X");
        let e2 = remote_endpoint("e2", "X");
        f.admin.add_endpoint(e1.clone());
        f.admin.add_endpoint(e2.clone());
        assert_eq!(f.admin.import_usage("X"), Some(2));
        assert_eq!(f.space.len(), 2);

        f.admin.remove_endpoint(&e1);
        assert_eq!(f.admin.import_usage("X"), Some(1));
        assert_eq!(f.space.len(), 1);

        f.admin.remove_endpoint(&e2);
        assert_eq!(f.admin.import_usage("X"), None);
        assert!(f.space.is_empty());
    }

    #[test]
    fn test_import_factory_removal_preserves_bookkeeping() {
        let f = fixture();
        let factory: Arc<dyn ImportServiceFactory> = CalcImportFactory::new(CALC);
        f.admin.add_import_factory(factory.clone(), &Properties::new());
        f.admin.add_endpoint(remote_endpoint("e1", CALC));
        assert_eq!(f.space.len(), 1);

        f.admin.remove_import_factory(&factory, &Properties::new());
        assert!(f.admin.imported_endpoints().is_empty());
        assert_eq!(f.admin.pending_imports().len(), 1);
        assert!(f.space.is_empty());
        let entry = f.admin.import_bookkeeping(CALC).unwrap();
        assert_eq!(entry.usage_count(), 0);
        assert_eq!(entry.endpoint_count(), 1);
        assert!(!entry.has_factory());

        f.admin.add_import_factory(factory, &Properties::new());
        assert_eq!(f.admin.import_usage(CALC), Some(1));
    }

    #[test]
    fn test_failed_proxy_construction_requeues() {
        let f = fixture();
        let factory = CalcImportFactory::new(CALC);
        factory.fail.store(true, Ordering::SeqCst);
        f.admin.add_import_factory(factory.clone(), &Properties::new());
        f.admin.add_endpoint(remote_endpoint("e1", CALC));
        assert_eq!(f.admin.pending_imports().len(), 1);
        assert!(f.space.is_empty());

        factory.fail.store(false, Ordering::SeqCst);
        f.admin.add_endpoint(remote_endpoint("e2", CALC));
        assert_eq!(f.admin.imported_endpoints().len(), 2);
        assert!(f.admin.pending_imports().is_empty());
    }

    #[test]
    fn test_duplicate_and_local_endpoints_ignored() {
        let f = fixture();
        f.admin
            .add_import_factory(CalcImportFactory::new(CALC), &Properties::new());
        f.admin.add_endpoint(remote_endpoint("e1", CALC));
        f.admin.add_endpoint(remote_endpoint("e1", CALC));
        assert_eq!(f.admin.import_usage(CALC), Some(1));

        let local = EndpointDescription::new("e9", 1, "local-fw", CALC, Properties::new());
        f.admin.add_endpoint(local);
        assert_eq!(f.admin.imported_endpoints().len(), 1);
    }

    #[test]
    fn test_pending_endpoint_removed_before_import() {
        let f = fixture();
        let e1 = remote_endpoint("e1", CALC);
        f.admin.add_endpoint(e1.clone());
        f.admin.remove_endpoint(&e1);
        assert!(f.admin.pending_imports().is_empty());
        assert!(f.admin.import_bookkeeping(CALC).is_none());

        f.admin
            .add_import_factory(CalcImportFactory::new(CALC), &Properties::new());
        assert!(f.admin.imported_endpoints().is_empty());
    }

    #[test]
    fn test_proxy_invocation_goes_through_transport() {
        let f = fixture();
        f.admin.add_endpoint(remote_endpoint("e1", CALC));
        f.admin
            .add_import_factory(CalcImportFactory::new(CALC), &Properties::new());

        let proxy = downcast_service::<CalcProxy>(&f.space.get(CALC).unwrap()).unwrap();
        assert_eq!(
            proxy.invoker.endpoint().property(HTTP_ENDPOINT_URL),
            Some("http://host:8888/service/42/com.example.Calc")
        );
        let reply = tokio_test::block_on(proxy.invoker.invoke(r#"{"op":"add","a":1,"b":2}"#));
        assert_eq!(reply.unwrap(), Bytes::from_static(br#"{"result":3}"#));

        let sent = f.transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "e1");
        assert_eq!(sent[0].1, Bytes::from_static(br#"{"op":"add","a":1,"b":2}"#));
    }

    #[test]
    fn test_stop_tears_everything_down() {
        let f = fixture();
        let exporter = EchoExportFactory::new(CALC);
        f.admin.add_export_factory(exporter.clone(), &Properties::new());
        f.admin
            .add_import_factory(CalcImportFactory::new(CALC), &Properties::new());
        f.admin
            .add_service(service_object(()), &service_props(42, CALC, "*"));
        f.admin.add_endpoint(remote_endpoint("e1", CALC));

        f.admin.stop();
        assert!(f.admin.exported_endpoints().is_empty());
        assert!(f.admin.imported_endpoints().is_empty());
        assert!(f.space.is_empty());
        assert_eq!(exporter.removed.load(Ordering::SeqCst), 1);
        assert!(f.discovery.events().last().unwrap().starts_with("retract:"));
    }

    #[test]
    fn test_reentrant_discovery_imports_own_endpoint() {
        let config = TetherConfig {
            import_local_endpoints: true,
            ..Default::default()
        };
        let discovery = Arc::new(InProcessDiscovery::new());
        let space = Arc::new(LocalServiceSpace::new());
        let admin = RemoteServiceAdmin::new(&config, MockTransport::new(), space.clone(), discovery.clone());
        discovery.attach(&admin);

        admin.add_export_factory(EchoExportFactory::new(CALC), &Properties::new());
        admin.add_import_factory(CalcImportFactory::new(CALC), &Properties::new());
        let props = service_props(42, CALC, "*");
        admin.add_service(service_object(()), &props);

        let exported = admin.exported_endpoints();
        assert_eq!(exported.len(), 1);
        assert_eq!(admin.imported_endpoints(), exported);
        assert_eq!(space.len(), 1);

        admin.remove_service(&props);
        assert!(admin.imported_endpoints().is_empty());
        assert!(space.is_empty());
        assert!(discovery.published().is_empty());
    }

    #[test]
    fn test_concurrent_mutation_converges() {
        const THREADS: i64 = 8;
        const ROUNDS: i64 = 25;

        let config = TetherConfig {
            import_local_endpoints: true,
            ..Default::default()
        };
        let discovery = Arc::new(InProcessDiscovery::new());
        let space = Arc::new(LocalServiceSpace::new());
        let admin =
            RemoteServiceAdmin::new(&config, MockTransport::new(), space.clone(), discovery.clone());
        discovery.attach(&admin);

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let admin = Arc::clone(&admin);
                std::thread::spawn(move || {
                    let interface = format!("com.example.Worker{t}");
                    for i in 0..ROUNDS {
                        if i == ROUNDS / 2 {
                            admin.add_export_factory(
                                EchoExportFactory::new(&interface),
                                &Properties::new(),
                            );
                            admin.add_import_factory(
                                CalcImportFactory::new(&interface),
                                &Properties::new(),
                            );
                        }
                        let props = service_props(t * 1000 + i, &interface, "*");
                        admin.add_service(service_object(()), &props);
                        if i % 2 == 0 {
                            admin.remove_service(&props);
                        }
                    }
                    // Replacing the factory re-exports every service of this interface.
                    admin.add_export_factory(
                        EchoExportFactory::new(&interface),
                        &Properties::new(),
                    );
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let sorted_ids = |endpoints: Vec<EndpointDescription>| {
            let mut ids: Vec<String> = endpoints.iter().map(|d| d.id().to_string()).collect();
            ids.sort();
            ids
        };
        let exported = sorted_ids(admin.exported_endpoints());
        let expected = (THREADS * (ROUNDS / 2)) as usize;
        assert_eq!(exported.len(), expected);
        assert!(admin.pending_exports().is_empty());
        assert!(admin.pending_imports().is_empty());
        assert_eq!(sorted_ids(admin.imported_endpoints()), exported);
        assert_eq!(sorted_ids(discovery.published()), exported);
        assert_eq!(space.len(), expected);
    }
}
