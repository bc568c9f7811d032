//! Export manager: local service → network endpoint.

use crate::registry::{AdminState, Effect, ExportOutcome, ExportRegistration};
use crate::service::ServiceObject;
use chrono::Utc;
use std::sync::Arc;
use tether_types::constants::{
    EXPORT_ALL, OBJECTCLASS, SERVICE_EXPORTED_CONFIGS, SERVICE_EXPORTED_INTERFACES, SERVICE_ID,
    SERVICE_IMPORTED_CONFIGS,
};
use tether_types::{EndpointDescription, Properties, RsaError, RsaResult};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Interfaces of a service that should be exported.
///
/// A value of exactly `*` selects every advertised interface; otherwise the
/// requested names are intersected with the advertised ones, keeping
/// advertised order.
pub(crate) fn resolve_interfaces(properties: &Properties) -> RsaResult<Vec<String>> {
    let advertised = properties.get_list(OBJECTCLASS);
    if advertised.is_empty() {
        return Err(RsaError::IllegalArgument(format!(
            "service advertises no {OBJECTCLASS}"
        )));
    }
    if properties.get(SERVICE_EXPORTED_INTERFACES).map(str::trim) == Some(EXPORT_ALL) {
        return Ok(advertised);
    }
    let requested = properties.get_list(SERVICE_EXPORTED_INTERFACES);
    let selected: Vec<String> = advertised
        .into_iter()
        .filter(|a| requested.contains(a))
        .collect();
    if selected.is_empty() {
        return Err(RsaError::IllegalArgument(format!(
            "none of the exported interfaces {requested:?} is advertised"
        )));
    }
    Ok(selected)
}

/// Service properties as carried into an endpoint description.
fn endpoint_base_properties(properties: &Properties) -> Properties {
    properties
        .iter()
        .filter(|(k, _)| {
            ![SERVICE_ID, SERVICE_EXPORTED_INTERFACES, SERVICE_EXPORTED_CONFIGS].contains(k)
        })
        .collect()
}

impl AdminState {
    /// Export every not-yet-exported interface of a tracked service.
    ///
    /// Interfaces without a bound factory are reported in
    /// [`ExportOutcome::pending`]. A factory failure is returned after the
    /// remaining interfaces have been attempted; whatever was created stays.
    pub(crate) fn export_service(&mut self, service_id: i64) -> RsaResult<ExportOutcome> {
        let Some(tracked) = self.services.get(&service_id).cloned() else {
            return Err(RsaError::IllegalArgument(format!(
                "service {service_id} is not tracked"
            )));
        };
        let interfaces = resolve_interfaces(&tracked.properties)?;

        let mut outcome = ExportOutcome::default();
        let mut failure = None;
        for interface in interfaces {
            let already = self
                .exports
                .values()
                .any(|r| r.service_id == service_id && r.interface_name() == interface);
            if already {
                continue;
            }
            match self.install_endpoint(service_id, &tracked.object, &tracked.properties, &interface)
            {
                Ok(registration) => outcome.created.push(registration),
                Err(RsaError::FactoryUnavailable(_)) => outcome.pending.push(interface),
                Err(e) => {
                    outcome.pending.push(interface);
                    failure.get_or_insert(e);
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(outcome),
        }
    }

    /// Create one export registration and queue its publication.
    fn install_endpoint(
        &mut self,
        service_id: i64,
        service: &ServiceObject,
        service_properties: &Properties,
        interface: &str,
    ) -> RsaResult<ExportRegistration> {
        let factory = self
            .export_factories
            .get(interface)
            .cloned()
            .ok_or_else(|| RsaError::FactoryUnavailable(interface.to_string()))?;

        let mut properties = endpoint_base_properties(service_properties);
        let connection = self.transport.endpoint_properties(service_id, interface)?;
        properties.merge(&connection);
        properties.set(SERVICE_IMPORTED_CONFIGS, self.transport.configuration_type());

        let description = EndpointDescription::new(
            Uuid::new_v4().to_string(),
            service_id,
            self.framework_uuid.clone(),
            interface,
            properties,
        );

        let handler = factory
            .create_endpoint(service, &description)
            .map_err(|cause| RsaError::Export {
                interface: interface.to_string(),
                cause,
            })?;

        let export_id = self.next_export_id;
        self.next_export_id += 1;
        let registration = ExportRegistration {
            export_id,
            service_id,
            service: Arc::clone(service),
            description: description.clone(),
            handler,
            factory,
            exported_at: Utc::now(),
        };
        self.exports.insert(export_id, registration.clone());
        self.effects.push_back(Effect::Publish(description));

        info!(
            service_id,
            interface,
            endpoint_id = %registration.description.id(),
            "Service exported"
        );
        Ok(registration)
    }

    /// Tear down every export of `service_id`. Returns how many were removed.
    pub(crate) fn unexport_service(&mut self, service_id: i64) -> usize {
        let export_ids: Vec<u64> = self
            .exports
            .values()
            .filter(|r| r.service_id == service_id)
            .map(|r| r.export_id)
            .collect();
        for export_id in &export_ids {
            self.teardown_export(*export_id);
        }
        export_ids.len()
    }

    /// Remove one export registration, run the factory hook and queue the
    /// retraction.
    pub(crate) fn teardown_export(&mut self, export_id: u64) {
        let Some(registration) = self.exports.remove(&export_id) else {
            warn!(export_id, "Export registration already gone");
            return;
        };
        registration.factory.remove_endpoint(&registration.description);
        debug!(
            export_id,
            endpoint_id = %registration.description.id(),
            "Export torn down"
        );
        self.effects
            .push_back(Effect::Retract(registration.description));
    }
}
