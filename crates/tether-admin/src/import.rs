//! Import manager: remote endpoint → local proxy.

use crate::registry::{AdminState, Effect, ImportOutcome, ImportRegistration, ImportRegistrationFactory};
use crate::transport::RemoteInvoker;
use chrono::Utc;
use std::sync::Arc;
use tether_types::{EndpointDescription, RsaError, RsaResult};
use tracing::{debug, info};

impl AdminState {
    /// Build and register a proxy for `description`, or report it pending
    /// when no import factory is bound to its interface.
    pub(crate) fn import_service(
        &mut self,
        description: &EndpointDescription,
    ) -> RsaResult<ImportOutcome> {
        if let Some(existing) = self.imports.get(description.id()) {
            return Ok(ImportOutcome::Imported(existing.clone()));
        }

        let interface = description.interface_name();
        let entry = self
            .import_bookkeeping
            .entry(interface.to_string())
            .or_insert_with(|| {
                ImportRegistrationFactory::new(interface, self.import_factories.get(interface).cloned())
            });
        entry.endpoints.insert(description.id().to_string());

        let Some(factory) = entry.factory.clone() else {
            debug!(endpoint_id = %description.id(), interface, "No import factory bound yet");
            return Ok(ImportOutcome::Pending);
        };

        let invoker = RemoteInvoker::new(description.clone(), Arc::clone(&self.transport));
        let proxy = factory
            .create_proxy(description, invoker)
            .map_err(|cause| RsaError::Import {
                endpoint_id: description.id().to_string(),
                cause,
            })?;

        entry.registrations.push(description.id().to_string());
        let usage = entry.usage_count();

        let registration = ImportRegistration {
            description: description.clone(),
            proxy: Arc::clone(&proxy),
            factory,
            imported_at: Utc::now(),
        };
        self.imports
            .insert(description.id().to_string(), registration.clone());
        self.effects.push_back(Effect::RegisterProxy {
            endpoint_id: description.id().to_string(),
            interface: interface.to_string(),
            proxy,
            properties: description.properties().clone(),
        });

        info!(endpoint_id = %description.id(), interface, usage, "Endpoint imported");
        Ok(ImportOutcome::Imported(registration))
    }

    /// Drop the import of `description`, if any. The bookkeeping entry is
    /// left to the caller.
    pub(crate) fn remove_import(&mut self, description: &EndpointDescription) {
        let id = description.id();
        let Some(registration) = self.imports.remove(id) else {
            return;
        };
        registration.factory.remove_proxy(&registration.description);
        if let Some(entry) = self.import_bookkeeping.get_mut(description.interface_name()) {
            entry.registrations.retain(|r| r != id);
        }
        self.effects.push_back(Effect::UnregisterProxy {
            endpoint_id: id.to_string(),
        });
        debug!(endpoint_id = %id, "Import removed");
    }
}
