//! Endpoint descriptions: the immutable value identifying one remotely
//! reachable service instance.
//!
//! On the wire an endpoint description is nothing but its property map; the
//! typed fields are derived from (and always kept inside) the properties.

use crate::constants::{
    ENDPOINT_FRAMEWORK_UUID, ENDPOINT_ID, ENDPOINT_SERVICE_ID, OBJECTCLASS, SERVICE_IMPORTED,
};
use crate::error::RsaError;
use crate::properties::Properties;
use serde::{Deserialize, Serialize};

/// Describes one exported (service, interface) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Properties", into = "Properties")]
pub struct EndpointDescription {
    id: String,
    service_id: i64,
    framework_uuid: String,
    interface_name: String,
    properties: Properties,
}

impl EndpointDescription {
    /// Build a description, writing the identifying fields into `properties`
    /// together with the imported marker.
    pub fn new(
        id: impl Into<String>,
        service_id: i64,
        framework_uuid: impl Into<String>,
        interface_name: impl Into<String>,
        mut properties: Properties,
    ) -> Self {
        let id = id.into();
        let framework_uuid = framework_uuid.into();
        let interface_name = interface_name.into();
        properties.set(ENDPOINT_ID, id.clone());
        properties.set(ENDPOINT_SERVICE_ID, service_id.to_string());
        properties.set(ENDPOINT_FRAMEWORK_UUID, framework_uuid.clone());
        properties.set(OBJECTCLASS, interface_name.clone());
        properties.set(SERVICE_IMPORTED, "true");
        Self {
            id,
            service_id,
            framework_uuid,
            interface_name,
            properties,
        }
    }

    /// Reconstruct a description from its property map.
    ///
    /// Requires `endpoint.id`, a numeric `endpoint.service.id`,
    /// `endpoint.framework.uuid` and exactly one `objectClass` entry.
    pub fn from_properties(properties: Properties) -> Result<Self, RsaError> {
        let id = required(&properties, ENDPOINT_ID)?.to_string();
        let service_id = required(&properties, ENDPOINT_SERVICE_ID)?
            .trim()
            .parse::<i64>()
            .map_err(|e| {
                RsaError::IllegalArgument(format!("{ENDPOINT_SERVICE_ID} is not a number: {e}"))
            })?;
        let framework_uuid = required(&properties, ENDPOINT_FRAMEWORK_UUID)?.to_string();
        let interfaces = properties.get_list(OBJECTCLASS);
        let interface_name = match interfaces.as_slice() {
            [single] => single.clone(),
            [] => {
                return Err(RsaError::IllegalArgument(format!(
                    "endpoint {id} has no {OBJECTCLASS}"
                )))
            }
            _ => {
                return Err(RsaError::IllegalArgument(format!(
                    "endpoint {id} names more than one interface"
                )))
            }
        };
        Ok(Self::new(
            id,
            service_id,
            framework_uuid,
            interface_name,
            properties,
        ))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn service_id(&self) -> i64 {
        self.service_id
    }

    pub fn framework_uuid(&self) -> &str {
        &self.framework_uuid
    }

    pub fn interface_name(&self) -> &str {
        &self.interface_name
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Shortcut for `properties().get(key)`.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)
    }
}

fn required<'a>(properties: &'a Properties, key: &str) -> Result<&'a str, RsaError> {
    match properties.get(key) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(RsaError::IllegalArgument(format!(
            "missing required property '{key}'"
        ))),
    }
}

impl TryFrom<Properties> for EndpointDescription {
    type Error = RsaError;

    fn try_from(properties: Properties) -> Result<Self, Self::Error> {
        Self::from_properties(properties)
    }
}

impl From<EndpointDescription> for Properties {
    fn from(description: EndpointDescription) -> Self {
        description.properties
    }
}
