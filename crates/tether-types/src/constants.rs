//! Well-known property keys.
//!
//! These strings travel on the wire inside endpoint descriptions, so they
//! must never change.

/// Comma-separated list of interfaces a service advertises.
pub const OBJECTCLASS: &str = "objectClass";

/// Process-local numeric id of a registered service.
pub const SERVICE_ID: &str = "service.id";

/// Interfaces the service wants exported (`*` for all advertised ones).
pub const SERVICE_EXPORTED_INTERFACES: &str = "service.exported.interfaces";

/// Configuration types the exporter asks for.
pub const SERVICE_EXPORTED_CONFIGS: &str = "service.exported.configs";

/// Marker set on every endpoint description and on every imported proxy.
pub const SERVICE_IMPORTED: &str = "service.imported";

/// Configuration types an importer may use to reach the endpoint.
pub const SERVICE_IMPORTED_CONFIGS: &str = "service.imported.configs";

/// Globally unique endpoint id.
pub const ENDPOINT_ID: &str = "endpoint.id";

/// Service id of the exported service inside the exporting process.
pub const ENDPOINT_SERVICE_ID: &str = "endpoint.service.id";

/// UUID of the exporting process.
pub const ENDPOINT_FRAMEWORK_UUID: &str = "endpoint.framework.uuid";

/// Name a factory registration is keyed by (overrides the factory's own name).
pub const REMOTE_SERVICE_NAME: &str = "remote.service.name";

/// Configuration type of the HTTP transport.
pub const HTTP_CONFIGURATION_TYPE: &str = "tether.remote.admin.http";

/// Endpoint URL used by the HTTP transport.
pub const HTTP_ENDPOINT_URL: &str = "tether.remote.admin.http.url";

/// Value of the exported-interfaces property meaning "every interface".
pub const EXPORT_ALL: &str = "*";
