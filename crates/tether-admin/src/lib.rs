//! Remote Service Admin core.
//!
//! Turns local services into network endpoints and discovered endpoints into
//! local proxies, keeping the resulting registrations consistent while
//! services, factories and endpoints come and go concurrently.
//!
//! ## Architecture
//!
//! - **RemoteServiceAdmin**: thread-safe facade; every call is one locked
//!   reconciliation pass
//! - **AdminState**: the registry itself: pending queues, factory tables and
//!   export/import registrations
//! - **ExportServiceFactory / ImportServiceFactory**: late-bound, per-interface
//!   factories wrapping services into handlers and descriptions into proxies
//! - **Transport**: wire binding used to describe and reach endpoints
//! - **Discovery / ServiceSpace**: collaborators notified after the lock is released

pub mod admin;
pub mod config;
pub mod discovery;
mod export;
pub mod factory;
mod import;
pub mod registry;
pub mod service;
pub mod space;
pub mod transport;

pub use admin::RemoteServiceAdmin;
pub use discovery::{Discovery, InProcessDiscovery, NoopDiscovery};
pub use factory::{EndpointHandler, ExportServiceFactory, Factory, ImportServiceFactory};
pub use registry::{ExportRegistration, ImportRegistration, ImportRegistrationFactory};
pub use service::ServiceObject;
pub use space::{LocalServiceSpace, ServiceSpace};
pub use transport::{RemoteInvoker, RemoteReply, Transport};
