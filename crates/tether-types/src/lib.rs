//! Core types for the Tether remote service admin.
//!
//! This crate defines the data structures shared by the admin core, the
//! transport adapters and the CLI: property maps, service filters, endpoint
//! descriptions, configuration and errors. It contains no business logic.

pub mod config;
pub mod constants;
pub mod endpoint;
pub mod error;
pub mod filter;
pub mod properties;

pub use endpoint::EndpointDescription;
pub use error::{ImportCallError, RsaError, RsaResult};
pub use filter::Filter;
pub use properties::Properties;
