//! HTTP reference transport for the Tether remote service admin.
//!
//! Exported endpoints are served at `POST /service/{service_id}/{interface}`
//! by an axum listener; imported proxies reach them through a pooled
//! `reqwest` client. Payloads are opaque bytes in both directions.

pub mod server;
pub mod transport;

pub use server::{router, serve, HttpServerHandle};
pub use transport::HttpTransport;
