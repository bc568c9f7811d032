//! Shared error types for the remote service admin.

use thiserror::Error;

/// Top-level error type.
#[derive(Error, Debug)]
pub enum RsaError {
    /// A required property is missing or malformed.
    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    /// No export/import factory is bound for this name. Only used internally
    /// to keep an item pending, never surfaced to callers.
    #[error("No factory available for '{0}'")]
    FactoryUnavailable(String),

    /// The transport could not bind a listener or reach a peer.
    #[error("Transport error: {0}")]
    Transport(String),

    /// A remote call made through an imported proxy failed.
    #[error(transparent)]
    ImportCall(#[from] ImportCallError),

    /// An export factory refused to wrap a service.
    #[error("Export of '{interface}' failed: {cause}")]
    Export {
        /// The interface being exported.
        interface: String,
        /// Why the factory failed.
        cause: String,
    },

    /// An import factory refused to build a proxy.
    #[error("Import of endpoint {endpoint_id} failed: {cause}")]
    Import {
        /// The endpoint being imported.
        endpoint_id: String,
        /// Why the factory failed.
        cause: String,
    },

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failure of a single remote call, reported to the proxy caller.
///
/// A failed call never tears down the import it was made through.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImportCallError {
    /// The transport's request timeout elapsed.
    #[error("Remote call timed out")]
    Timeout,

    /// The peer could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The peer answered with a non-success status.
    #[error("Remote fault (status {status}): {message}")]
    RemoteFault {
        /// Transport status code.
        status: u16,
        /// Reply body or reason phrase.
        message: String,
    },
}

/// Alias for Result with RsaError.
pub type RsaResult<T> = Result<T, RsaError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn call(fail: bool) -> Result<u16, ImportCallError> {
        if fail {
            Err(ImportCallError::RemoteFault {
                status: 404,
                message: "Not Found".into(),
            })
        } else {
            Ok(200)
        }
    }

    fn call_through_admin(fail: bool) -> RsaResult<u16> {
        Ok(call(fail)?)
    }

    #[test]
    fn test_import_call_error_converts_transparently() {
        assert_eq!(call_through_admin(false).unwrap(), 200);
        let err = call_through_admin(true).unwrap_err();
        assert_eq!(err.to_string(), "Remote fault (status 404): Not Found");
        assert!(matches!(
            err,
            RsaError::ImportCall(ImportCallError::RemoteFault { status: 404, .. })
        ));
    }
}
