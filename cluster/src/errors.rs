use crate::config::ValidationError;
use shared::tls::TlsError;
use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias for cluster operations
pub type Result<T, E = ClusterError> = std::result::Result<T, E>;

/// Errors raised while routing a request to its owning member
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("Failed to read response body from {0}: {1}")]
    ResponseBodyError(String, String),

    #[error("Invalid URI for member {0}: {1}")]
    InvalidUri(String, String),

    #[error("Request to member {0} failed: {1}")]
    UpstreamRequestFailed(String, String),

    #[error("Request to member {0} timed out")]
    UpstreamTimeout(String),

    #[error("Invalid cluster configuration: {0}")]
    Config(#[from] ValidationError),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] TlsError),

    #[error("rustls error: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Renders an error together with its sources, e.g.
/// `client error (Connect): tcp connect error: Connection refused (os error 111)`.
pub fn error_chain(error: &(dyn StdError + 'static)) -> String {
    let mut rendered = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        rendered.push_str(": ");
        rendered.push_str(&cause.to_string());
        source = cause.source();
    }
    rendered
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[derive(Error, Debug)]
    #[error("outer")]
    struct Outer(#[source] io::Error);

    #[test]
    fn test_error_chain_includes_sources() {
        let err = Outer(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        assert_eq!(error_chain(&err), "outer: refused");
    }
}
