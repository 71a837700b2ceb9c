//! Server error types.

use thiserror::Error;

/// Failures starting or running the HTTP/WebSocket listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that was requested.
        addr: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Any other listener I/O failure.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reconciling the peer set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FederationError {
    /// The desired peer set was not a JSON array.
    #[error("peer list must be an array")]
    NotAList,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:80".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 0.0.0.0:80: denied");
    }

    #[test]
    fn not_a_list_display() {
        assert_eq!(FederationError::NotAList.to_string(), "peer list must be an array");
    }
}
