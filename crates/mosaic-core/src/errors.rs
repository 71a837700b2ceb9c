//! Error types for the core crate.
//!
//! Topology queries never fail (absence is `None`); only the checked
//! mutation helpers and envelope parsing return errors.

use thiserror::Error;

use crate::ids::{ConnectionId, SectionId};

/// Precondition failures reported by checked topology mutations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// The space already participates in a connection.
    #[error("space '{0}' is already connected")]
    AlreadyConnected(String),
    /// A space cannot be connected to itself.
    #[error("space '{0}' cannot be connected to itself")]
    SelfConnection(String),
    /// The space is a secondary and cannot become a primary.
    #[error("space '{0}' is a secondary and cannot act as primary")]
    NotPrimary(String),
    /// No live section has this ID.
    #[error("section {0} does not exist")]
    UnknownSection(SectionId),
    /// No live connection has this ID.
    #[error("connection {0} does not exist")]
    UnknownConnection(ConnectionId),
}

/// Failures decoding a WebSocket frame.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The frame was valid JSON but not an object.
    #[error("frame is not a JSON object")]
    NotAnObject,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_error_display() {
        let err = TopologyError::AlreadyConnected("LocalFour".into());
        assert_eq!(err.to_string(), "space 'LocalFour' is already connected");
        let err = TopologyError::UnknownSection(SectionId(9));
        assert_eq!(err.to_string(), "section 9 does not exist");
    }

    #[test]
    fn protocol_error_from_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        let err: ProtocolError = json_err.into();
        assert!(err.to_string().starts_with("malformed frame"));
        assert_eq!(ProtocolError::NotAnObject.to_string(), "frame is not a JSON object");
    }

    #[test]
    fn unknown_connection_display() {
        let err = TopologyError::UnknownConnection(ConnectionId(4));
        assert_eq!(err.to_string(), "connection 4 does not exist");
    }
}
