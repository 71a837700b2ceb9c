//! Connections: one primary space mirrored onto secondary spaces.

use serde::{Deserialize, Serialize};

use crate::ids::{ConnectionId, SectionId};

/// Records which replica section on a secondary mirrors which primary section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaMapping {
    /// Section on the primary space.
    pub primary: SectionId,
    /// Replica section on a secondary space.
    pub secondary: SectionId,
}

/// A replication relationship from a primary space.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Stable slot id.
    pub id: ConnectionId,
    /// The mirrored space.
    pub primary: String,
    /// Secondary spaces in join order.
    pub secondary: Vec<String>,
    /// Replica mappings across all secondaries.
    pub map: Vec<ReplicaMapping>,
    /// True once created.
    pub is_connected: bool,
    /// Set externally once the replication handshake completes.
    pub is_initialized: bool,
    /// Reserved identifier, unused by the topology itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl Connection {
    pub(crate) fn new(id: ConnectionId, primary: String, secondary: String) -> Self {
        Self {
            id,
            primary,
            secondary: vec![secondary],
            map: Vec::new(),
            is_connected: true,
            is_initialized: false,
            uuid: None,
        }
    }

    /// Whether `space` is this connection's primary.
    pub fn is_primary(&self, space: &str) -> bool {
        self.primary == space
    }

    /// Whether `space` is one of the secondaries.
    pub fn has_secondary(&self, space: &str) -> bool {
        self.secondary.iter().any(|s| s == space)
    }

    /// Replica ids mirroring `section`.
    pub fn replicas_of(&self, section: SectionId) -> Vec<SectionId> {
        self.map
            .iter()
            .filter(|m| m.primary == section)
            .map(|m| m.secondary)
            .collect()
    }

    /// Primary section mirrored by replica `section`.
    ///
    /// Callers are expected to know `section` is a replica; `None` otherwise.
    pub fn primary_of(&self, section: SectionId) -> Option<SectionId> {
        self.map
            .iter()
            .find(|m| m.secondary == section)
            .map(|m| m.primary)
    }
}
