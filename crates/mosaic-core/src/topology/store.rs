//! In-memory store of sections and connections.
//!
//! All operations are synchronous and total. Lookups signal absence with
//! `None`; unchecked mutations on unknown ids are no-ops. The `try_*`
//! variants validate preconditions and report a [`TopologyError`].

use tracing::debug;

use super::arena::SlotArena;
use super::connection::{Connection, ReplicaMapping};
use super::section::{App, Section, SpaceFrames};
use crate::errors::TopologyError;
use crate::ids::{ConnectionId, SectionId};

/// Sections and the connections that mirror spaces onto each other.
#[derive(Clone, Debug, Default)]
pub struct TopologyStore {
    sections: SlotArena<Section>,
    connections: SlotArena<Connection>,
}

impl TopologyStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    // ── Sections ──

    /// Live section with this id.
    pub fn section_for_id(&self, id: SectionId) -> Option<&Section> {
        self.sections.get(id.index())
    }

    /// Whether `id` names a live section.
    pub fn is_valid_section_id(&self, id: SectionId) -> bool {
        self.sections.contains(id.index())
    }

    /// The space a section was authored in.
    pub fn space_for_section<'a>(&self, section: &'a Section) -> Option<&'a str> {
        section.space()
    }

    /// The space of the live section `id`.
    pub fn space_for_section_id(&self, id: SectionId) -> Option<&str> {
        self.section_for_id(id).and_then(Section::space)
    }

    /// App URL of the live section `id`.
    pub fn url_for_section(&self, id: SectionId) -> Option<&str> {
        self.section_for_id(id).and_then(Section::app_url)
    }

    /// Live sections in id order.
    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter().map(|(_, s)| s)
    }

    /// Live sections authored in `space`.
    pub fn sections_for_space(&self, space: &str) -> Vec<&Section> {
        self.sections().filter(|s| s.space() == Some(space)).collect()
    }

    /// Number of live sections.
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    /// Store a new section under the next free id.
    pub fn create_section(&mut self, spaces: SpaceFrames, app: Option<App>) -> SectionId {
        let index = self.sections.insert_with(|i| Section {
            id: SectionId(i),
            spaces,
            app,
        });
        debug!(section_id = index, "section created");
        SectionId(index)
    }

    /// Mutate a live section in place. The id cannot be changed.
    pub fn update_section(
        &mut self,
        id: SectionId,
        update: impl FnOnce(&mut Section),
    ) -> Result<(), TopologyError> {
        let section = self
            .sections
            .get_mut(id.index())
            .ok_or(TopologyError::UnknownSection(id))?;
        update(section);
        section.id = id;
        Ok(())
    }

    /// Tombstone a section and every replica mirroring it.
    ///
    /// Mappings that reference a deleted section are dropped. Returns the
    /// ids actually removed, the requested one first; empty if `id` was
    /// not live.
    pub fn delete_section(&mut self, id: SectionId) -> Vec<SectionId> {
        let Some(section) = self.sections.remove(id.index()) else {
            return Vec::new();
        };
        let mut deleted = vec![id];

        let mut replicas = Vec::new();
        for (_, conn) in self.connections.iter_mut() {
            if section.space().is_some_and(|space| conn.is_primary(space)) {
                replicas.extend(conn.replicas_of(id));
                conn.map.retain(|m| m.primary != id);
            }
            conn.map.retain(|m| m.secondary != id);
        }

        for replica in replicas {
            debug!(section_id = %id, replica = %replica, "cascading replica delete");
            deleted.extend(self.delete_section(replica));
        }
        deleted
    }

    // ── Connections ──

    /// Live connection with this id.
    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(id.index())
    }

    /// Live connections in id order.
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.iter().map(|(_, c)| c)
    }

    /// The connection `space` is primary of, else the one it is a secondary of.
    pub fn connection_for(&self, space: &str) -> Option<&Connection> {
        self.connection_index_for(space)
            .and_then(|i| self.connections.get(i))
    }

    fn connection_index_for(&self, space: &str) -> Option<usize> {
        self.connections
            .iter()
            .find(|(_, c)| c.is_primary(space))
            .or_else(|| self.connections.iter().find(|(_, c)| c.has_secondary(space)))
            .map(|(i, _)| i)
    }

    /// Whether `space` is the primary of a connection.
    pub fn is_primary(&self, space: &str) -> bool {
        self.connections().any(|c| c.is_primary(space))
    }

    /// Whether `space` is a secondary of a connection.
    pub fn is_secondary(&self, space: &str) -> bool {
        self.connections().any(|c| c.has_secondary(space))
    }

    /// Whether `space` participates in any connection.
    pub fn is_connected(&self, space: &str) -> bool {
        self.is_primary(space) || self.is_secondary(space)
    }

    /// Attach `secondary` to `primary`'s connection, creating it if needed.
    ///
    /// Does not check that `secondary` is free; see [`Self::try_connect`].
    pub fn connect(&mut self, primary: &str, secondary: &str) -> ConnectionId {
        if let Some(index) = self.connection_index_for(primary) {
            if let Some(conn) = self.connections.get_mut(index) {
                conn.secondary.push(secondary.to_owned());
            }
            debug!(primary, secondary, connection_id = index, "secondary joined");
            return ConnectionId(index);
        }
        let index = self.connections.insert_with(|i| {
            Connection::new(ConnectionId(i), primary.to_owned(), secondary.to_owned())
        });
        debug!(primary, secondary, connection_id = index, "connection created");
        ConnectionId(index)
    }

    /// [`Self::connect`] with membership preconditions enforced.
    pub fn try_connect(
        &mut self,
        primary: &str,
        secondary: &str,
    ) -> Result<ConnectionId, TopologyError> {
        if primary == secondary {
            return Err(TopologyError::SelfConnection(primary.to_owned()));
        }
        if self.is_connected(secondary) {
            return Err(TopologyError::AlreadyConnected(secondary.to_owned()));
        }
        if self.is_secondary(primary) {
            return Err(TopologyError::NotPrimary(primary.to_owned()));
        }
        Ok(self.connect(primary, secondary))
    }

    /// Detach `space` from its connection.
    ///
    /// A secondary leaving a connection that has other secondaries is
    /// removed from the set, and the replica sections living on it are
    /// tombstoned together with their mappings. In every other case the
    /// whole connection is removed. Returns the tombstoned replica ids.
    pub fn disconnect(&mut self, space: &str) -> Vec<SectionId> {
        let Some(index) = self.connection_index_for(space) else {
            return Vec::new();
        };
        let Some(conn) = self.connections.get(index) else {
            return Vec::new();
        };

        if conn.is_primary(space) || conn.secondary.len() <= 1 {
            let _ = self.connections.remove(index);
            debug!(space, connection_id = index, "connection removed");
            return Vec::new();
        }

        let replicas: Vec<SectionId> = conn
            .map
            .iter()
            .map(|m| m.secondary)
            .filter(|s| self.space_for_section_id(*s) == Some(space))
            .collect();

        if let Some(conn) = self.connections.get_mut(index) {
            conn.secondary.retain(|s| s != space);
            conn.map.retain(|m| !replicas.contains(&m.secondary));
        }
        for replica in &replicas {
            let _ = self.sections.remove(replica.index());
        }
        debug!(space, connection_id = index, replicas = replicas.len(), "secondary left");
        replicas
    }

    /// Record that `secondary` mirrors `primary` within connection `id`.
    ///
    /// Fails with [`TopologyError::UnknownConnection`] if no live
    /// connection has this id.
    pub fn add_replica_mapping(
        &mut self,
        id: ConnectionId,
        primary: SectionId,
        secondary: SectionId,
    ) -> Result<(), TopologyError> {
        let conn = self
            .connections
            .get_mut(id.index())
            .ok_or(TopologyError::UnknownConnection(id))?;
        conn.map.push(ReplicaMapping { primary, secondary });
        Ok(())
    }

    /// Remove the mapping whose replica is `secondary`.
    pub fn remove_replica_mapping(
        &mut self,
        id: ConnectionId,
        secondary: SectionId,
    ) -> Option<ReplicaMapping> {
        let conn = self.connections.get_mut(id.index())?;
        let pos = conn.map.iter().position(|m| m.secondary == secondary)?;
        Some(conn.map.remove(pos))
    }

    /// Replicas of `section` within connection `id`.
    pub fn replicas_of(&self, id: ConnectionId, section: SectionId) -> Vec<SectionId> {
        self.connection(id)
            .map(|c| c.replicas_of(section))
            .unwrap_or_default()
    }

    /// Primary mirrored by replica `section` within connection `id`.
    pub fn primary_of(&self, id: ConnectionId, section: SectionId) -> Option<SectionId> {
        self.connection(id).and_then(|c| c.primary_of(section))
    }

    /// Mark the connection of `space` as (un)initialized.
    ///
    /// Returns `false` if `space` is not connected.
    pub fn set_initialized(&mut self, space: &str, initialized: bool) -> bool {
        let Some(conn) = self
            .connection_index_for(space)
            .and_then(|i| self.connections.get_mut(i))
        else {
            return false;
        };
        conn.is_initialized = initialized;
        true
    }

    /// Run `f` only if `space` is the primary of an initialized connection.
    pub fn with_primary_guard<R>(&self, space: &str, f: impl FnOnce(&Connection) -> R) -> Option<R> {
        let conn = self.connection_for(space)?;
        (conn.is_initialized && conn.is_primary(space)).then(|| f(conn))
    }

    /// Drop every section and connection.
    pub fn clear(&mut self) {
        self.sections.clear();
        self.connections.clear();
    }
}
