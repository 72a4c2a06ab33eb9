use crate::peer::{PeerConnection, PeerLink};
use chorus_core::ParticipantId;
use std::collections::HashMap;

/// A peer's state machine together with the transport it drives.
pub struct PeerEntry {
    pub connection: PeerConnection,
    pub link: Option<PeerLink>,
}

impl PeerEntry {
    pub fn new(connection: PeerConnection, link: PeerLink) -> Self {
        Self {
            connection,
            link: Some(link),
        }
    }

    /// An entry with no transport behind it yet.
    pub fn detached(connection: PeerConnection) -> Self {
        Self {
            connection,
            link: None,
        }
    }
}

/// Active peers of one session. At most one entry per remote participant.
#[derive(Default)]
pub struct PeerTable {
    entries: HashMap<ParticipantId, PeerEntry>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuses to overwrite, handing the entry back if the participant already has one.
    pub fn insert(&mut self, entry: PeerEntry) -> Result<(), PeerEntry> {
        let id = entry.connection.participant_id().clone();
        if self.entries.contains_key(&id) {
            return Err(entry);
        }
        self.entries.insert(id, entry);
        Ok(())
    }

    pub fn get(&self, id: &ParticipantId) -> Option<&PeerEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &ParticipantId) -> Option<&mut PeerEntry> {
        self.entries.get_mut(id)
    }

    pub fn remove(&mut self, id: &ParticipantId) -> Option<PeerEntry> {
        self.entries.remove(id)
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ParticipantId> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &PeerEntry)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&ParticipantId, &mut PeerEntry)> {
        self.entries.iter_mut()
    }

    pub fn drain(&mut self) -> Vec<PeerEntry> {
        self.entries.drain().map(|(_, entry)| entry).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
