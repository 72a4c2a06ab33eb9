use chorus_core::{ParticipantId, ParticipantName};

/// Who the local actor is inside a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub id: ParticipantId,
    pub name: ParticipantName,
}

impl LocalIdentity {
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: ParticipantName::new(name),
        }
    }

    /// A throwaway identity with a random id.
    pub fn anonymous(name: impl Into<String>) -> Self {
        Self {
            id: ParticipantId::random(),
            name: ParticipantName::new(name),
        }
    }
}

/// Resolves the local actor to a stable participant id and display name.
pub trait IdentityProvider: Send + Sync {
    fn identify(&self) -> LocalIdentity;
}

impl IdentityProvider for LocalIdentity {
    fn identify(&self) -> LocalIdentity {
        self.clone()
    }
}
