use crate::session::RosterEntry;
use tokio::sync::oneshot;

/// Local intents sent from a `VoiceSession` handle to its coordinator.
#[derive(Debug)]
pub enum SessionCommand {
    SetMuted {
        muted: bool,
        reply: oneshot::Sender<()>,
    },
    Roster {
        reply: oneshot::Sender<Vec<RosterEntry>>,
    },
    /// Resolves once every peer is closed and the subscription is cancelled.
    Leave { reply: oneshot::Sender<()> },
}
