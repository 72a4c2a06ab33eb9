mod outbox;
mod presence_tracker;
mod reconnection_supervisor;
mod session_command;
mod session_coordinator;
mod session_event;
mod voice_client;

pub use outbox::*;
pub use presence_tracker::*;
pub use reconnection_supervisor::*;
pub use session_command::*;
pub use session_coordinator::*;
pub use session_event::*;
pub use voice_client::*;
