pub use chorus_core::model::{ParticipantId, SessionId};
pub use chorus_mesh::{MeshConfig, MeshError, SessionEvent, VoiceClient, VoiceSession};

pub mod model {
    pub use chorus_core::model::*;
}

pub mod codec {
    pub use chorus_core::codec::*;
}

pub mod mesh {
    pub use chorus_mesh::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use chorus_relay::*;
}
