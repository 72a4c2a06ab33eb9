mod media_transport;
mod peer_event;
mod webrtc_transport;

pub use media_transport::*;
pub use peer_event::*;
pub use webrtc_transport::*;
