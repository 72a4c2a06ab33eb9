pub mod audio;
pub mod config;
pub mod error;
pub mod identity;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use audio::*;
pub use config::MeshConfig;
pub use error::MeshError;
pub use identity::*;
pub use media::*;
pub use peer::*;
pub use session::*;
pub use signaling::*;
