mod memory_hub;
mod signaling_transport;
mod ws_transport;

pub use memory_hub::*;
pub use signaling_transport::*;
pub use ws_transport::*;
