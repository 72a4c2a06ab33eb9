pub mod codec;
pub mod model;

pub use codec::DecodeError;
pub use model::*;
