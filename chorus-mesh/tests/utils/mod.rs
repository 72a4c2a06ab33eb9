pub mod mock_media;
pub mod raw_participant;

pub use mock_media::*;
pub use raw_participant::*;
pub use wait_helpers::*;
