mod capture;
mod remote_audio;
mod silence_source;

pub use capture::*;
pub use remote_audio::*;
pub use silence_source::*;
