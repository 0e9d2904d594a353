//! PCM frame format plus local capture and playback via cpal.

pub mod capture;
pub mod frame;
pub mod playback;
