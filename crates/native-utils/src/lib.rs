pub mod audio;
#[cfg(feature = "playback")]
pub mod device;
pub mod player;
