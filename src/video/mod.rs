#[cfg(unix)]
pub mod mpv;
pub mod playback;
pub mod player;
pub mod subtitles;

#[cfg(unix)]
pub use mpv::MpvPlayer;
pub use playback::*;
pub use player::*;
pub use subtitles::*;
