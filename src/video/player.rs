use std::future::Future;
use std::path::PathBuf;
use tokio::sync::broadcast;

use crate::core::Result;

/// Commands a session can issue to the external player.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    /// Open a file, paused at the start
    Load(PathBuf),
    Play,
    Pause,
    /// Absolute seek in seconds
    Seek(f64),
    /// 0 - 100
    SetVolume(f64),
    SetSpeed(f64),
    /// Unload the current file
    Stop,
}

/// Asynchronous notifications from the player.
///
/// These are the source of truth for position, duration and pause state.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    TimePosition(f64),
    Duration(f64),
    Paused,
    Unpaused,
    Seek,
    SpeedChanged(f64),
    VolumeChanged(f64),
    /// The player process went away
    Exited,
}

/// Command/event sink for the external media player.
///
/// A command returning `Ok` means the player accepted it, not that its
/// effect is visible yet; the matching `PlayerEvent` carries that.
pub trait MediaPlayer: Send + Sync + 'static {
    fn is_running(&self) -> bool;

    /// Load `path` paused and report its duration in seconds.
    fn load(&self, path: PathBuf) -> impl Future<Output = Result<f64>> + Send;

    fn play(&self) -> impl Future<Output = Result<()>> + Send;

    fn pause(&self) -> impl Future<Output = Result<()>> + Send;

    fn seek(&self, position: f64) -> impl Future<Output = Result<()>> + Send;

    fn set_volume(&self, volume: f64) -> impl Future<Output = Result<()>> + Send;

    fn set_speed(&self, speed: f64) -> impl Future<Output = Result<()>> + Send;

    fn stop(&self) -> impl Future<Output = Result<()>> + Send;

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent>;
}

impl PlayerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            PlayerCommand::Load(_) => "load",
            PlayerCommand::Play => "play",
            PlayerCommand::Pause => "pause",
            PlayerCommand::Seek(_) => "seek",
            PlayerCommand::SetVolume(_) => "set volume",
            PlayerCommand::SetSpeed(_) => "set speed",
            PlayerCommand::Stop => "stop",
        }
    }
}
