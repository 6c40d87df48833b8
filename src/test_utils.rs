//! Shared fixtures for unit tests: temp files, a counting validator and a
//! scripted stand-in for the external player.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::core::{FileValidator, FsValidator, MediaKind, Result, SessionConfig, SessionError, ValidationResult};
use crate::session::SessionEvent;
use crate::video::{MediaPlayer, PlayerCommand, PlayerEvent};

pub fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// Filesystem validator with the default policy that counts how often it ran.
pub struct CountingValidator {
    inner: FsValidator,
    calls: AtomicUsize,
}

impl Default for CountingValidator {
    fn default() -> Self {
        Self {
            inner: FsValidator::new(SessionConfig::default().validation_policy()),
            calls: AtomicUsize::new(0),
        }
    }
}

impl CountingValidator {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FileValidator for CountingValidator {
    fn validate(&self, path: &Path, kind: MediaKind) -> ValidationResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.validate(path, kind)
    }
}

/// Player that accepts every command instantly and echoes the notification
/// mpv would send back.
pub struct FakePlayer {
    duration: f64,
    load_delay: Duration,
    running: AtomicBool,
    failing: AtomicBool,
    commands: Mutex<Vec<PlayerCommand>>,
    events: broadcast::Sender<PlayerEvent>,
}

impl FakePlayer {
    pub fn new(duration: f64) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            duration,
            load_delay: Duration::ZERO,
            running: AtomicBool::new(true),
            failing: AtomicBool::new(false),
            commands: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn stopped() -> Self {
        let player = Self::new(0.0);
        player.running.store(false, Ordering::SeqCst);
        player
    }

    /// Keep `load` busy for `delay` after accepting it.
    pub fn with_load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = delay;
        self
    }

    /// Make every following command fail.
    pub fn fail_commands(&self, fail: bool) {
        self.failing.store(fail, Ordering::SeqCst);
    }

    pub fn commands(&self) -> Vec<PlayerCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn emit(&self, event: PlayerEvent) {
        let _ = self.events.send(event);
    }

    fn record(&self, command: PlayerCommand) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(SessionError::PlayerUnavailable("fake player stopped".to_string()));
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(SessionError::Command(format!("{}: scripted failure", command.name())));
        }
        self.commands.lock().unwrap().push(command);
        Ok(())
    }
}

impl MediaPlayer for FakePlayer {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn load(&self, path: PathBuf) -> Result<f64> {
        self.record(PlayerCommand::Load(path))?;
        if !self.load_delay.is_zero() {
            tokio::time::sleep(self.load_delay).await;
        }
        Ok(self.duration)
    }

    async fn play(&self) -> Result<()> {
        self.record(PlayerCommand::Play)?;
        self.emit(PlayerEvent::Unpaused);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.record(PlayerCommand::Pause)?;
        self.emit(PlayerEvent::Paused);
        Ok(())
    }

    async fn seek(&self, position: f64) -> Result<()> {
        self.record(PlayerCommand::Seek(position))?;
        self.emit(PlayerEvent::Seek);
        self.emit(PlayerEvent::TimePosition(position));
        Ok(())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.record(PlayerCommand::SetVolume(volume))?;
        self.emit(PlayerEvent::VolumeChanged(volume));
        Ok(())
    }

    async fn set_speed(&self, speed: f64) -> Result<()> {
        self.record(PlayerCommand::SetSpeed(speed))?;
        self.emit(PlayerEvent::SpeedChanged(speed));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record(PlayerCommand::Stop)
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }
}

/// Wait up to two seconds for an event matching `predicate`.
pub async fn wait_for_event<F>(events: &mut broadcast::Receiver<SessionEvent>, mut predicate: F) -> Option<SessionEvent>
where
    F: FnMut(&SessionEvent) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) if predicate(&event) => return Some(event),
            Ok(Ok(_)) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => continue,
            Ok(Err(broadcast::error::RecvError::Closed)) | Err(_) => return None,
        }
    }
}

/// Everything already queued on the receiver.
pub fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}
