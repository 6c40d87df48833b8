use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

use crate::core::{
    ErrorKind, FileValidator, FsValidator, IntegrityIssue, IntegrityMonitor, MediaFile, MediaKind, Result,
    SessionConfig, SessionError, ValidationCache, ValidationPolicy, ValidationResult,
};
use crate::session::SessionEvent;
use crate::video::{
    Cue, MediaPlayer, PlaybackState, PlaybackStateMachine, PlayerCommand, PlayerEvent, SubtitleTrack,
    SubtitleTrackSummary,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadVideoResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_info: Option<MediaFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LoadVideoResponse {
    fn loaded(file_info: MediaFile, duration: f64) -> Self {
        Self {
            success: true,
            duration: Some(duration),
            file_info: Some(file_info),
            error: None,
            message: None,
        }
    }

    fn failed(error: &SessionError) -> Self {
        Self {
            success: false,
            duration: None,
            file_info: None,
            error: Some(error.kind()),
            message: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleValidation {
    pub id: String,
    pub file_path: PathBuf,
    pub result: ValidationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub current_video: Option<ValidationResult>,
    pub subtitles: Vec<SubtitleValidation>,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DropOutcome {
    pub video: Option<LoadVideoResponse>,
    pub subtitles: Vec<SubtitleTrackSummary>,
    pub rejected: Vec<PathBuf>,
}

/// Everything mutable about one session.
#[derive(Default)]
struct Session {
    current_video: Option<MediaFile>,
    subtitles: Vec<SubtitleTrack>,
    playback: PlaybackStateMachine,
    closed: bool,
}

#[derive(Debug, Clone, Copy)]
enum Lookup {
    /// Trust a cached result younger than the window
    Within(Duration),
    /// Always hit the disk
    Fresh,
}

struct SessionInner<P: MediaPlayer> {
    player: Arc<P>,
    cache: Arc<ValidationCache>,
    policy: ValidationPolicy,
    session: Mutex<Session>,
    /// Serializes loads so two never interleave
    load_gate: Mutex<()>,
    monitor: StdMutex<IntegrityMonitor>,
    events: broadcast::Sender<SessionEvent>,
    command_timeout: Duration,
    validation_timeout: Duration,
}

/// Owns one playback session: current video, subtitle tracks, playback state
/// and the integrity monitor guarding the file being played.
pub struct SessionController<P: MediaPlayer> {
    inner: Arc<SessionInner<P>>,
    pump: StdMutex<Option<JoinHandle<()>>>,
}

impl<P: MediaPlayer> SessionController<P> {
    /// Must be called from within a tokio runtime.
    pub fn new(player: Arc<P>, config: &SessionConfig) -> Self {
        let validator = Arc::new(FsValidator::new(config.validation_policy()));
        Self::with_validator(player, config, validator)
    }

    pub fn with_validator(player: Arc<P>, config: &SessionConfig, validator: Arc<dyn FileValidator>) -> Self {
        let cache = Arc::new(ValidationCache::new(
            validator,
            config.cache_freshness(),
            config.cache_capacity,
        ));
        let (events, _) = broadcast::channel(256);

        let inner = Arc::new(SessionInner {
            player,
            cache,
            policy: config.validation_policy(),
            session: Mutex::new(Session::default()),
            load_gate: Mutex::new(()),
            monitor: StdMutex::new(IntegrityMonitor::new(config.integrity_interval())),
            events,
            command_timeout: config.command_timeout(),
            validation_timeout: config.validation_timeout(),
        });

        let pump = spawn_event_pump(&inner);
        Self {
            inner,
            pump: StdMutex::new(Some(pump)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn player(&self) -> &Arc<P> {
        &self.inner.player
    }

    pub fn validation_cache(&self) -> &ValidationCache {
        &self.inner.cache
    }

    pub fn is_monitoring(&self) -> bool {
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_running()
    }

    pub async fn current_video(&self) -> Option<MediaFile> {
        self.inner.session.lock().await.current_video.clone()
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.session.lock().await.closed
    }

    /// Validate and open a video. On failure nothing about the session changes.
    pub async fn load_video(&self, path: impl AsRef<Path>) -> LoadVideoResponse {
        let path = path.as_ref();
        let _gate = self.inner.load_gate.lock().await;
        match self.inner.load_video(path).await {
            Ok((media, duration)) => LoadVideoResponse::loaded(media, duration),
            Err(e) => {
                log::warn!("Failed to load video {}: {}", path.display(), e);
                LoadVideoResponse::failed(&e)
            }
        }
    }

    /// Load subtitle files, skipping any that fail validation or reading.
    pub async fn load_subtitles(&self, paths: &[PathBuf]) -> Vec<SubtitleTrackSummary> {
        let mut tracks = Vec::new();
        for path in paths {
            match self.inner.read_subtitle_track(path).await {
                Ok(track) => {
                    log::info!("Loaded {} cues from {}", track.cues.len(), path.display());
                    tracks.push(track);
                }
                Err(e) => log::warn!("Skipping subtitle file {}: {}", path.display(), e),
            }
        }
        if tracks.is_empty() {
            return Vec::new();
        }

        let summaries: Vec<SubtitleTrackSummary> = {
            let mut session = self.inner.session.lock().await;
            if session.closed {
                return Vec::new();
            }
            let summaries = tracks.iter().map(SubtitleTrack::summary).collect();
            session.subtitles.extend(tracks);
            summaries
        };
        self.inner.emit(SessionEvent::SubtitlesLoaded(summaries.clone()));
        summaries
    }

    pub async fn clear_subtitles(&self) -> usize {
        let mut session = self.inner.session.lock().await;
        let removed = session.subtitles.len();
        session.subtitles.clear();
        removed
    }

    pub async fn set_subtitle_enabled(&self, id: &str, enabled: bool) -> bool {
        let mut session = self.inner.session.lock().await;
        match session.subtitles.iter_mut().find(|track| track.id == id) {
            Some(track) => {
                track.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub async fn subtitle_tracks(&self) -> Vec<SubtitleTrackSummary> {
        let session = self.inner.session.lock().await;
        session.subtitles.iter().map(SubtitleTrack::summary).collect()
    }

    /// Cues from enabled tracks covering the current position.
    pub async fn active_cues(&self) -> Vec<Cue> {
        let session = self.inner.session.lock().await;
        let time = session.playback.state().current_time;
        session
            .subtitles
            .iter()
            .filter(|track| track.enabled)
            .flat_map(|track| track.active_cues(time).cloned())
            .collect()
    }

    /// Ask the player to flip between playing and paused. The playing flag
    /// itself changes when the player confirms.
    pub async fn play_pause(&self) -> bool {
        let target = self.inner.session.lock().await.playback.toggle_target();
        let Some(play) = target else {
            log::debug!("Play/pause ignored, nothing loaded");
            return false;
        };
        let command = if play { PlayerCommand::Play } else { PlayerCommand::Pause };
        self.inner.run_reporting(command).await
    }

    pub async fn seek(&self, position: f64) -> bool {
        let seek = self.inner.session.lock().await.playback.seek(position);
        let Some((target, event)) = seek else {
            return false;
        };
        self.inner.emit(event);
        self.inner.run_reporting(PlayerCommand::Seek(target)).await
    }

    pub async fn set_volume(&self, volume: f64) -> bool {
        let change = self.inner.session.lock().await.playback.set_volume(volume);
        let Some((volume, event)) = change else {
            log::warn!("Rejected volume {}", volume);
            return false;
        };
        self.inner.emit(event);
        self.inner.run_reporting(PlayerCommand::SetVolume(volume)).await
    }

    pub async fn set_speed(&self, speed: f64) -> bool {
        let change = self.inner.session.lock().await.playback.set_speed(speed);
        let Some((speed, event)) = change else {
            log::warn!("Rejected playback speed {}", speed);
            return false;
        };
        self.inner.emit(event);
        self.inner.run_reporting(PlayerCommand::SetSpeed(speed)).await
    }

    pub async fn get_playback_state(&self) -> PlaybackState {
        self.inner.session.lock().await.playback.state().clone()
    }

    /// Re-check the current video and every subtitle track (through the cache).
    pub async fn validate_current_files(&self) -> FileReport {
        let (video, tracks) = {
            let session = self.inner.session.lock().await;
            let tracks: Vec<(String, PathBuf)> = session
                .subtitles
                .iter()
                .map(|track| (track.id.clone(), track.file_path.clone()))
                .collect();
            (session.current_video.clone(), tracks)
        };

        let freshness = self.inner.cache.freshness();
        let mut issues = Vec::new();

        let current_video = match video {
            Some(loaded) => {
                let result = self
                    .inner
                    .validation_outcome(&loaded.path, MediaKind::Video, Lookup::Within(freshness))
                    .await;
                match &result {
                    ValidationResult::Valid { metadata } if !metadata.matches(&loaded) => {
                        issues.push(format!("Video file changed since it was loaded: {}", loaded.path.display()));
                    }
                    ValidationResult::Invalid { reason } => {
                        issues.push(format!("Video file: {} ({})", loaded.path.display(), reason));
                    }
                    ValidationResult::Valid { .. } => {}
                }
                Some(result)
            }
            None => None,
        };

        let mut subtitles = Vec::with_capacity(tracks.len());
        for (id, file_path) in tracks {
            let result = self
                .inner
                .validation_outcome(&file_path, MediaKind::Subtitle, Lookup::Within(freshness))
                .await;
            if let Some(reason) = result.reason() {
                issues.push(format!("Subtitle file: {} ({})", file_path.display(), reason));
            }
            subtitles.push(SubtitleValidation { id, file_path, result });
        }

        if !issues.is_empty() {
            log::warn!("File validation found {} issue(s)", issues.len());
        }
        FileReport {
            current_video,
            subtitles,
            issues,
        }
    }

    /// Sort dropped paths by extension: the first video is loaded, then every
    /// subtitle. Extra videos and unknown files are handed back as rejected.
    pub async fn handle_files_drop(&self, paths: &[PathBuf]) -> DropOutcome {
        let mut videos = Vec::new();
        let mut subtitle_paths = Vec::new();
        let mut rejected = Vec::new();
        for path in paths {
            match self.inner.policy.classify(path) {
                Some(MediaKind::Video) => videos.push(path.clone()),
                Some(MediaKind::Subtitle) => subtitle_paths.push(path.clone()),
                None => rejected.push(path.clone()),
            }
        }

        let mut videos = videos.into_iter();
        let video = match videos.next() {
            Some(first) => Some(self.load_video(&first).await),
            None => None,
        };
        for extra in videos {
            log::info!("Ignoring additional dropped video {}", extra.display());
            rejected.push(extra);
        }

        let subtitles = if subtitle_paths.is_empty() {
            Vec::new()
        } else {
            self.load_subtitles(&subtitle_paths).await
        };

        DropOutcome {
            video,
            subtitles,
            rejected,
        }
    }

    /// Tear the session down: stop background work and forget every file.
    /// Closing twice is harmless.
    pub async fn close(&self) {
        let pump = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(pump) = pump {
            pump.abort();
        }
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();

        let had_video = {
            let mut session = self.inner.session.lock().await;
            if session.closed {
                return;
            }
            let had_video = session.current_video.is_some();
            *session = Session {
                closed: true,
                ..Session::default()
            };
            had_video
        };
        self.inner.cache.clear();

        if had_video {
            if let Err(e) = self.inner.run(PlayerCommand::Stop).await {
                log::debug!("Stop on close failed: {}", e);
            }
        }
        log::info!("Session closed");
    }
}

impl<P: MediaPlayer> Drop for SessionController<P> {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().unwrap_or_else(PoisonError::into_inner).take() {
            pump.abort();
        }
        self.inner
            .monitor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stop();
        self.inner.cache.clear();
    }
}

fn spawn_event_pump<P: MediaPlayer>(inner: &Arc<SessionInner<P>>) -> JoinHandle<()> {
    // Subscribe before spawning so nothing sent after construction is missed
    let mut notifications = inner.player.subscribe();
    let weak: Weak<SessionInner<P>> = Arc::downgrade(inner);

    tokio::spawn(async move {
        loop {
            let event = match notifications.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("Dropped {} player notifications", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(inner) = weak.upgrade() else {
                break;
            };
            inner.handle_player_event(event).await;
        }
    })
}

impl<P: MediaPlayer> SessionInner<P> {
    fn emit(&self, event: SessionEvent) {
        if self.events.send(event).is_err() {
            log::trace!("No listeners for session event");
        }
    }

    async fn handle_player_event(self: &Arc<Self>, event: PlayerEvent) {
        if event == PlayerEvent::Exited {
            log::warn!("Media player exited");
        }

        let (change, playing) = {
            let mut session = self.session.lock().await;
            if session.closed {
                return;
            }
            let change = session.playback.apply(&event);
            (change, session.playback.is_playing())
        };

        if let Some(change) = change {
            let flips_playing = matches!(change, SessionEvent::PlaybackStateChange { .. });
            self.emit(change);
            if flips_playing {
                self.sync_monitor(playing);
            }
        }
    }

    /// The monitor runs exactly while playback is active.
    fn sync_monitor(self: &Arc<Self>, playing: bool) {
        let mut monitor = self.monitor.lock().unwrap_or_else(PoisonError::into_inner);
        if !playing {
            monitor.stop();
            return;
        }

        let weak = Arc::downgrade(self);
        monitor.start(move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        inner.check_integrity().await;
                        true
                    }
                    None => false,
                }
            }
        });
    }

    async fn load_video(&self, path: &Path) -> Result<(MediaFile, f64)> {
        if self.session.lock().await.closed {
            return Err(ErrorKind::SessionClosed.into());
        }
        if !self.player.is_running() {
            return Err(SessionError::PlayerUnavailable("media player is not running".to_string()));
        }

        let media = self
            .validate(path, MediaKind::Video, Lookup::Fresh)
            .await?
            .into_result()?;
        let duration = self
            .bounded("load", self.command_timeout, self.player.load(media.path.clone()))
            .await?;

        let events = {
            let mut session = self.session.lock().await;
            if session.closed {
                None
            } else {
                session.current_video = Some(media.clone());
                Some(session.playback.load(duration))
            }
        };
        let Some(events) = events else {
            // Torn down while the player was busy; unload what it just opened
            if let Err(e) = self.run(PlayerCommand::Stop).await {
                log::debug!("Stop after discarded load failed: {}", e);
            }
            return Err(ErrorKind::SessionClosed.into());
        };
        self.monitor.lock().unwrap_or_else(PoisonError::into_inner).stop();
        for event in events {
            self.emit(event);
        }

        log::info!("Loaded {} ({:.2}s, {})", media.path.display(), duration, media.fingerprint);
        Ok((media, duration))
    }

    async fn read_subtitle_track(&self, path: &Path) -> Result<SubtitleTrack> {
        let media = self
            .validate(path, MediaKind::Subtitle, Lookup::Within(self.cache.freshness()))
            .await?
            .into_result()?;
        let bytes = self
            .bounded("subtitle read", self.validation_timeout, async {
                tokio::fs::read(&media.path).await.map_err(SessionError::from)
            })
            .await?;
        let content = String::from_utf8_lossy(&bytes);
        Ok(SubtitleTrack::from_content(&media.path, &content))
    }

    async fn check_integrity(&self) {
        let loaded = {
            let session = self.session.lock().await;
            if session.closed || !session.playback.is_playing() {
                return;
            }
            match &session.current_video {
                Some(video) => video.clone(),
                None => return,
            }
        };

        // Every tick goes to disk; a cached result could hide a deletion for a whole interval
        let reason = match self.validate(&loaded.path, MediaKind::Video, Lookup::Fresh).await {
            Ok(ValidationResult::Valid { metadata }) if metadata.matches(&loaded) => {
                log::trace!("Integrity check passed for {}", loaded.path.display());
                return;
            }
            Ok(ValidationResult::Valid { .. }) => ErrorKind::Modified,
            Ok(ValidationResult::Invalid { reason }) => reason,
            Err(e) => {
                log::warn!("Integrity check of {} did not complete: {}", loaded.path.display(), e);
                return;
            }
        };

        self.raise_integrity_issue(loaded, reason).await;
    }

    async fn raise_integrity_issue(&self, loaded: MediaFile, reason: ErrorKind) {
        let change = {
            let mut session = self.session.lock().await;
            let still_current = session
                .current_video
                .as_ref()
                .is_some_and(|video| video.matches(&loaded));
            if session.closed || !still_current {
                return;
            }
            match session.playback.mark_paused() {
                Some(change) => change,
                None => return,
            }
        };

        log::warn!("Integrity issue with {}: {}", loaded.path.display(), reason);
        self.emit(change);
        if let Err(e) = self.run(PlayerCommand::Pause).await {
            log::error!("Failed to pause player after integrity issue: {}", e);
        }
        self.emit(SessionEvent::FileIssue(IntegrityIssue::new(loaded.path, reason)));

        // Runs inside the monitor task, so nothing may be awaited after the stop.
        // Skip it if playback was resumed in the meantime.
        let session = self.session.lock().await;
        if !session.playback.is_playing() {
            self.monitor.lock().unwrap_or_else(PoisonError::into_inner).stop();
        }
    }

    async fn validate(&self, path: &Path, kind: MediaKind, lookup: Lookup) -> Result<ValidationResult> {
        let cache = self.cache.clone();
        let path = path.to_path_buf();
        let task = tokio::task::spawn_blocking(move || match lookup {
            Lookup::Within(window) => cache.get_or_validate_within(&path, kind, window),
            Lookup::Fresh => cache.revalidate(&path, kind),
        });

        match tokio::time::timeout(self.validation_timeout, task).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(e)) => {
                log::error!("Validation task failed: {}", e);
                Err(ErrorKind::Io.into())
            }
            Err(_) => Err(SessionError::Timeout {
                operation: "validation",
                timeout: self.validation_timeout,
            }),
        }
    }

    /// Validation with errors folded into the result, for reporting.
    async fn validation_outcome(&self, path: &Path, kind: MediaKind, lookup: Lookup) -> ValidationResult {
        match self.validate(path, kind, lookup).await {
            Ok(result) => result,
            Err(e) => ValidationResult::Invalid { reason: e.kind() },
        }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(limit, future).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::Timeout {
                operation,
                timeout: limit,
            }),
        }
    }

    async fn run(&self, command: PlayerCommand) -> Result<()> {
        let operation = command.name();
        let player = &self.player;
        self.bounded(operation, self.command_timeout, async move {
            match command {
                PlayerCommand::Load(path) => player.load(path).await.map(|_| ()),
                PlayerCommand::Play => player.play().await,
                PlayerCommand::Pause => player.pause().await,
                PlayerCommand::Seek(position) => player.seek(position).await,
                PlayerCommand::SetVolume(volume) => player.set_volume(volume).await,
                PlayerCommand::SetSpeed(speed) => player.set_speed(speed).await,
                PlayerCommand::Stop => player.stop().await,
            }
        })
        .await
    }

    /// Run a command, turning failure into `false` plus a log line.
    async fn run_reporting(&self, command: PlayerCommand) -> bool {
        let operation = command.name();
        match self.run(command).await {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Player {} failed: {}", operation, e);
                false
            }
        }
    }
}
