// =============================================================================
// MPV PLAYER - JSON IPC BACKEND
// =============================================================================
//
// mpv runs as a child process started idle and paused. All control goes over
// its --input-ipc-server socket: one JSON object per line in each direction.
//
// - Requests carry a request_id; the reader task routes replies back to the
//   awaiting caller through a oneshot channel
// - Observed properties (time-pos, duration, pause, speed, volume) arrive as
//   property-change events and are republished as PlayerEvents
// - file-loaded / end-file drive the load handshake
//
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

use crate::core::{PlayerConfig, Result, SessionError};
use crate::video::player::{MediaPlayer, PlayerEvent};

const OBSERVED_PROPERTIES: [&str; 5] = ["time-pos", "duration", "pause", "speed", "volume"];
const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

type Reply = std::result::Result<Value, String>;
type PendingReplies = Arc<Mutex<HashMap<u64, oneshot::Sender<Reply>>>>;

/// Drops the reply slot of a request whose caller stopped waiting, e.g. on timeout.
struct PendingRequest<'a> {
    pending: &'a PendingReplies,
    id: u64,
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

/// Load handshake signals, separate from the public event stream.
#[derive(Debug, Clone)]
enum FileLifecycle {
    Loaded,
    Failed(String),
}

pub struct MpvPlayer {
    _child: Option<Child>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    pending: PendingReplies,
    next_request_id: AtomicU64,
    events: broadcast::Sender<PlayerEvent>,
    lifecycle: broadcast::Sender<FileLifecycle>,
    running: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    socket_path: Option<PathBuf>,
}

impl MpvPlayer {
    /// Start mpv and connect to its IPC socket.
    pub async fn spawn(config: &PlayerConfig) -> Result<Self> {
        let socket_path = config.ipc_socket();
        let binary = config.mpv_binary();
        // Leftover socket from a crashed run would make mpv fail to bind
        let _ = std::fs::remove_file(&socket_path);

        log::info!("Starting {} with IPC socket {}", binary.display(), socket_path.display());
        let mut child = Command::new(&binary)
            .arg("--idle=yes")
            .arg("--keep-open=yes")
            .arg("--pause")
            .arg("--no-terminal")
            .arg(format!("--input-ipc-server={}", socket_path.display()))
            .args(&config.extra_args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SessionError::PlayerUnavailable(format!("failed to spawn {}: {}", binary.display(), e)))?;

        let stream = connect(&socket_path, &mut child).await?;
        let player = Self::attach(stream, Some(child), Some(socket_path));
        player.observe_properties().await?;
        Ok(player)
    }

    /// Drive an already connected IPC stream.
    pub fn with_stream(stream: UnixStream) -> Self {
        Self::attach(stream, None, None)
    }

    fn attach(stream: UnixStream, child: Option<Child>, socket_path: Option<PathBuf>) -> Self {
        let (read_half, write_half) = stream.into_split();
        let (events, _) = broadcast::channel(256);
        let (lifecycle, _) = broadcast::channel(16);
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let running = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            events.clone(),
            lifecycle.clone(),
            running.clone(),
        ));

        Self {
            _child: child,
            writer: tokio::sync::Mutex::new(write_half),
            pending,
            next_request_id: AtomicU64::new(1),
            events,
            lifecycle,
            running,
            reader,
            socket_path,
        }
    }

    pub async fn observe_properties(&self) -> Result<()> {
        for (id, name) in OBSERVED_PROPERTIES.iter().enumerate() {
            self.request(json!(["observe_property", id + 1, name])).await?;
        }
        Ok(())
    }

    async fn request(&self, command: Value) -> Result<Value> {
        if !self.is_running() {
            return Err(SessionError::PlayerUnavailable("mpv is not running".to_string()));
        }

        let name = command
            .get(0)
            .and_then(Value::as_str)
            .unwrap_or("command")
            .to_string();
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(request_id, reply_tx);
        let _slot = PendingRequest {
            pending: &self.pending,
            id: request_id,
        };

        let mut line = serde_json::to_vec(&json!({ "command": command, "request_id": request_id }))?;
        line.push(b'\n');
        {
            let mut writer = self.writer.lock().await;
            writer.write_all(&line).await?;
        }

        match reply_rx.await {
            Ok(Ok(data)) => Ok(data),
            Ok(Err(error)) => Err(SessionError::Command(format!("{}: {}", name, error))),
            Err(_) => Err(SessionError::PlayerUnavailable("mpv closed the connection".to_string())),
        }
    }

    async fn set_property(&self, name: &str, value: Value) -> Result<()> {
        self.request(json!(["set_property", name, value])).await.map(|_| ())
    }
}

impl MediaPlayer for MpvPlayer {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn load(&self, path: PathBuf) -> Result<f64> {
        // Subscribe before issuing loadfile so file-loaded cannot slip past
        let mut lifecycle = self.lifecycle.subscribe();
        self.set_property("pause", json!(true)).await?;
        self.request(json!(["loadfile", path.to_string_lossy(), "replace"])).await?;

        loop {
            match lifecycle.recv().await {
                Ok(FileLifecycle::Loaded) => break,
                Ok(FileLifecycle::Failed(reason)) => {
                    return Err(SessionError::Command(format!("could not open {}: {}", path.display(), reason)));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SessionError::PlayerUnavailable("mpv exited while loading".to_string()));
                }
            }
        }

        let duration = self.request(json!(["get_property", "duration"])).await?;
        Ok(duration.as_f64().unwrap_or(0.0))
    }

    async fn play(&self) -> Result<()> {
        self.set_property("pause", json!(false)).await
    }

    async fn pause(&self) -> Result<()> {
        self.set_property("pause", json!(true)).await
    }

    async fn seek(&self, position: f64) -> Result<()> {
        self.request(json!(["seek", position, "absolute"])).await.map(|_| ())
    }

    async fn set_volume(&self, volume: f64) -> Result<()> {
        self.set_property("volume", json!(volume)).await
    }

    async fn set_speed(&self, speed: f64) -> Result<()> {
        self.set_property("speed", json!(speed)).await
    }

    async fn stop(&self) -> Result<()> {
        self.request(json!(["stop"])).await.map(|_| ())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.events.subscribe()
    }
}

impl Drop for MpvPlayer {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(socket_path) = &self.socket_path {
            let _ = std::fs::remove_file(socket_path);
        }
    }
}

async fn connect(socket_path: &Path, child: &mut Child) -> Result<UnixStream> {
    let mut last_error = None;
    for _ in 0..CONNECT_ATTEMPTS {
        if let Ok(Some(status)) = child.try_wait() {
            return Err(SessionError::PlayerUnavailable(format!("mpv exited during startup ({})", status)));
        }
        match UnixStream::connect(socket_path).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                last_error = Some(e);
                tokio::time::sleep(CONNECT_RETRY_DELAY).await;
            }
        }
    }
    Err(SessionError::PlayerUnavailable(format!(
        "could not connect to {}: {}",
        socket_path.display(),
        last_error.map(|e| e.to_string()).unwrap_or_default()
    )))
}

async fn read_loop(
    read_half: OwnedReadHalf,
    pending: PendingReplies,
    events: broadcast::Sender<PlayerEvent>,
    lifecycle: broadcast::Sender<FileLifecycle>,
    running: Arc<AtomicBool>,
) {
    let mut lines = BufReader::new(read_half).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<Value>(&line) {
                Ok(message) => dispatch_message(&message, &pending, &events, &lifecycle),
                Err(e) => log::warn!("Ignoring malformed mpv message: {}", e),
            },
            Ok(None) => break,
            Err(e) => {
                log::warn!("mpv IPC read failed: {}", e);
                break;
            }
        }
    }

    log::info!("mpv IPC connection closed");
    running.store(false, Ordering::SeqCst);
    for (_, reply) in pending.lock().unwrap_or_else(PoisonError::into_inner).drain() {
        let _ = reply.send(Err("mpv exited".to_string()));
    }
    let _ = lifecycle.send(FileLifecycle::Failed("mpv exited".to_string()));
    let _ = events.send(PlayerEvent::Exited);
}

fn dispatch_message(
    message: &Value,
    pending: &PendingReplies,
    events: &broadcast::Sender<PlayerEvent>,
    lifecycle: &broadcast::Sender<FileLifecycle>,
) {
    if let (Some(request_id), Some(error)) = (message.get("request_id").and_then(Value::as_u64), message.get("error")) {
        let reply = match error.as_str() {
            Some("success") => Ok(message.get("data").cloned().unwrap_or(Value::Null)),
            Some(error) => Err(error.to_string()),
            None => Err("malformed reply".to_string()),
        };
        let waiter = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&request_id);
        if let Some(waiter) = waiter {
            let _ = waiter.send(reply);
        }
        return;
    }

    match message.get("event").and_then(Value::as_str) {
        Some("property-change") => {
            let name = message.get("name").and_then(Value::as_str).unwrap_or_default();
            let data = message.get("data").unwrap_or(&Value::Null);
            if let Some(event) = property_event(name, data) {
                let _ = events.send(event);
            }
        }
        Some("seek") => {
            let _ = events.send(PlayerEvent::Seek);
        }
        Some("file-loaded") => {
            let _ = lifecycle.send(FileLifecycle::Loaded);
        }
        Some("end-file") => {
            if message.get("reason").and_then(Value::as_str) == Some("error") {
                let reason = message
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                let _ = lifecycle.send(FileLifecycle::Failed(reason));
            }
        }
        Some("shutdown") => {
            let _ = events.send(PlayerEvent::Exited);
        }
        Some(other) => log::trace!("Unhandled mpv event: {}", other),
        None => log::trace!("Unrecognized mpv message: {}", message),
    }
}

/// Map an observed property to a notification. `null` means "no file".
fn property_event(name: &str, data: &Value) -> Option<PlayerEvent> {
    match name {
        "time-pos" => data.as_f64().map(PlayerEvent::TimePosition),
        "duration" => data.as_f64().map(PlayerEvent::Duration),
        "pause" => data
            .as_bool()
            .map(|paused| if paused { PlayerEvent::Paused } else { PlayerEvent::Unpaused }),
        "speed" => data.as_f64().map(PlayerEvent::SpeedChanged),
        "volume" => data.as_f64().map(PlayerEvent::VolumeChanged),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal stand-in for mpv's IPC server.
    async fn fake_mpv(stream: UnixStream, duration: f64) {
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: Value = serde_json::from_str(&line).unwrap();
            let id = request["request_id"].as_u64().unwrap();
            let command = request["command"].as_array().unwrap().clone();
            let name = command[0].as_str().unwrap_or_default().to_string();

            let mut replies = Vec::new();
            match name.as_str() {
                "get_property" => replies.push(json!({"request_id": id, "error": "success", "data": duration})),
                "loadfile" if command[1].as_str() == Some("/missing.mkv") => {
                    replies.push(json!({"request_id": id, "error": "success"}));
                    replies.push(json!({"event": "end-file", "reason": "error", "file_error": "loading failed"}));
                }
                "loadfile" => {
                    replies.push(json!({"request_id": id, "error": "success"}));
                    replies.push(json!({"event": "file-loaded"}));
                }
                "seek" => replies.push(json!({"request_id": id, "error": "invalid parameter"})),
                _ => replies.push(json!({"request_id": id, "error": "success"})),
            }
            for reply in replies {
                let mut bytes = serde_json::to_vec(&reply).unwrap();
                bytes.push(b'\n');
                write_half.write_all(&bytes).await.unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_load_waits_for_file_loaded() {
        let (client, server) = UnixStream::pair().unwrap();
        tokio::spawn(fake_mpv(server, 42.5));
        let player = MpvPlayer::with_stream(client);

        let duration = player.load(PathBuf::from("/videos/movie.mkv")).await.unwrap();
        assert_eq!(duration, 42.5);
    }

    #[tokio::test]
    async fn test_load_reports_open_failure() {
        let (client, server) = UnixStream::pair().unwrap();
        tokio::spawn(fake_mpv(server, 0.0));
        let player = MpvPlayer::with_stream(client);

        let error = player.load(PathBuf::from("/missing.mkv")).await.unwrap_err();
        assert!(matches!(error, SessionError::Command(_)));
    }

    #[tokio::test]
    async fn test_rejected_command_is_an_error() {
        let (client, server) = UnixStream::pair().unwrap();
        tokio::spawn(fake_mpv(server, 0.0));
        let player = MpvPlayer::with_stream(client);

        assert!(player.play().await.is_ok());
        assert!(player.seek(10.0).await.is_err());
    }

    #[tokio::test]
    async fn test_property_changes_become_events() {
        let (client, server) = UnixStream::pair().unwrap();
        let player = MpvPlayer::with_stream(client);
        let mut events = player.subscribe();

        let (_, mut write_half) = server.into_split();
        let messages = [
            json!({"event": "property-change", "id": 1, "name": "time-pos", "data": 3.25}),
            json!({"event": "property-change", "id": 2, "name": "duration", "data": null}),
            json!({"event": "property-change", "id": 3, "name": "pause", "data": false}),
            json!({"event": "seek"}),
        ];
        for message in messages {
            let mut bytes = serde_json::to_vec(&message).unwrap();
            bytes.push(b'\n');
            write_half.write_all(&bytes).await.unwrap();
        }

        assert_eq!(events.recv().await.unwrap(), PlayerEvent::TimePosition(3.25));
        assert_eq!(events.recv().await.unwrap(), PlayerEvent::Unpaused);
        assert_eq!(events.recv().await.unwrap(), PlayerEvent::Seek);
    }

    #[tokio::test]
    async fn test_connection_loss_marks_player_unavailable() {
        let (client, server) = UnixStream::pair().unwrap();
        let player = MpvPlayer::with_stream(client);
        let mut events = player.subscribe();

        drop(server);
        assert_eq!(events.recv().await.unwrap(), PlayerEvent::Exited);
        assert!(!player.is_running());

        let error = player.pause().await.unwrap_err();
        assert_eq!(error.kind(), crate::core::ErrorKind::PlayerUnavailable);
    }

    #[tokio::test]
    async fn test_abandoned_request_frees_reply_slot() {
        // Peer stays connected but never answers
        let (client, _server) = UnixStream::pair().unwrap();
        let player = MpvPlayer::with_stream(client);

        let result = tokio::time::timeout(Duration::from_millis(50), player.play()).await;

        assert!(result.is_err());
        assert!(player.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stop_is_accepted() {
        let (client, server) = UnixStream::pair().unwrap();
        tokio::spawn(fake_mpv(server, 0.0));
        let player = MpvPlayer::with_stream(client);

        assert!(player.stop().await.is_ok());
        assert!(player.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn test_property_mapping() {
        assert_eq!(property_event("pause", &json!(true)), Some(PlayerEvent::Paused));
        assert_eq!(property_event("speed", &json!(1.25)), Some(PlayerEvent::SpeedChanged(1.25)));
        assert_eq!(property_event("time-pos", &Value::Null), None);
        assert_eq!(property_event("chapter", &json!(2)), None);
    }
}
