use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;

use crate::session::SessionController;
use crate::video::MediaPlayer;

/// One request from the presentation layer, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum SessionCommand {
    LoadVideo { path: PathBuf },
    LoadSubtitles { paths: Vec<PathBuf> },
    PlayPause,
    Seek { position: f64 },
    SetVolume { volume: f64 },
    SetSpeed { speed: f64 },
    GetPlaybackState,
    ValidateCurrentFiles,
    HandleFilesDrop { paths: Vec<PathBuf> },
    ClearSubtitles,
    SetSubtitleEnabled { id: String, enabled: bool },
    GetSubtitleTracks,
}

pub async fn dispatch<P: MediaPlayer>(controller: &SessionController<P>, command: SessionCommand) -> Value {
    log::debug!("Dispatching {:?}", command);
    match command {
        SessionCommand::LoadVideo { path } => to_json(&controller.load_video(&path).await),
        SessionCommand::LoadSubtitles { paths } => to_json(&controller.load_subtitles(&paths).await),
        SessionCommand::PlayPause => json!(controller.play_pause().await),
        SessionCommand::Seek { position } => json!(controller.seek(position).await),
        SessionCommand::SetVolume { volume } => json!(controller.set_volume(volume).await),
        SessionCommand::SetSpeed { speed } => json!(controller.set_speed(speed).await),
        SessionCommand::GetPlaybackState => to_json(&controller.get_playback_state().await),
        SessionCommand::ValidateCurrentFiles => to_json(&controller.validate_current_files().await),
        SessionCommand::HandleFilesDrop { paths } => to_json(&controller.handle_files_drop(&paths).await),
        SessionCommand::ClearSubtitles => json!(controller.clear_subtitles().await),
        SessionCommand::SetSubtitleEnabled { id, enabled } => {
            json!(controller.set_subtitle_enabled(&id, enabled).await)
        }
        SessionCommand::GetSubtitleTracks => to_json(&controller.subtitle_tracks().await),
    }
}

/// Parse and run a single protocol line. Malformed input becomes an
/// `{"error": ...}` reply instead of failing the reader.
pub async fn handle_line<P: MediaPlayer>(controller: &SessionController<P>, line: &str) -> Value {
    match serde_json::from_str::<SessionCommand>(line) {
        Ok(command) => dispatch(controller, command).await,
        Err(e) => {
            log::warn!("Ignoring malformed command: {}", e);
            json!({ "error": format!("invalid command: {}", e) })
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or_else(|e| json!({ "error": e.to_string() }))
}
