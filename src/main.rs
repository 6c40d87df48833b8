use std::path::PathBuf;

use media_session::core::SessionConfig;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = pico_args::Arguments::from_env();
    let config_path: Option<PathBuf> = args.opt_value_from_str("--config")?;
    let mpv_path: Option<PathBuf> = args.opt_value_from_str("--mpv")?;
    let files: Vec<PathBuf> = args.finish().into_iter().map(PathBuf::from).collect();

    let mut config = match config_path {
        Some(path) => SessionConfig::load_from(&path)?,
        None => SessionConfig::load()?,
    };
    if mpv_path.is_some() {
        config.player.mpv_path = mpv_path;
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(config, files))
}

/// Serve JSON-line commands on stdin; replies and session events go to stdout.
#[cfg(unix)]
async fn run(config: SessionConfig, files: Vec<PathBuf>) -> anyhow::Result<()> {
    use media_session::session::{handle_line, SessionController};
    use media_session::video::MpvPlayer;
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::sync::broadcast::error::RecvError;

    let player = MpvPlayer::spawn(&config.player)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start media player: {}", e))?;
    let session = SessionController::new(Arc::new(player), &config);

    let mut events = session.subscribe();
    let forwarder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => log::error!("Failed to serialize {}: {}", event.channel(), e),
                },
                Err(RecvError::Lagged(skipped)) => log::warn!("Dropped {} session events", skipped),
                Err(RecvError::Closed) => break,
            }
        }
    });

    if !files.is_empty() {
        let outcome = session.handle_files_drop(&files).await;
        println!("{}", json!({ "response": outcome }));
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    let response = handle_line(&session, &line).await;
                    println!("{}", json!({ "response": response }));
                }
                None => break,
            },
            _ = &mut shutdown => {
                log::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    session.close().await;
    forwarder.abort();
    Ok(())
}

#[cfg(not(unix))]
async fn run(_config: SessionConfig, _files: Vec<PathBuf>) -> anyhow::Result<()> {
    anyhow::bail!("the mpv IPC backend is only available on unix platforms")
}
