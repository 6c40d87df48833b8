//! SRT cue timing extraction.
//!
//! Only the block structure and timing line are interpreted:
//! ```text
//! 1
//! 00:00:01,000 --> 00:00:02,500
//! Hello
//! ```
//! Text is kept verbatim, markup included.

use crate::core::ErrorKind;
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cue {
    pub start: f64,
    pub end: f64,
    pub text: String,
}

impl Cue {
    pub fn is_active_at(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }
}

/// Parse every block, keeping the cues and silently dropping malformed blocks.
pub fn parse_cues(content: &str) -> Vec<Cue> {
    parse_blocks(content)
        .enumerate()
        .filter_map(|(index, block)| match block {
            Ok(cue) => Some(cue),
            Err(e) => {
                log::debug!("Skipping subtitle block {}: {}", index + 1, e);
                None
            }
        })
        .collect()
}

/// Per-block parse results in input order.
pub fn parse_blocks(content: &str) -> impl Iterator<Item = Result<Cue, ErrorKind>> {
    let normalized = content
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n");

    let mut blocks: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    for line in normalized.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(line.to_string());
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    blocks.into_iter().map(|lines| parse_block(&lines))
}

fn parse_block(lines: &[String]) -> Result<Cue, ErrorKind> {
    if lines.len() < 3 {
        return Err(ErrorKind::MalformedSubtitleBlock);
    }
    let (start, end) = parse_timing_line(&lines[1]).ok_or(ErrorKind::MalformedSubtitleBlock)?;
    if end < start {
        return Err(ErrorKind::MalformedSubtitleBlock);
    }
    Ok(Cue {
        start,
        end,
        text: lines[2..].join("\n"),
    })
}

/// `HH:MM:SS,mmm --> HH:MM:SS,mmm`, exact widths.
fn parse_timing_line(line: &str) -> Option<(f64, f64)> {
    let (start, end) = line.trim().split_once(" --> ")?;
    Some((parse_timestamp(start)?, parse_timestamp(end)?))
}

fn parse_timestamp(s: &str) -> Option<f64> {
    let (clock, millis) = s.split_once(',')?;
    let mut parts = clock.split(':');
    let hours = fixed_digits(parts.next()?, 2)?;
    let minutes = fixed_digits(parts.next()?, 2)?;
    let seconds = fixed_digits(parts.next()?, 2)?;
    if parts.next().is_some() {
        return None;
    }
    let millis = fixed_digits(millis, 3)?;

    Some(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds as f64 + millis as f64 / 1000.0)
}

fn fixed_digits(s: &str, width: usize) -> Option<u32> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrack {
    pub id: String,
    pub file_path: PathBuf,
    pub name: String,
    pub cues: Vec<Cue>,
    pub enabled: bool,
    pub skipped_blocks: usize,
}

/// What the presentation layer gets back after loading: no cue payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleTrackSummary {
    pub id: String,
    pub file_path: PathBuf,
    pub name: String,
    pub cue_count: usize,
    pub enabled: bool,
}

impl SubtitleTrack {
    pub fn from_content(file_path: &Path, content: &str) -> Self {
        let mut cues = Vec::new();
        let mut skipped_blocks = 0;
        for block in parse_blocks(content) {
            match block {
                Ok(cue) => cues.push(cue),
                Err(_) => skipped_blocks += 1,
            }
        }
        if skipped_blocks > 0 {
            log::debug!("Skipped {} malformed blocks in {}", skipped_blocks, file_path.display());
        }

        let name = file_path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("Subtitles")
            .to_string();

        SubtitleTrack {
            id: uuid::Uuid::new_v4().to_string(),
            file_path: file_path.to_path_buf(),
            name,
            cues,
            enabled: true,
            skipped_blocks,
        }
    }

    pub fn summary(&self) -> SubtitleTrackSummary {
        SubtitleTrackSummary {
            id: self.id.clone(),
            file_path: self.file_path.clone(),
            name: self.name.clone(),
            cue_count: self.cues.len(),
            enabled: self.enabled,
        }
    }

    /// Cues covering `time`, in file order. Cues may overlap or be out of order.
    pub fn active_cues(&self, time: f64) -> impl Iterator<Item = &Cue> {
        self.cues.iter().filter(move |cue| cue.is_active_at(time))
    }
}
