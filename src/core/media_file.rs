use crate::core::error::ErrorKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which allow-list a path is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    Video,
    Subtitle,
}

/// Snapshot of a file as it looked when it was validated.
///
/// Never mutated: a re-validation produces a new `MediaFile`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub extension: String,
    pub kind: MediaKind,
    pub fingerprint: String,
    pub validated_at: DateTime<Utc>,
}

impl MediaFile {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string()
    }

    /// True when `other` describes the same on-disk content as far as the
    /// fingerprint can tell.
    pub fn matches(&self, other: &MediaFile) -> bool {
        self.path == other.path && self.fingerprint == other.fingerprint
    }
}

/// Identity token for a file built from its size and modification time.
///
/// Content is never read, so two distinct files with identical size and mtime
/// share a fingerprint. That is acceptable: this tracks drift, not tampering.
pub fn fingerprint(size: u64, modified_at: DateTime<Utc>) -> String {
    format!(
        "{:x}-{}.{:09}",
        size,
        modified_at.timestamp(),
        modified_at.timestamp_subsec_nanos()
    )
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ValidationResult {
    Valid { metadata: MediaFile },
    Invalid { reason: ErrorKind },
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid { .. })
    }

    pub fn metadata(&self) -> Option<&MediaFile> {
        match self {
            ValidationResult::Valid { metadata } => Some(metadata),
            ValidationResult::Invalid { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<ErrorKind> {
        match self {
            ValidationResult::Valid { .. } => None,
            ValidationResult::Invalid { reason } => Some(*reason),
        }
    }

    pub fn into_result(self) -> Result<MediaFile, ErrorKind> {
        match self {
            ValidationResult::Valid { metadata } => Ok(metadata),
            ValidationResult::Invalid { reason } => Err(reason),
        }
    }
}

impl From<ErrorKind> for ValidationResult {
    fn from(reason: ErrorKind) -> Self {
        ValidationResult::Invalid { reason }
    }
}

/// Lowercased extension without the leading dot, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
}
