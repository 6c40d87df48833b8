use crate::core::error::ErrorKind;
use crate::core::media_file::{extension_of, fingerprint, MediaFile, MediaKind, ValidationResult};
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};

/// Stat-level check of a path. Implementations must never read file content.
pub trait FileValidator: Send + Sync {
    fn validate(&self, path: &Path, kind: MediaKind) -> ValidationResult;
}

#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    pub max_file_size: u64,
    pub forbidden_roots: Vec<PathBuf>,
    pub video_extensions: Vec<String>,
    pub subtitle_extensions: Vec<String>,
}

impl ValidationPolicy {
    pub fn allows_extension(&self, kind: MediaKind, extension: &str) -> bool {
        let allowed = match kind {
            MediaKind::Video => &self.video_extensions,
            MediaKind::Subtitle => &self.subtitle_extensions,
        };
        allowed.iter().any(|e| e.eq_ignore_ascii_case(extension))
    }

    /// Sort a path into video or subtitle by extension alone.
    pub fn classify(&self, path: &Path) -> Option<MediaKind> {
        let extension = extension_of(path)?;
        if self.allows_extension(MediaKind::Video, &extension) {
            Some(MediaKind::Video)
        } else if self.allows_extension(MediaKind::Subtitle, &extension) {
            Some(MediaKind::Subtitle)
        } else {
            None
        }
    }

    fn is_forbidden(&self, canonical: &Path) -> bool {
        self.forbidden_roots.iter().any(|root| {
            if canonical.starts_with(root) {
                return true;
            }
            // Roots may themselves be symlinks (/etc -> /private/etc on macOS)
            match std::fs::canonicalize(root) {
                Ok(resolved) => canonical.starts_with(resolved),
                Err(_) => false,
            }
        })
    }
}

/// Validator backed by the real filesystem.
pub struct FsValidator {
    policy: ValidationPolicy,
}

impl FsValidator {
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    fn check(&self, path: &Path, kind: MediaKind) -> Result<MediaFile, ErrorKind> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            io::ErrorKind::PermissionDenied => ErrorKind::Forbidden,
            _ => ErrorKind::NotFound,
        })?;
        if !metadata.is_file() {
            return Err(ErrorKind::NotFound);
        }

        let canonical = std::fs::canonicalize(path).map_err(|_| ErrorKind::NotFound)?;
        if self.policy.is_forbidden(&canonical) {
            return Err(ErrorKind::Forbidden);
        }

        let size = metadata.len();
        if size > self.policy.max_file_size {
            return Err(ErrorKind::TooLarge);
        }

        let extension = extension_of(path).ok_or(ErrorKind::UnsupportedFormat)?;
        if !self.policy.allows_extension(kind, &extension) {
            return Err(ErrorKind::UnsupportedFormat);
        }

        let modified_at: DateTime<Utc> = metadata.modified().map_err(|_| ErrorKind::Io)?.into();
        let created_at = metadata.created().ok().map(DateTime::<Utc>::from);

        Ok(MediaFile {
            path: path.to_path_buf(),
            size,
            modified_at,
            created_at,
            extension,
            kind,
            fingerprint: fingerprint(size, modified_at),
            validated_at: Utc::now(),
        })
    }
}

impl FileValidator for FsValidator {
    fn validate(&self, path: &Path, kind: MediaKind) -> ValidationResult {
        match self.check(path, kind) {
            Ok(metadata) => {
                log::debug!("Validated {} ({} bytes, {})", path.display(), metadata.size, metadata.fingerprint);
                ValidationResult::Valid { metadata }
            }
            Err(reason) => {
                log::debug!("Rejected {}: {}", path.display(), reason);
                ValidationResult::Invalid { reason }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionConfig;
    use crate::test_utils::write_file;

    fn validator() -> FsValidator {
        FsValidator::new(SessionConfig::default().validation_policy())
    }

    #[test]
    fn test_valid_video_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "Holiday.MP4", b"not really a video");

        let result = validator().validate(&path, MediaKind::Video);
        let metadata = result.metadata().expect("video should validate");

        assert_eq!(metadata.size, 18);
        assert_eq!(metadata.extension, "mp4");
        assert_eq!(metadata.kind, MediaKind::Video);
        assert_eq!(metadata.fingerprint, fingerprint(18, metadata.modified_at));
        assert_eq!(metadata.file_name(), "Holiday.MP4");
    }

    #[test]
    fn test_repeated_validation_keeps_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "clip.mkv", b"0123456789");
        let validator = validator();

        let first = validator.validate(&path, MediaKind::Video).into_result().unwrap();
        let second = validator.validate(&path, MediaKind::Video).into_result().unwrap();
        assert_eq!(first.fingerprint, second.fingerprint);
        assert!(first.matches(&second));
    }

    #[test]
    fn test_truncation_changes_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "clip.mkv", b"0123456789");
        let validator = validator();

        let before = validator.validate(&path, MediaKind::Video).into_result().unwrap();
        std::fs::write(&path, b"01234").unwrap();
        let after = validator.validate(&path, MediaKind::Video).into_result().unwrap();
        assert_ne!(before.fingerprint, after.fingerprint);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = validator().validate(&dir.path().join("gone.mp4"), MediaKind::Video);
        assert_eq!(result.reason(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("season1.mkv");
        std::fs::create_dir(&nested).unwrap();
        assert_eq!(validator().validate(&nested, MediaKind::Video).reason(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_forbidden_root() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "movie.mp4", b"data");
        let mut policy = SessionConfig::default().validation_policy();
        policy.forbidden_roots = vec![dir.path().to_path_buf()];

        let result = FsValidator::new(policy).validate(&path, MediaKind::Video);
        assert_eq!(result.reason(), Some(ErrorKind::Forbidden));
    }

    #[test]
    fn test_forbidden_root_through_parent_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let protected = dir.path().join("protected");
        std::fs::create_dir(&protected).unwrap();
        write_file(&protected, "movie.mp4", b"data");
        let other = dir.path().join("other");
        std::fs::create_dir(&other).unwrap();

        let mut policy = SessionConfig::default().validation_policy();
        policy.forbidden_roots = vec![protected.clone()];
        let sneaky = other.join("..").join("protected").join("movie.mp4");

        let result = FsValidator::new(policy).validate(&sneaky, MediaKind::Video);
        assert_eq!(result.reason(), Some(ErrorKind::Forbidden));
    }

    #[test]
    fn test_size_ceiling_checked_before_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(dir.path(), "notes.txt", &[0u8; 32]);
        let mut policy = SessionConfig::default().validation_policy();
        policy.max_file_size = 16;

        let result = FsValidator::new(policy).validate(&path, MediaKind::Video);
        assert_eq!(result.reason(), Some(ErrorKind::TooLarge));
    }

    #[test]
    fn test_extension_depends_on_kind() {
        let dir = tempfile::tempdir().unwrap();
        let subtitle = write_file(dir.path(), "episode.srt", b"1\n");
        let video = write_file(dir.path(), "episode.webm", b"video");
        let validator = validator();

        assert!(validator.validate(&subtitle, MediaKind::Subtitle).is_valid());
        assert_eq!(
            validator.validate(&subtitle, MediaKind::Video).reason(),
            Some(ErrorKind::UnsupportedFormat)
        );
        assert_eq!(
            validator.validate(&video, MediaKind::Subtitle).reason(),
            Some(ErrorKind::UnsupportedFormat)
        );
    }

    #[test]
    fn test_classify_by_extension() {
        let policy = SessionConfig::default().validation_policy();
        assert_eq!(policy.classify(Path::new("a/b/film.M4V")), Some(MediaKind::Video));
        assert_eq!(policy.classify(Path::new("film.ass")), Some(MediaKind::Subtitle));
        assert_eq!(policy.classify(Path::new("film.nfo")), None);
        assert_eq!(policy.classify(Path::new("film")), None);
    }
}
