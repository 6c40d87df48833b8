use crate::core::media_file::{MediaKind, ValidationResult};
use crate::core::validator::FileValidator;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

type CacheKey = (PathBuf, MediaKind);

#[derive(Debug, Clone)]
struct CacheEntry {
    result: ValidationResult,
    validated_at: Instant,
}

/// Time-boxed memo of validation results, keyed per path and kind.
///
/// Entries are replaced wholesale under the lock; the validator itself runs
/// outside it so a slow stat never blocks readers of other paths.
pub struct ValidationCache {
    validator: Arc<dyn FileValidator>,
    entries: Mutex<LruCache<CacheKey, CacheEntry>>,
    freshness: Duration,
}

impl ValidationCache {
    pub fn new(validator: Arc<dyn FileValidator>, freshness: Duration, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            validator,
            entries: Mutex::new(LruCache::new(capacity)),
            freshness,
        }
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    pub fn get_or_validate(&self, path: &Path, kind: MediaKind) -> ValidationResult {
        self.get_or_validate_within(path, kind, self.freshness)
    }

    pub fn get_or_validate_within(&self, path: &Path, kind: MediaKind, freshness: Duration) -> ValidationResult {
        let key = (path.to_path_buf(), kind);
        {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = entries.get(&key) {
                if entry.validated_at.elapsed() < freshness {
                    log::trace!("Validation cache hit for {}", path.display());
                    return entry.result.clone();
                }
            }
        }
        self.store(key, self.validator.validate(path, kind))
    }

    /// Skip the lookup and hit the disk, still recording the outcome.
    pub fn revalidate(&self, path: &Path, kind: MediaKind) -> ValidationResult {
        self.store((path.to_path_buf(), kind), self.validator.validate(path, kind))
    }

    pub fn peek(&self, path: &Path, kind: MediaKind) -> Option<ValidationResult> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries
            .peek(&(path.to_path_buf(), kind))
            .map(|entry| entry.result.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).clear();
        log::debug!("Validation cache cleared");
    }

    fn store(&self, key: CacheKey, result: ValidationResult) -> ValidationResult {
        let entry = CacheEntry {
            result: result.clone(),
            validated_at: Instant::now(),
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key, entry);
        result
    }
}
