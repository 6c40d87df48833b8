use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::core::error::ErrorKind;

/// A file in use no longer matches what was loaded.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityIssue {
    pub file_path: PathBuf,
    pub reason: ErrorKind,
    pub detected_at: DateTime<Utc>,
}

impl IntegrityIssue {
    pub fn new(file_path: PathBuf, reason: ErrorKind) -> Self {
        Self {
            file_path,
            reason,
            detected_at: Utc::now(),
        }
    }
}

/// Periodic integrity check running as a cancellable tokio task.
///
/// The monitor only owns the schedule. What a tick does is supplied by the
/// caller on `start`, so the session decides how to react to failures.
pub struct IntegrityMonitor {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl IntegrityMonitor {
    pub fn new(interval: Duration) -> Self {
        Self { interval, task: None }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start ticking. The first check happens one interval from now.
    ///
    /// `tick` returns `false` to end the loop for good (the session is gone);
    /// a failed check should still return `true`. Calling `start` on a running
    /// monitor does nothing.
    pub fn start<F, Fut>(&mut self, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        if self.is_running() {
            return;
        }

        let period = self.interval;
        log::debug!("Starting integrity monitor ({:?} interval)", period);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if !tick().await {
                    log::debug!("Integrity monitor target dropped, exiting");
                    break;
                }
            }
        }));
    }

    /// Cancel the pending timer. Stopping a stopped monitor is a no-op.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            log::debug!("Integrity monitor stopped");
        }
    }
}

impl Drop for IntegrityMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_tick(counter: Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<bool> + Send + 'static {
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_every_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut monitor = IntegrityMonitor::new(Duration::from_secs(30));
        monitor.start(counting_tick(ticks.clone()));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(62)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 3);
        assert!(monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_tick() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut monitor = IntegrityMonitor::new(Duration::from_secs(30));
        monitor.start(counting_tick(ticks.clone()));

        tokio::time::sleep(Duration::from_secs(31)).await;
        monitor.stop();
        monitor.stop();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let mut monitor = IntegrityMonitor::new(Duration::from_secs(10));
        monitor.start(counting_tick(ticks.clone()));
        monitor.start(counting_tick(ticks.clone()));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_returning_false_ends_loop() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let mut monitor = IntegrityMonitor::new(Duration::from_secs(5));
        monitor.start(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::future::ready(false)
        });

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!monitor.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_stops_timer() {
        let ticks = Arc::new(AtomicUsize::new(0));
        {
            let mut monitor = IntegrityMonitor::new(Duration::from_secs(5));
            monitor.start(counting_tick(ticks.clone()));
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_issue_serializes_camel_case() {
        let issue = IntegrityIssue::new(PathBuf::from("/media/movie.mkv"), ErrorKind::NotFound);
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["filePath"], "/media/movie.mkv");
        assert_eq!(json["reason"], "NotFound");
        assert!(json.get("detectedAt").is_some());
    }
}
