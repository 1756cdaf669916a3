//! Background expiration sweeper.
//!
//! One sweeper task runs per manager, started at construction. Each
//! cycle scans the session collection and evicts sessions past their
//! expiration deadline. The task stops when the manager shuts down or
//! is dropped.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, trace};

use crate::config::SweepCadence;

/// A session collection the sweeper can scan.
///
/// Cycles are best-effort: implementations log and skip per-session
/// failures rather than returning them, so one bad session never
/// aborts a cycle.
#[async_trait]
pub(crate) trait Sweepable: Send + Sync + 'static {
    /// Whether the collection currently holds no sessions.
    async fn is_empty(&self) -> bool;

    /// Evict every expired session; returns how many were removed.
    async fn sweep_once(&self) -> usize;
}

/// Handle to a running sweeper task.
pub(crate) struct SweepHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweepHandle {
    /// Spawn a sweeper over `target` with the given cadence.
    pub(crate) fn spawn(target: Arc<dyn Sweepable>, cadence: SweepCadence) -> Self {
        let (shutdown, mut signal) = watch::channel(false);
        let task = tokio::spawn(async move {
            loop {
                match cadence {
                    SweepCadence::Fixed { interval } => {
                        tokio::select! {
                            _ = signal.changed() => break,
                            _ = sleep(interval) => {}
                        }
                        let removed = target.sweep_once().await;
                        if removed > 0 {
                            debug!(removed, "sweep cycle evicted expired sessions");
                        }
                    }
                    SweepCadence::Eager { idle_backoff } => {
                        if target.is_empty().await {
                            tokio::select! {
                                _ = signal.changed() => break,
                                _ = sleep(idle_backoff) => {}
                            }
                            continue;
                        }
                        let removed = target.sweep_once().await;
                        if removed > 0 {
                            debug!(removed, "sweep cycle evicted expired sessions");
                        }
                        match signal.has_changed() {
                            Ok(false) => {}
                            // Stop requested, or the handle was dropped.
                            Ok(true) | Err(_) => break,
                        }
                        // An eager cycle re-scans immediately; yield so it
                        // cannot starve the runtime.
                        tokio::task::yield_now().await;
                    }
                }
            }
            trace!("sweeper stopped");
        });
        Self { shutdown, task }
    }

    /// Stop the sweeper and wait for the task to finish.
    pub(crate) async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::timeout;

    #[derive(Default)]
    struct Recorder {
        empty: AtomicBool,
        cycles: AtomicUsize,
    }

    #[async_trait]
    impl Sweepable for Recorder {
        async fn is_empty(&self) -> bool {
            self.empty.load(Ordering::SeqCst)
        }

        async fn sweep_once(&self) -> usize {
            self.cycles.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    #[tokio::test]
    async fn test_eager_cadence_scans_repeatedly() {
        let recorder = Arc::new(Recorder::default());
        let handle = SweepHandle::spawn(
            recorder.clone(),
            SweepCadence::Eager {
                idle_backoff: Duration::from_millis(10),
            },
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(recorder.cycles.load(Ordering::SeqCst) > 1);

        timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
    }

    #[tokio::test]
    async fn test_eager_cadence_backs_off_when_empty() {
        let recorder = Arc::new(Recorder::default());
        recorder.empty.store(true, Ordering::SeqCst);

        let handle = SweepHandle::spawn(
            recorder.clone(),
            SweepCadence::Eager {
                idle_backoff: Duration::from_secs(60),
            },
        );

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(recorder.cycles.load(Ordering::SeqCst), 0);

        // Stop returns promptly even while the sweeper is backing off.
        timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fixed_cadence_scans_after_interval() {
        let recorder = Arc::new(Recorder::default());
        let handle = SweepHandle::spawn(
            recorder.clone(),
            SweepCadence::Fixed {
                interval: Duration::from_millis(10),
            },
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(recorder.cycles.load(Ordering::SeqCst) >= 1);

        timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_fixed_interval() {
        let recorder = Arc::new(Recorder::default());
        let handle = SweepHandle::spawn(
            recorder.clone(),
            SweepCadence::Fixed {
                interval: Duration::from_secs(60),
            },
        );

        timeout(Duration::from_secs(1), handle.stop()).await.unwrap();
    }
}
