//! Periodic purge of expired links.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info};

use crate::store::StoreHandle;

pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Owns the background task that issues `REMOVE_EXPIRED` on a fixed
/// interval. The task stops on [`Sweeper::stop`] or when the sweeper is
/// dropped, whichever comes first.
pub struct Sweeper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Sweeper {
    /// Start sweeping `store` every `interval`. Must be called from within
    /// a tokio runtime.
    pub fn spawn(store: StoreHandle, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            // A slow sweep delays the next one instead of bunching ticks
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            // Skip the first tick which fires immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.remove_expired();
                        if removed > 0 {
                            debug!(removed, "swept expired links");
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            info!("Expiration sweeper stopped");
        });

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Stop the timer and wait for the task to finish
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Action;
    use crate::models::LinkRecord;
    use crate::storage::MemoryStorage;
    use crate::store::{Clock, LinkStore, ManualClock, ReducerOptions};
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000_000;

    fn handle(clock: Arc<ManualClock>) -> StoreHandle {
        StoreHandle::new(LinkStore::with_options(
            Arc::new(MemoryStorage::new()),
            clock,
            ReducerOptions::default(),
        ))
    }

    #[tokio::test]
    async fn test_sweeps_expired_links() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = handle(clock.clone());
        let now = clock.now_millis();
        let gone = LinkRecord::new("gone", "https://a.b", now, Some(now - 1));
        let kept = LinkRecord::new("kept", "https://a.b", now, Some(now + 100_000));
        store.dispatch(Action::AddLink(gone));
        store.dispatch(Action::AddLink(kept));

        let sweeper = Sweeper::spawn(store.clone(), Duration::from_millis(20));
        time::sleep(Duration::from_millis(150)).await;

        let ids: Vec<_> = store.snapshot().links.into_iter().map(|l| l.id).collect();
        assert_eq!(ids, ["kept"]);
        sweeper.stop().await;
    }

    #[tokio::test]
    async fn test_stop_releases_task() {
        let store = handle(Arc::new(ManualClock::new(NOW)));
        let sweeper = Sweeper::spawn(store, Duration::from_millis(10));
        assert!(sweeper.is_running());

        time::timeout(Duration::from_secs(1), sweeper.stop())
            .await
            .expect("sweeper did not stop");
    }

    #[tokio::test]
    async fn test_drop_stops_sweeping() {
        let clock = Arc::new(ManualClock::new(NOW));
        let store = handle(clock.clone());
        let record = LinkRecord::new("soon", "https://a.b", NOW, Some(NOW + 5));
        store.dispatch(Action::AddLink(record));

        drop(Sweeper::spawn(store.clone(), Duration::from_millis(10)));
        clock.advance(10);
        time::sleep(Duration::from_millis(80)).await;

        assert_eq!(store.snapshot().links.len(), 1);
    }
}
