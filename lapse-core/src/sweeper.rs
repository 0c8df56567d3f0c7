use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::Store;

/// Handle to a running sweeper task.
///
/// Dropping the handle signals the task to stop.
pub(crate) struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Spawns the sweep loop on the current Tokio runtime.
    ///
    /// The caller must have checked that a runtime is available.
    pub(crate) fn spawn<V>(store: Arc<Store<V>>, interval: Duration) -> Self
    where
        V: Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(store, interval, shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Asks the loop to exit after its current cycle
    pub(crate) fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Background loop that periodically removes expired entries
async fn run<V>(store: Arc<Store<V>>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>)
where
    V: Send + Sync + 'static,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // Skip the first immediate tick - we want to wait for the interval first
    ticker.tick().await;

    tracing::info!(interval = ?interval, "sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep(&store);
            }
            changed = shutdown_rx.changed() => {
                // A dropped sender means every cache handle is gone.
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    tracing::info!("sweeper stopped");
}

/// One sweep: scan under the read lock, then remove what expired under the write lock
pub(crate) fn sweep<V>(store: &Store<V>) -> usize {
    let removed = store.cleanup();
    if removed > 0 {
        tracing::debug!(removed, "swept expired entries");
    }
    removed
}
