//! Shutdown coordination for the gateway.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Number of tasks still listening.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Wait for `tasks` to finish, aborting whatever is still running after
/// `grace`. Returns how many tasks had to be aborted.
pub async fn drain<T>(tasks: Vec<JoinHandle<T>>, grace: Duration) -> usize {
    let deadline = tokio::time::Instant::now() + grace;
    let mut aborted = 0;

    for mut task in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Task ended abnormally"),
            Err(_) => {
                task.abort();
                aborted += 1;
            }
        }
    }

    if aborted > 0 {
        tracing::warn!(aborted, grace = ?grace, "Forced shutdown after grace period");
    }
    aborted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_see_trigger() {
        let shutdown = Shutdown::new();
        let mut rx = shutdown.subscribe();
        assert_eq!(shutdown.receiver_count(), 1);

        shutdown.trigger();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_stragglers() {
        let quick = tokio::spawn(async {});
        let stuck = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });

        let aborted = drain(vec![quick, stuck], Duration::from_secs(1)).await;
        assert_eq!(aborted, 1);
    }
}
