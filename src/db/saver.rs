//! Background saving of snapshots.

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::models::Snapshot;
use super::store::Database;

/// Cheap handle used by stores to ask for a save without waiting on it.
#[derive(Clone, Debug)]
pub struct SaveHandle {
    tx: mpsc::Sender<()>,
}

impl SaveHandle {
    /// Create a handle and the receiver the saver task listens on.
    ///
    /// The channel holds a single pending request, so a burst of mutations
    /// collapses into one write.
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }

    pub fn request(&self) {
        // Full means a save is already pending and will see this change.
        let _ = self.tx.try_send(());
    }
}

/// Spawn the saver task. `snapshot` is called once per coalesced request.
pub fn spawn_saver<F>(db: Arc<Database>, mut rx: mpsc::Receiver<()>, snapshot: F) -> JoinHandle<()>
where
    F: Fn() -> Snapshot + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            let snap = snapshot();
            let db = db.clone();
            match tokio::task::spawn_blocking(move || db.save(&snap)).await {
                Ok(Ok(())) => tracing::debug!("Saved snapshot"),
                Ok(Err(e)) => tracing::error!("Failed to save snapshot: {}", e),
                Err(e) => tracing::error!("Save task failed: {}", e),
            }
        }
    })
}
