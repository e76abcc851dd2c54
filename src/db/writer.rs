use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{error, info, warn};

use super::Store;
use crate::reading::Reading;

/// Fire-and-forget hand-off of readings to a single background writer task.
///
/// The ingestion path never waits on the database: [`submit`](Self::submit)
/// only enqueues. Failed inserts are logged and dropped, never retried. One
/// task drains the queue, so rows are inserted in arrival order.
#[derive(Clone)]
pub struct PersistenceWriter {
    tx: mpsc::Sender<Reading>,
}

impl PersistenceWriter {
    /// Spawn the writer task. It exits once every `PersistenceWriter` clone
    /// has been dropped and the queue is drained.
    pub fn spawn(store: Store, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(store, rx));
        (Self { tx }, handle)
    }

    /// Queue `reading` for insertion. Returns `false` if it was dropped.
    pub fn submit(&self, reading: Reading) -> bool {
        match self.tx.try_send(reading) {
            Ok(()) => true,
            Err(TrySendError::Full(r)) => {
                warn!(temperature = r.value, "Write queue full; dropping reading");
                false
            }
            Err(TrySendError::Closed(r)) => {
                warn!(temperature = r.value, "Writer task gone; dropping reading");
                false
            }
        }
    }
}

async fn run(store: Store, mut rx: mpsc::Receiver<Reading>) {
    while let Some(reading) = rx.recv().await {
        match store.append(&reading).await {
            Ok(id) => {
                info!(id = %id, temperature = reading.value, "Temperature reading inserted")
            }
            Err(e) => error!(
                error = %e,
                temperature = reading.value,
                "Failed to insert temperature reading"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::PgPool;

    use super::*;

    #[tokio::test]
    async fn failed_writes_are_dropped_without_panicking() {
        let (writer, handle) = PersistenceWriter::spawn(Store::new(), 4);
        assert!(writer.submit(Reading::new("1", 1.0, Utc::now())));

        drop(writer);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_reading() {
        let (tx, _rx) = mpsc::channel(1);
        let writer = PersistenceWriter { tx };

        assert!(writer.submit(Reading::new("1", 1.0, Utc::now())));
        assert!(!writer.submit(Reading::new("2", 2.0, Utc::now())));
    }

    #[tokio::test]
    async fn closed_queue_drops_reading() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let writer = PersistenceWriter { tx };

        assert!(!writer.submit(Reading::new("1", 1.0, Utc::now())));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn writes_in_submission_order(pool: PgPool) {
        let store = Store::from_pool(pool);
        let (writer, handle) = PersistenceWriter::spawn(store.clone(), 16);

        let base = Utc::now();
        for i in 0..5 {
            let at = base + chrono::Duration::milliseconds(i);
            writer.submit(Reading::new(i.to_string(), i as f64, at));
        }
        drop(writer);
        handle.await.unwrap();

        let rows = store.recent(10).await.unwrap();
        let temps: Vec<f64> = rows.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![4.0, 3.0, 2.0, 1.0, 0.0]);
    }
}
