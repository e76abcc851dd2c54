use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    config::InvalidPayloadPolicy,
    db::PersistenceWriter,
    reading::{parse_payload, Reading},
    reading_cache::ReadingCache,
};

/// Turns raw broker payloads into readings.
///
/// For every accepted payload the cache is overwritten first, then the
/// reading is handed to the writer. The database write is never awaited here,
/// so the cache may briefly be ahead of (or diverge from) the stored history.
#[derive(Clone)]
pub struct SensorService {
    cache: ReadingCache,
    writer: PersistenceWriter,
    policy: InvalidPayloadPolicy,
}

impl SensorService {
    pub fn new(
        cache: ReadingCache,
        writer: PersistenceWriter,
        policy: InvalidPayloadPolicy,
    ) -> Self {
        Self { cache, writer, policy }
    }

    /// Process one payload. Returns the reading that was cached, or `None`
    /// when the payload was rejected.
    pub async fn handle_payload(&self, payload: &[u8]) -> Option<Reading> {
        let received_at = Utc::now();
        let raw = String::from_utf8_lossy(payload).into_owned();

        let value = match parse_payload(payload) {
            Ok(v) => v,
            Err(e) => match self.policy {
                InvalidPayloadPolicy::Reject => {
                    warn!(payload = %raw, error = %e, "Rejecting temperature payload");
                    return None;
                }
                InvalidPayloadPolicy::StoreNan => {
                    warn!(
                        payload = %raw,
                        error = %e,
                        "Storing unparsable temperature payload as NaN"
                    );
                    f64::NAN
                }
            },
        };

        let reading = Reading::new(raw, value, received_at);
        debug!(temperature = reading.value, "Temperature data received");

        self.cache.set(reading.clone()).await;
        self.writer.submit(reading.clone());

        Some(reading)
    }
}

#[cfg(test)]
mod tests {
    use sqlx::PgPool;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::db::Store;

    fn service(
        store: Store,
        policy: InvalidPayloadPolicy,
    ) -> (SensorService, ReadingCache, JoinHandle<()>) {
        let cache = ReadingCache::new();
        let (writer, handle) = PersistenceWriter::spawn(store, 16);
        (SensorService::new(cache.clone(), writer, policy), cache, handle)
    }

    #[tokio::test]
    async fn valid_payload_updates_cache() {
        let (svc, cache, _) = service(Store::new(), InvalidPayloadPolicy::Reject);

        let reading = svc.handle_payload(b"23.5").await.unwrap();
        assert_eq!(reading.value, 23.5);

        let cached = cache.get().await.unwrap();
        assert_eq!(cached.raw, "23.5");
        assert_eq!(cached.value, 23.5);
    }

    #[tokio::test]
    async fn rejected_payload_leaves_cache_untouched() {
        let (svc, cache, _) = service(Store::new(), InvalidPayloadPolicy::Reject);

        assert!(svc.handle_payload(b"not-a-number").await.is_none());
        assert!(cache.get().await.is_none());

        svc.handle_payload(b"20").await;
        assert!(svc.handle_payload(b"oops").await.is_none());
        assert_eq!(cache.get().await.unwrap().raw, "20");
    }

    #[tokio::test]
    async fn store_nan_policy_caches_raw_text() {
        let (svc, cache, _) = service(Store::new(), InvalidPayloadPolicy::StoreNan);

        let reading = svc.handle_payload(b"not-a-number").await.unwrap();
        assert!(reading.value.is_nan());
        assert_eq!(cache.get().await.unwrap().raw, "not-a-number");
    }

    #[tokio::test]
    async fn cache_is_updated_even_when_store_is_down() {
        let (svc, cache, handle) = service(Store::new(), InvalidPayloadPolicy::Reject);

        svc.handle_payload(b"18.2").await;
        drop(svc);
        handle.await.unwrap();

        assert_eq!(cache.get().await.unwrap().value, 18.2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn accepted_payload_is_persisted(pool: PgPool) {
        let store = Store::from_pool(pool);
        let (svc, _, handle) = service(store.clone(), InvalidPayloadPolicy::Reject);

        svc.handle_payload(b"23.5").await;
        drop(svc);
        handle.await.unwrap();

        let rows = store.recent(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, 23.5);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn rejected_payload_is_not_persisted(pool: PgPool) {
        let store = Store::from_pool(pool);
        let (svc, _, handle) = service(store.clone(), InvalidPayloadPolicy::Reject);

        svc.handle_payload(b"not-a-number").await;
        drop(svc);
        handle.await.unwrap();

        assert!(store.recent(10).await.unwrap().is_empty());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn store_nan_policy_persists_nan(pool: PgPool) {
        let store = Store::from_pool(pool);
        let (svc, _, handle) = service(store.clone(), InvalidPayloadPolicy::StoreNan);

        svc.handle_payload(b"not-a-number").await;
        drop(svc);
        handle.await.unwrap();

        let rows = store.recent(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].temperature.is_nan());
    }
}
