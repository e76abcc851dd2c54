use std::sync::Arc;

use tokio::sync::RwLock;

use crate::reading::Reading;

/// Single-slot, in-memory holder of the most recent accepted `Reading`.
///
/// `None` means no message has arrived since startup. Cloning shares the slot,
/// so the ingestion path and the HTTP handlers see the same value. The write
/// lock is only held for the assignment itself.
#[derive(Clone, Default)]
pub struct ReadingCache {
    inner: Arc<RwLock<Option<Reading>>>,
}

impl ReadingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditionally replace the cached reading.
    pub async fn set(&self, reading: Reading) {
        *self.inner.write().await = Some(reading);
    }

    /// Snapshot of the cached reading, `None` before the first message.
    pub async fn get(&self) -> Option<Reading> {
        self.inner.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn make_reading(raw: &str, value: f64) -> Reading {
        Reading::new(raw, value, Utc::now())
    }

    #[tokio::test]
    async fn empty_cache_returns_nothing() {
        let cache = ReadingCache::new();
        assert!(cache.get().await.is_none());
    }

    #[tokio::test]
    async fn set_then_get() {
        let cache = ReadingCache::new();
        cache.set(make_reading("21.45", 21.45)).await;

        let got = cache.get().await.unwrap();
        assert_eq!(got.raw, "21.45");
        assert_eq!(got.value, 21.45);
    }

    #[tokio::test]
    async fn set_overwrites_previous_reading() {
        let cache = ReadingCache::new();
        cache.set(make_reading("20", 20.0)).await;
        cache.set(make_reading("25", 25.0)).await;

        assert_eq!(cache.get().await.unwrap().value, 25.0);
    }

    #[tokio::test]
    async fn repeated_reads_are_identical() {
        let cache = ReadingCache::new();
        cache.set(make_reading("19.5", 19.5)).await;

        let first = cache.get().await;
        let second = cache.get().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn clone_shares_state() {
        let cache = ReadingCache::new();
        let clone = cache.clone();

        cache.set(make_reading("12.0", 12.0)).await;

        // Clone sees the same data
        assert_eq!(clone.get().await.unwrap().raw, "12.0");
    }

    #[tokio::test]
    async fn concurrent_readers_during_writes() {
        let cache = ReadingCache::new();
        let writer = {
            let cache = cache.clone();
            tokio::spawn(async move {
                for i in 0..100 {
                    cache.set(make_reading(&i.to_string(), i as f64)).await;
                }
            })
        };

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    for _ in 0..100 {
                        if let Some(r) = cache.get().await {
                            assert_eq!(r.raw.parse::<f64>().unwrap(), r.value);
                        }
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for r in readers {
            r.await.unwrap();
        }
        assert_eq!(cache.get().await.unwrap().value, 99.0);
    }
}
