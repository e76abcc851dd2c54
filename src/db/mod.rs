pub mod models;
pub mod writer;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};
use thiserror::Error;
use tokio::{sync::OnceCell, time};
use tracing::{info, warn};
use uuid::Uuid;

use crate::reading::Reading;
use models::TemperatureRecord;

pub use writer::PersistenceWriter;

pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection not established")]
    Unavailable,
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),
}

/// Handle to the durable reading history.
///
/// Starts out unconnected; the pool is attached once by
/// [`connect_in_background`]. Until then every operation fails with
/// [`StoreError::Unavailable`]. Clones share the same pool.
#[derive(Clone, Default)]
pub struct Store {
    pool: Arc<OnceCell<PgPool>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(OnceCell::new_with(Some(pool))),
        }
    }

    /// Attach a connected pool. Returns `false` if one was already attached.
    pub fn attach(&self, pool: PgPool) -> bool {
        self.pool.set(pool).is_ok()
    }

    pub fn is_connected(&self) -> bool {
        self.pool.initialized()
    }

    fn pool(&self) -> Result<&PgPool, StoreError> {
        self.pool.get().ok_or(StoreError::Unavailable)
    }

    /// Insert one reading and return the new record id.
    pub async fn append(&self, reading: &Reading) -> Result<Uuid, StoreError> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO temperature_readings (id, temperature, recorded_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(reading.value)
        .bind(reading.received_at)
        .execute(self.pool()?)
        .await?;
        Ok(id)
    }

    /// The `limit` most recent records, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<TemperatureRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TemperatureRecord>(
            r#"
            SELECT id, temperature, recorded_at
            FROM temperature_readings
            ORDER BY recorded_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }

    /// Every record with `start <= recorded_at <= end`, oldest first.
    ///
    /// Unbounded: a wide range returns the whole matching history.
    pub async fn range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<TemperatureRecord>, StoreError> {
        let rows = sqlx::query_as::<_, TemperatureRecord>(
            r#"
            SELECT id, temperature, recorded_at
            FROM temperature_readings
            WHERE recorded_at >= $1
              AND recorded_at <= $2
            ORDER BY recorded_at ASC
            "#,
        )
        .bind(start)
        .bind(end)
        .fetch_all(self.pool()?)
        .await?;
        Ok(rows)
    }
}

/// Keeps trying to connect and migrate until it succeeds, then attaches the
/// pool to `store`. Spawn this via `tokio::spawn`.
pub async fn connect_in_background(store: Store, database_url: String, retry: Duration) {
    loop {
        match connect(&database_url).await {
            Ok(pool) => {
                store.attach(pool);
                info!("Database ready");
                return;
            }
            Err(e) => {
                warn!(
                    error = %e,
                    retry_secs = retry.as_secs(),
                    "Failed to connect to database; retrying"
                );
                time::sleep(retry).await;
            }
        }
    }
}

async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = create_pool(database_url).await?;
    run_migrations(&pool).await?;
    Ok(pool)
}
