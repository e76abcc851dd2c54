use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Row of the append-only `temperature_readings` table.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TemperatureRecord {
    pub id: Uuid,
    /// Degrees Celsius. May be `NaN` when invalid payloads are stored.
    pub temperature: f64,
    pub recorded_at: DateTime<Utc>,
}
