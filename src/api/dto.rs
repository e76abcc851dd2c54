use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{db::models::TemperatureRecord, reading::Reading};

/// Reported as `temperature` until the first message arrives.
pub const NO_DATA_YET: &str = "No data received yet";

/// Body of `GET /clients/1/data.json`.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LatestReadingDto {
    /// Last payload exactly as published, or `"No data received yet"`.
    pub temperature: String,
    /// Always `"active"`.
    pub status: String,
}

impl From<Option<Reading>> for LatestReadingDto {
    fn from(latest: Option<Reading>) -> Self {
        Self {
            temperature: latest.map_or_else(|| NO_DATA_YET.to_owned(), |r| r.raw),
            status: "active".to_owned(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TemperatureRecordDto {
    pub id: Uuid,
    /// Degrees Celsius. `null` for readings stored from unparsable payloads.
    pub temperature: Option<f64>,
    /// Server-side receive time.
    pub timestamp: DateTime<Utc>,
}

impl From<TemperatureRecord> for TemperatureRecordDto {
    fn from(r: TemperatureRecord) -> Self {
        Self {
            id: r.id,
            temperature: Some(r.temperature).filter(|t| !t.is_nan()),
            timestamp: r.recorded_at,
        }
    }
}
