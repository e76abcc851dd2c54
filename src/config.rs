use std::str::FromStr;

use anyhow::{Context, Result};

// ---------------------------------------------------------------------------
// InvalidPayloadPolicy
// ---------------------------------------------------------------------------

/// What the ingestion path does with a payload that is not a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidPayloadPolicy {
    /// Log and discard: cache and history are left untouched.
    #[default]
    Reject,
    /// Cache the raw text and persist a `NaN` reading.
    StoreNan,
}

impl FromStr for InvalidPayloadPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "reject" => Ok(Self::Reject),
            "store_nan" => Ok(Self::StoreNan),
            other => Err(anyhow::anyhow!("unknown invalid payload policy: {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    /// The single topic carrying temperature payloads.
    pub topic: String,
    pub client_id: String,
    pub keep_alive_secs: u64,
    /// Pause between reconnect attempts after a transport error.
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    /// Pause between database connection attempts at startup.
    pub db_connect_retry_secs: u64,
    pub server_host: String,
    pub server_port: u16,
    pub mqtt: MqttConfig,
    pub invalid_payload_policy: InvalidPayloadPolicy,
    /// Readings waiting for the database writer before new ones are dropped.
    pub write_queue_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let optional =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            database_url: lookup("DATABASE_URL")
                .context("missing required env var: DATABASE_URL")?,
            db_connect_retry_secs: positive(
                "DB_CONNECT_RETRY_SECS",
                optional("DB_CONNECT_RETRY_SECS", "10"),
            )?,
            server_host: optional("SERVER_HOST", "0.0.0.0"),
            server_port: optional("SERVER_PORT", "3000")
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            mqtt: MqttConfig {
                host: optional("MQTT_HOST", "localhost"),
                port: optional("MQTT_PORT", "1883")
                    .parse()
                    .context("MQTT_PORT must be a valid port number")?,
                topic: optional("MQTT_TOPIC", "weather/temperature"),
                client_id: lookup("MQTT_CLIENT_ID").unwrap_or_else(default_client_id),
                keep_alive_secs: positive(
                    "MQTT_KEEP_ALIVE_SECS",
                    optional("MQTT_KEEP_ALIVE_SECS", "30"),
                )?,
                reconnect_delay_secs: positive(
                    "MQTT_RECONNECT_DELAY_SECS",
                    optional("MQTT_RECONNECT_DELAY_SECS", "5"),
                )?,
            },
            invalid_payload_policy: optional("INVALID_PAYLOAD_POLICY", "reject")
                .parse()
                .context("INVALID_PAYLOAD_POLICY must be 'reject' or 'store_nan'")?,
            write_queue_capacity: positive(
                "WRITE_QUEUE_CAPACITY",
                optional("WRITE_QUEUE_CAPACITY", "256"),
            )?,
        })
    }
}

/// Parse a strictly positive integer.
fn positive<T>(key: &str, raw: String) -> Result<T>
where
    T: FromStr + Default + PartialEq,
{
    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("{key} must be a positive integer, got {raw:?}"))?;
    anyhow::ensure!(value != T::default(), "{key} must be a positive integer, got 0");
    Ok(value)
}

/// Random suffix so two instances never kick each other off the broker.
fn default_client_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("weather_station_{}", &id[..8])
}
