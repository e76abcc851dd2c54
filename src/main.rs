use anyhow::Result;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use weather_station_service::{
    api::{self, AppState},
    config::Config,
    db::{self, PersistenceWriter, Store},
    mqtt::MqttBridge,
    reading_cache::ReadingCache,
    sensors::SensorService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; variables may come from the environment.
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;

    // The HTTP API starts even while the database is unreachable; history
    // endpoints answer 500 until the background connect succeeds.
    let store = Store::new();
    tokio::spawn(db::connect_in_background(
        store.clone(),
        config.database_url.clone(),
        Duration::from_secs(config.db_connect_retry_secs),
    ));

    let cache = ReadingCache::new();
    let (writer, _writer_task) =
        PersistenceWriter::spawn(store.clone(), config.write_queue_capacity);
    let service = SensorService::new(cache.clone(), writer, config.invalid_payload_policy);

    let bridge = MqttBridge::new(&config.mqtt, service);
    let bridge_state = bridge.state();
    tokio::spawn(bridge.run());

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Weather station server listening");

    let state = AppState {
        cache,
        store,
        bridge_state,
    };
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
