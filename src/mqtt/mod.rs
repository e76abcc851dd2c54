use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, Publish, QoS,
    SubscribeReasonCode,
};
use serde::Serialize;
use tokio::{sync::watch, time};
use tracing::{debug, error, info, warn};

use crate::{config::MqttConfig, sensors::SensorService};

/// Requests the client may queue before `try_subscribe` starts failing.
const REQUEST_CAPACITY: usize = 10;

/// Connection lifecycle of the broker subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Disconnected,
    Connecting,
    /// Connected, but the topic subscription is not (yet) acknowledged.
    Connected,
    Subscribed,
}

impl BridgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            BridgeState::Disconnected => "disconnected",
            BridgeState::Connecting => "connecting",
            BridgeState::Connected => "connected",
            BridgeState::Subscribed => "subscribed",
        }
    }
}

/// Owns the broker connection and feeds every message on the configured topic
/// into [`SensorService`].
///
/// Reconnection is driven by polling the `rumqttc` event loop again after an
/// error; the session is clean, so each new `ConnAck` triggers a fresh
/// subscribe.
pub struct MqttBridge {
    eventloop: EventLoop,
    broker: String,
    reconnect_delay: Duration,
    handler: EventHandler,
}

/// The part of the bridge that reacts to broker events. Kept apart from the
/// `EventLoop` (which is not `Sync`) so it can be borrowed across awaits
/// inside a spawned task.
struct EventHandler {
    client: AsyncClient,
    topic: String,
    service: SensorService,
    state: watch::Sender<BridgeState>,
}

impl MqttBridge {
    pub fn new(config: &MqttConfig, service: SensorService) -> Self {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options
            .set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(5)))
            .set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (state, _) = watch::channel(BridgeState::Disconnected);

        Self {
            eventloop,
            broker: format!("{}:{}", config.host, config.port),
            reconnect_delay: Duration::from_secs(config.reconnect_delay_secs),
            handler: EventHandler {
                client,
                topic: config.topic.clone(),
                service,
                state,
            },
        }
    }

    /// Subscribe to state transitions (used by the health endpoint).
    pub fn state(&self) -> watch::Receiver<BridgeState> {
        self.handler.state.subscribe()
    }

    /// Drives the connection indefinitely.
    /// Spawn this via `tokio::spawn`.
    pub async fn run(self) {
        let MqttBridge {
            mut eventloop,
            broker,
            reconnect_delay,
            handler,
        } = self;

        info!(topic = %handler.topic, broker = %broker, "MQTT bridge started");
        handler.set_state(BridgeState::Connecting);

        loop {
            match eventloop.poll().await {
                Ok(event) => handler.handle_event(event).await,
                Err(ConnectionError::ConnectionRefused(code)) => {
                    warn!(
                        code = ?code,
                        retry_secs = reconnect_delay.as_secs(),
                        "MQTT broker refused connection"
                    );
                    handler.set_state(BridgeState::Connecting);
                    time::sleep(reconnect_delay).await;
                }
                Err(e) => {
                    error!(
                        error = %e,
                        retry_secs = reconnect_delay.as_secs(),
                        "MQTT connection error"
                    );
                    handler.set_state(BridgeState::Connecting);
                    time::sleep(reconnect_delay).await;
                }
            }
        }
    }
}

impl EventHandler {
    async fn handle_event(&self, event: Event) {
        let Event::Incoming(packet) = event else {
            return;
        };

        match packet {
            // Refused connections surface as `ConnectionError::ConnectionRefused`.
            Packet::ConnAck(_) => {
                info!("Connected to MQTT broker");
                self.set_state(BridgeState::Connected);
                self.subscribe();
            }
            Packet::SubAck(ack) => {
                let failed = ack
                    .return_codes
                    .iter()
                    .any(|c| matches!(c, SubscribeReasonCode::Failure));
                if failed {
                    error!(topic = %self.topic, "Broker rejected subscription");
                } else {
                    info!(topic = %self.topic, "Subscribed to topic");
                    self.set_state(BridgeState::Subscribed);
                }
            }
            Packet::Publish(publish) => self.handle_publish(publish).await,
            Packet::Disconnect => {
                warn!("MQTT broker sent disconnect");
                self.set_state(BridgeState::Connecting);
            }
            _ => {}
        }
    }

    async fn handle_publish(&self, publish: Publish) {
        if publish.topic != self.topic {
            debug!(topic = %publish.topic, "Ignoring message on unexpected topic");
            return;
        }
        self.service.handle_payload(&publish.payload).await;
    }

    fn subscribe(&self) {
        if let Err(e) = self.client.try_subscribe(self.topic.as_str(), QoS::AtMostOnce) {
            error!(topic = %self.topic, error = %e, "Failed to subscribe");
        }
    }

    fn set_state(&self, state: BridgeState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(from = previous.as_str(), to = state.as_str(), "MQTT bridge state changed");
        }
    }
}
