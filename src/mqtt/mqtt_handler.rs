use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Local};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::MqttConfig;
use crate::error::GatewayError;

const REQUEST_CAPACITY: usize = 100;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Publishing side of the bus
pub trait BusPublisher: Send + Sync {
    fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// Receives every inbound publish from the dispatch loop
///
/// Runs on the dispatch loop itself, so it must not wait on anything slow.
pub trait MessageHandler: Send + Sync + 'static {
    fn on_message(&self, topic: &str, payload: &[u8]) -> impl Future<Output = ()> + Send;
}

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

#[derive(Clone, Debug, Default)]
pub struct MQTTStatus {
    pub connection_state: ConnectionState,
    pub messages_received: usize,
    pub reconnects: u32,
    pub last_activity: Option<DateTime<Local>>,
}

/// Cloneable publishing handle
#[derive(Clone, Debug)]
pub struct BusHandle {
    client: AsyncClient,
}

impl BusPublisher for BusHandle {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| GatewayError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Owns the rumqttc event loop
///
/// Nothing reaches the broker unless the event loop is polled, so after
/// [`MqttHandler::connect`] the handler has to be driven by
/// [`MqttHandler::run`] for publishes from any [`BusHandle`] to go out.
pub struct MqttHandler {
    status: MQTTStatus,
    client: AsyncClient,
    event_loop: EventLoop,
    config: MqttConfig,
    subscriptions: Vec<String>,
}

impl MqttHandler {
    pub fn new(config: MqttConfig) -> Self {
        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqtt_options.set_keep_alive(config.keep_alive());

        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_CAPACITY);

        MqttHandler {
            status: MQTTStatus::default(),
            client,
            event_loop,
            config,
            subscriptions: Vec::new(),
        }
    }

    pub fn handle(&self) -> BusHandle {
        BusHandle {
            client: self.client.clone(),
        }
    }

    /// Registers a pattern that is (re)subscribed on every connection
    pub fn add_subscription(&mut self, pattern: impl Into<String>) {
        self.subscriptions.push(pattern.into());
    }

    pub fn status(&self) -> &MQTTStatus {
        &self.status
    }

    /// Polls the event loop until the broker acknowledged the connection
    pub async fn connect(&mut self) -> Result<(), GatewayError> {
        info!(
            "Connecting to broker {}:{} as {}",
            self.config.host, self.config.port, self.config.client_id
        );
        self.status.connection_state = ConnectionState::Connecting;

        let connected = tokio::time::timeout(CONNECT_TIMEOUT, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                        debug!("Connection acknowledged: {:?}", ack.code);
                        return Ok(());
                    }
                    Ok(event) => debug!("Event while connecting: {:?}", event),
                    Err(e) => return Err(GatewayError::Connection(e.to_string())),
                }
            }
        })
        .await
        .map_err(|_| {
            GatewayError::Connection(format!(
                "No answer from {}:{} within {:?}",
                self.config.host, self.config.port, CONNECT_TIMEOUT
            ))
        });

        match connected {
            Ok(Ok(())) => {
                self.on_connected()?;
                info!("Connected to broker");
                Ok(())
            }
            Ok(Err(e)) | Err(e) => {
                self.status.connection_state = ConnectionState::Failed;
                error!("{}", e);
                Err(e)
            }
        }
    }

    fn on_connected(&mut self) -> Result<(), GatewayError> {
        self.status.connection_state = ConnectionState::Connected;
        self.status.last_activity = Some(Local::now());
        for pattern in &self.subscriptions {
            self.client
                .try_subscribe(pattern.as_str(), QoS::AtMostOnce)
                .map_err(|e| GatewayError::Subscribe {
                    topic: pattern.clone(),
                    reason: e.to_string(),
                })?;
            debug!("Subscribed to {}", pattern);
        }
        Ok(())
    }

    /// Dispatch loop: drives the connection and hands every publish to `handler`
    ///
    /// Returns when `shutdown` is cancelled (after disconnecting) or when the
    /// connection is lost for good.
    pub async fn run<H: MessageHandler>(
        mut self,
        handler: H,
        shutdown: CancellationToken,
    ) -> Result<MQTTStatus, GatewayError> {
        let mut failures: u32 = 0;

        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.disconnect().await;
                    return Ok(self.status);
                }
                event = self.event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    self.status.messages_received += 1;
                    self.status.last_activity = Some(Local::now());
                    handler.on_message(&publish.topic, &publish.payload[..]).await;
                }
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    if failures > 0 {
                        info!("Reconnected to broker after {} attempt(s)", failures);
                    }
                    failures = 0;
                    self.on_connected()?;
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker sent disconnect");
                }
                Ok(_) => {}
                Err(e) => {
                    error!("Gateway lost connection to broker: {}", e);
                    failures += 1;
                    if failures > self.config.reconnect_attempts {
                        self.status.connection_state = ConnectionState::Failed;
                        return Err(GatewayError::ConnectionLost(e.to_string()));
                    }

                    self.status.connection_state = ConnectionState::Reconnecting;
                    self.status.reconnects += 1;
                    let backoff = self.config.backoff(failures);
                    warn!(
                        "Reconnecting in {:?} (attempt {}/{})",
                        backoff, failures, self.config.reconnect_attempts
                    );
                    tokio::select! {
                        biased;
                        _ = shutdown.cancelled() => {
                            self.status.connection_state = ConnectionState::Disconnected;
                            return Ok(self.status);
                        }
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    }

    async fn disconnect(&mut self) {
        if self.status.connection_state != ConnectionState::Connected {
            self.status.connection_state = ConnectionState::Disconnected;
            return;
        }
        info!("Disconnecting from broker");
        if let Err(e) = self.client.try_disconnect() {
            warn!("Failed to request disconnect: {}", e);
            self.status.connection_state = ConnectionState::Disconnected;
            return;
        }

        let flushed = tokio::time::timeout(DISCONNECT_TIMEOUT, async {
            loop {
                match self.event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Event loop closed while disconnecting: {}", e);
                        break;
                    }
                }
            }
        })
        .await;
        if flushed.is_err() {
            warn!("Disconnect was not acknowledged within {:?}", DISCONNECT_TIMEOUT);
        }
        self.status.connection_state = ConnectionState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_to_unreachable_broker_fails() {
        // port 1 on localhost refuses connections
        let config = MqttConfig {
            host: "127.0.0.1".to_string(),
            port: 1,
            client_id: "sensor-gateway-test".to_string(),
            ..MqttConfig::default()
        };
        let mut handler = MqttHandler::new(config);

        let err = handler.connect().await.unwrap_err();
        assert!(matches!(err, GatewayError::Connection(_)));
        assert_eq!(handler.status().connection_state, ConnectionState::Failed);
    }

    #[tokio::test]
    async fn test_run_returns_on_shutdown_without_connection() {
        let handler = MqttHandler::new(MqttConfig::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        struct Ignore;
        impl MessageHandler for Ignore {
            async fn on_message(&self, _topic: &str, _payload: &[u8]) {}
        }

        let status = handler.run(Ignore, shutdown).await.unwrap();
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
    }
}
