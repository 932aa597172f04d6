//! Subscriber process
//!
//! Prints readings for its topics and keeps announcing them on the
//! introspection topic so the gateway sees someone is listening.

use crate::error::{GatewayError, SubscriberError};
use crate::gateway::{supervise, Unit, UnitResult};
use crate::mqtt::config::{valid_client_id, MqttConfig};
use crate::mqtt::message_manager::MQTTMessage;
use crate::mqtt::mqtt_handler::{BusPublisher, MessageHandler, MqttHandler};
use crate::protocol::BusTopic;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_ANNOUNCE_INTERVAL: Duration = Duration::from_secs(15);

/// Validated subscriber arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberSpec {
    pub name: String,
    pub topics: Vec<BusTopic>,
}

impl SubscriberSpec {
    /// Checks `name topic1 [topic2 ...]` before anything is connected
    ///
    /// The name doubles as MQTT client id and is checked as one.
    pub fn parse<S: AsRef<str>>(name: &str, topics: &[S]) -> Result<Self, SubscriberError> {
        if !valid_client_id(name) {
            return Err(SubscriberError::InvalidName(name.to_string()));
        }
        if topics.is_empty() {
            return Err(SubscriberError::MissingTopics);
        }

        let mut accepted: Vec<BusTopic> = Vec::with_capacity(topics.len());
        for raw in topics {
            let raw = raw.as_ref();
            let topic = BusTopic::parse(raw)
                .map_err(|_| SubscriberError::UnknownTopic(raw.to_string()))?;
            if accepted.contains(&topic) {
                return Err(SubscriberError::DuplicateTopic(raw.to_string()));
            }
            accepted.push(topic);
        }

        Ok(Self {
            name: name.to_string(),
            topics: accepted,
        })
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.topics.iter().map(ToString::to_string).collect()
    }
}

/// Periodically publishes the subscribed topics on the introspection topic
pub struct Announcer<P> {
    publisher: P,
    name: String,
    introspection_topic: String,
    topics: Vec<String>,
    interval: Duration,
}

impl<P: BusPublisher> Announcer<P> {
    pub fn new(
        publisher: P,
        spec: &SubscriberSpec,
        introspection_topic: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            publisher,
            name: spec.name.clone(),
            introspection_topic: introspection_topic.into(),
            topics: spec.topic_names(),
            interval,
        }
    }

    pub async fn announce_once(&self) -> Result<(), GatewayError> {
        for topic in &self.topics {
            self.publisher
                .publish(&self.introspection_topic, topic.clone().into_bytes())
                .await?;
            println!("{} published {}", self.name, topic);
        }
        debug!("Announced {} topics", self.topics.len());
        Ok(())
    }

    /// Announces immediately, then once per interval until `shutdown` fires
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        loop {
            self.announce_once().await?;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}

/// Prints every received reading
#[derive(Debug, Clone)]
pub struct ReadingPrinter {
    name: String,
}

impl ReadingPrinter {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl MessageHandler for ReadingPrinter {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        let message = MQTTMessage::from_payload(topic, payload);
        println!("{}", message.render(&self.name));
    }
}

/// Connects, subscribes and runs until Ctrl-C or a bus failure
pub async fn run(
    spec: SubscriberSpec,
    mut broker: MqttConfig,
    introspection_topic: &str,
    interval: Duration,
) -> Result<(), SubscriberError> {
    broker.client_id = spec.name.clone();
    let mut bus = MqttHandler::new(broker);
    for topic in spec.topic_names() {
        bus.add_subscription(topic);
    }
    bus.connect().await?;
    info!("{} subscribed to {}", spec.name, spec.topic_names().join(", "));

    let shutdown = CancellationToken::new();
    let announcer = Announcer::new(bus.handle(), &spec, introspection_topic, interval);
    let printer = ReadingPrinter::new(spec.name.clone());

    let mut units: JoinSet<UnitResult> = JoinSet::new();
    let token = shutdown.clone();
    units.spawn(async move { (Unit::Announcer, announcer.run(token).await) });
    let token = shutdown.clone();
    units.spawn(async move {
        let result = bus.run(printer, token).await.map(|status| {
            debug!("Received {} messages", status.messages_received);
        });
        (Unit::Dispatch, result)
    });

    supervise(units, shutdown).await?;
    Ok(())
}
