use sensor_gateway::error::GatewayError;
use sensor_gateway::interest::tracker::echo_topic;
use sensor_gateway::interest::{InterestReconciler, InterestSource, InterestTracker, TopicRegistry};
use sensor_gateway::mqtt::mqtt_handler::{BusPublisher, MessageHandler};
use sensor_gateway::protocol::{InterestKey, Metric};
use sensor_gateway::relay::MessageRelay;
use sensor_gateway::serial::SerialSink;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tokio_util::sync::CancellationToken;

/// Broker stand-in that delivers announcement publishes straight to the tracker
#[derive(Clone)]
struct LoopbackBus {
    tracker: InterestTracker,
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl LoopbackBus {
    fn new(tracker: InterestTracker) -> Self {
        Self {
            tracker,
            published: Arc::default(),
        }
    }

    fn published(&self) -> Vec<(String, String)> {
        self.published.lock().unwrap().clone()
    }
}

impl BusPublisher for LoopbackBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        {
            let mut published = self.published.lock().unwrap();
            published.push((topic.to_string(), String::from_utf8_lossy(&payload).into_owned()));
        }
        self.tracker.on_message(topic, &payload).await;
        Ok(())
    }
}

fn gateway_parts() -> (TopicRegistry, LoopbackBus) {
    let registry = TopicRegistry::new();
    let tracker = InterestTracker::new(registry.clone(), "Topic");
    (registry, LoopbackBus::new(tracker))
}

#[tokio::test]
async fn test_echoed_reading_starts_its_node() {
    let (registry, bus) = gateway_parts();
    let mut relay = MessageRelay::new(bus.clone(), Some(echo_topic("Topic")));

    relay.relay_line("7/T/23\n").await.unwrap();

    assert_eq!(
        bus.published(),
        vec![
            ("7/Temperature".to_string(), "23".to_string()),
            ("Topic/echo".to_string(), "7/Temperature".to_string()),
        ]
    );
    assert!(registry.contains(&InterestKey::new("7", Metric::Temperature)).await);

    let (writer, mut reader) = tokio::io::duplex(64);
    let mut reconciler = InterestReconciler::new(
        registry.clone(),
        SerialSink::new(writer),
        Duration::from_secs(30),
    );
    let delta = reconciler.run_cycle().await.unwrap();
    assert_eq!(delta.to_start, vec![InterestKey::new("7", Metric::Temperature)]);

    let mut written = [0u8; 6];
    reader.read_exact(&mut written).await.unwrap();
    assert_eq!(&written, b"7/T/1\n");
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn test_subscriber_announcement_and_malformed_lines() {
    let (registry, bus) = gateway_parts();
    let mut relay = MessageRelay::new(bus.clone(), None);

    assert!(relay.relay_line("garbage").await.unwrap().is_none());
    assert!(relay.relay_line("7/X/1").await.unwrap().is_none());
    assert!(bus.published().is_empty());
    assert_eq!(relay.stats().malformed, 2);

    // a subscriber announcing on the introspection topic
    bus.publish("Topic", b"1.2/Battery".to_vec()).await.unwrap();
    let snapshot = registry.snapshot_and_clear().await;
    assert_eq!(
        snapshot.source_of(&InterestKey::new("1.2", Metric::Battery)),
        Some(InterestSource::Subscriber)
    );
}

#[tokio::test]
async fn test_relay_stops_on_serial_end() {
    let (registry, bus) = gateway_parts();
    let relay = MessageRelay::new(bus.clone(), Some(echo_topic("Topic")));
    let source = tokio_test::io::Builder::new()
        .read(b"7/T/23\n3/B/")
        .read(b"88\nbroken\n")
        .build();

    let err = relay
        .run(BufReader::new(source), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::SerialClosed));
    assert_eq!(err.exit_code(), 3);
    assert!(bus
        .published()
        .contains(&("3/Battery".to_string(), "88".to_string())));
    assert_eq!(registry.len().await, 2);
}
