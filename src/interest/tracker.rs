use super::registry::{InterestSource, TopicRegistry};
use crate::mqtt::mqtt_handler::MessageHandler;
use crate::protocol::InterestKey;
use tracing::{debug, warn};

const ECHO_SUFFIX: &str = "echo";

/// Topic the gateway re-announces relayed readings on
pub fn echo_topic(introspection_topic: &str) -> String {
    format!("{}/{}", introspection_topic, ECHO_SUFFIX)
}

/// Single pattern matching both announcement channels
pub fn subscription_pattern(introspection_topic: &str) -> String {
    format!("{}/#", introspection_topic)
}

/// Folds announcements seen on the bus into the [`TopicRegistry`]
///
/// Two channels carry announcements:
///
/// ```text
/// <introspection>        subscribers publishing their topic list
/// <introspection>/echo   the gateway re-announcing what it relayed
/// ```
///
/// The channel only decides the [`InterestSource`]; the announced topic is
/// always read from the payload.
#[derive(Debug, Clone)]
pub struct InterestTracker {
    registry: TopicRegistry,
    introspection_topic: String,
    echo_topic: String,
}

impl InterestTracker {
    pub fn new(registry: TopicRegistry, introspection_topic: impl Into<String>) -> Self {
        let introspection_topic = introspection_topic.into();
        Self {
            registry,
            echo_topic: echo_topic(&introspection_topic),
            introspection_topic,
        }
    }

    pub fn subscription_pattern(&self) -> String {
        subscription_pattern(&self.introspection_topic)
    }

    pub fn classify(&self, channel: &str) -> Option<InterestSource> {
        if channel == self.introspection_topic {
            Some(InterestSource::Subscriber)
        } else if channel == self.echo_topic {
            Some(InterestSource::SelfEcho)
        } else {
            None
        }
    }

    /// Decodes one announcement payload and records it
    ///
    /// Undecodable payloads are logged and dropped. Returns the recorded key.
    pub async fn observe(&self, payload: &[u8], source: InterestSource) -> Option<InterestKey> {
        let text = match std::str::from_utf8(payload) {
            Ok(text) => text,
            Err(e) => {
                warn!("Dropping non UTF-8 announcement: {}", e);
                return None;
            }
        };

        match InterestKey::from_announcement(text) {
            Ok(key) => {
                if self.registry.add(key.clone(), source).await {
                    debug!("New interest in {} ({:?})", key, source);
                }
                Some(key)
            }
            Err(e) => {
                warn!("Dropping announcement '{}': {}", text.trim(), e);
                None
            }
        }
    }
}

impl MessageHandler for InterestTracker {
    async fn on_message(&self, topic: &str, payload: &[u8]) {
        match self.classify(topic) {
            Some(source) => {
                self.observe(payload, source).await;
            }
            None => debug!("Ignoring message on unrelated topic {}", topic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Metric;

    fn tracker() -> (InterestTracker, TopicRegistry) {
        let registry = TopicRegistry::new();
        (InterestTracker::new(registry.clone(), "Topic"), registry)
    }

    #[test]
    fn test_channels() {
        let (tracker, _) = tracker();
        assert_eq!(tracker.subscription_pattern(), "Topic/#");
        assert_eq!(tracker.classify("Topic"), Some(InterestSource::Subscriber));
        assert_eq!(tracker.classify("Topic/echo"), Some(InterestSource::SelfEcho));
        assert_eq!(tracker.classify("7/Temperature"), None);
    }

    #[tokio::test]
    async fn test_announcement_lands_in_registry_with_short_code() {
        let (tracker, registry) = tracker();
        tracker.on_message("Topic", b"5/Battery").await;
        tracker.on_message("Topic", b"5/Battery").await;
        tracker.on_message("Topic/echo", b"7/Temperature").await;

        let snapshot = registry.snapshot_and_clear().await;
        assert_eq!(
            snapshot.keys().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["5/B", "7/T"]
        );
        assert_eq!(
            snapshot.source_of(&InterestKey::new("7", Metric::Temperature)),
            Some(InterestSource::SelfEcho)
        );
    }

    #[tokio::test]
    async fn test_payload_decides_topic_not_channel() {
        let (tracker, registry) = tracker();
        // channel name looks like a reading topic, payload is what counts
        tracker.on_message("Topic", b"3/Temperature").await;
        tracker.on_message("3/Battery", b"3/Battery").await;

        let snapshot = registry.snapshot_and_clear().await;
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains(&InterestKey::new("3", Metric::Temperature)));
    }

    #[tokio::test]
    async fn test_undecodable_announcements_are_dropped() {
        let (tracker, registry) = tracker();
        tracker.on_message("Topic", b"garbage").await;
        tracker.on_message("Topic", b"4/Humidity").await;
        tracker.on_message("Topic", &[0xff, 0xfe, 0x2f]).await;

        assert!(registry.is_empty().await);
    }
}
