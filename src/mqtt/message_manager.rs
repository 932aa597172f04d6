use chrono::NaiveDateTime;
use std::fmt;

const PREVIEW_LEN: usize = 32;

/// A message received from the bus, stamped on arrival
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MQTTMessage {
    topic: String,
    content: String,
    timestamp: NaiveDateTime,
}

impl fmt::Display for MQTTMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.content.chars().take(PREVIEW_LEN).collect();
        write!(f, "{} - {}: {}", self.timestamp.format("%H:%M:%S"), self.topic, preview)
    }
}

impl MQTTMessage {
    pub fn from_topic(topic: String, content: String) -> Self {
        Self::at(topic, content, chrono::Local::now().naive_local())
    }

    pub fn at(topic: String, content: String, timestamp: NaiveDateTime) -> Self {
        MQTTMessage {
            topic,
            content,
            timestamp,
        }
    }

    /// Lossy decode of a raw publish
    pub fn from_payload(topic: &str, payload: &[u8]) -> Self {
        Self::from_topic(topic.to_string(), String::from_utf8_lossy(payload).into_owned())
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Line printed by a subscriber for a received reading
    pub fn render(&self, receiver: &str) -> String {
        format!(
            "{} {} got message: {} with topic: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            receiver,
            self.content,
            self.topic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn stamp() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 5, 1)
            .unwrap()
            .and_hms_opt(12, 30, 5)
            .unwrap()
    }

    #[test]
    fn test_render() {
        let msg = MQTTMessage::at("7/Temperature".into(), "23".into(), stamp());
        assert_eq!(
            msg.render("alice"),
            "2024-05-01 12:30:05 alice got message: 23 with topic: 7/Temperature"
        );
        assert_eq!(msg.to_string(), "12:30:05 - 7/Temperature: 23");
    }

    #[test]
    fn test_short_and_invalid_payloads_do_not_panic() {
        let msg = MQTTMessage::from_payload("1/Battery", &[0xff, b'4']);
        assert_eq!(msg.topic(), "1/Battery");
        assert!(msg.content().ends_with('4'));
        let _ = msg.to_string();
    }
}
