//! Wire vocabulary shared by the serial link and the bus
//!
//! The sensor network and the bus name the same measurement differently:
//!
//! ```text
//! serial in   7/T/23        nodeId/metricCode/value
//! bus topic   7/Temperature nodeId/MetricName
//! registry    7/T           nodeId/metricCode
//! serial out  7/T/1         nodeId/metricCode/{0 = stop, 1 = start}
//!             P | O         send mode, no terminator
//! ```
//!
//! Every conversion between those forms lives here.

use crate::error::ProtocolError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker appended to an interest key to ask a node to start sending
pub const START_MARKER: char = '1';
/// Marker appended to an interest key to ask a node to stop sending
pub const STOP_MARKER: char = '0';
/// Frame delimiter written after start and stop tokens
pub const TOKEN_TERMINATOR: char = '\n';

/// Rejects node ids that cannot be part of a publish topic
fn check_node_id(node_id: &str, input: &str) -> Result<(), ProtocolError> {
    if node_id.is_empty() {
        return Err(ProtocolError::EmptyNodeId(input.to_string()));
    }
    if node_id.contains(['+', '#', '\0']) {
        return Err(ProtocolError::InvalidNodeId(node_id.to_string()));
    }
    Ok(())
}

/// Measurement kinds reported by the sensor nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Temperature,
    Battery,
}

impl Metric {
    pub const ALL: [Metric; 2] = [Metric::Temperature, Metric::Battery];

    /// Short code used on the serial link
    pub fn code(self) -> &'static str {
        match self {
            Metric::Temperature => "T",
            Metric::Battery => "B",
        }
    }

    /// Human readable name used in bus topics
    pub fn name(self) -> &'static str {
        match self {
            Metric::Temperature => "Temperature",
            Metric::Battery => "Battery",
        }
    }

    pub fn from_code(code: &str) -> Result<Self, ProtocolError> {
        match code {
            "T" => Ok(Metric::Temperature),
            "B" => Ok(Metric::Battery),
            other => Err(ProtocolError::UnknownMetricCode(other.to_string())),
        }
    }

    pub fn from_name(name: &str) -> Result<Self, ProtocolError> {
        match name {
            "Temperature" => Ok(Metric::Temperature),
            "Battery" => Ok(Metric::Battery),
            other => Err(ProtocolError::UnknownMetricName(other.to_string())),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One decoded line of serial input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorReading {
    pub node_id: String,
    pub metric: Metric,
    pub value: String,
}

impl SensorReading {
    /// Parses `nodeId/metricCode/value`
    ///
    /// Only the first two `/` separate fields, the value keeps the rest of the line.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let line = line.trim_end();
        let mut fields = line.splitn(3, '/');
        let (Some(node_id), Some(code), Some(value)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ProtocolError::MissingField(line.to_string()));
        };
        check_node_id(node_id, line)?;
        let metric = Metric::from_code(code)?;

        Ok(Self {
            node_id: node_id.to_string(),
            metric,
            value: value.to_string(),
        })
    }

    pub fn bus_topic(&self) -> BusTopic {
        BusTopic::new(self.node_id.clone(), self.metric)
    }
}

/// Topic a reading is published on: `nodeId/MetricName`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BusTopic {
    node_id: String,
    metric: Metric,
}

impl BusTopic {
    pub fn new(node_id: impl Into<String>, metric: Metric) -> Self {
        Self {
            node_id: node_id.into(),
            metric,
        }
    }

    /// Strict parse of `nodeId/MetricName`
    pub fn parse(topic: &str) -> Result<Self, ProtocolError> {
        let topic = topic.trim();
        let mut fields = topic.split('/');
        let (Some(node_id), Some(name), None) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(ProtocolError::InvalidTopic(topic.to_string()));
        };
        check_node_id(node_id, topic)?;
        Ok(Self::new(node_id, Metric::from_name(name)?))
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn interest_key(&self) -> InterestKey {
        InterestKey::new(self.node_id.clone(), self.metric)
    }
}

impl fmt::Display for BusTopic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.metric.name())
    }
}

/// Registry key: `nodeId/metricCode`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InterestKey {
    node_id: String,
    metric: Metric,
}

impl InterestKey {
    pub fn new(node_id: impl Into<String>, metric: Metric) -> Self {
        Self {
            node_id: node_id.into(),
            metric,
        }
    }

    /// Decodes an announcement payload (`nodeId/MetricName`) into its key
    pub fn from_announcement(payload: &str) -> Result<Self, ProtocolError> {
        BusTopic::parse(payload).map(|topic| topic.interest_key())
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }
}

impl fmt::Display for InterestKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.node_id, self.metric.code())
    }
}

/// Reporting strategy of the sensor nodes, selected by the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SendMode {
    /// `P`: send data periodically
    Periodic,
    /// `O`: send data on change of value
    OnChange,
}

impl SendMode {
    pub fn code(self) -> char {
        match self {
            SendMode::Periodic => 'P',
            SendMode::OnChange => 'O',
        }
    }

    /// Case sensitive, the whole input must be exactly one mode character
    pub fn from_input(input: &str) -> Option<Self> {
        match input {
            "P" => Some(SendMode::Periodic),
            "O" => Some(SendMode::OnChange),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            SendMode::Periodic => "Data will be sent periodically",
            SendMode::OnChange => "Data will be sent on change",
        }
    }
}

/// A logical unit written to the serial sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlToken {
    Start(InterestKey),
    Stop(InterestKey),
    Mode(SendMode),
}

impl ControlToken {
    /// Bytes written to the serial sink
    ///
    /// Start and stop tokens end with [`TOKEN_TERMINATOR`], a mode is the bare character.
    pub fn encode(&self) -> String {
        match self {
            ControlToken::Mode(_) => self.to_string(),
            _ => format!("{}{}", self, TOKEN_TERMINATOR),
        }
    }
}

impl fmt::Display for ControlToken {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ControlToken::Start(key) => write!(f, "{}/{}", key, START_MARKER),
            ControlToken::Stop(key) => write!(f, "{}/{}", key, STOP_MARKER),
            ControlToken::Mode(mode) => write!(f, "{}", mode.code()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_code_round_trip() {
        for metric in Metric::ALL {
            assert_eq!(Metric::from_code(metric.code()), Ok(metric));
            assert_eq!(Metric::from_name(metric.name()), Ok(metric));
        }
        assert_eq!(Metric::from_code("T").map(Metric::name), Ok("Temperature"));
        assert_eq!(Metric::from_code("B").map(Metric::name), Ok("Battery"));
    }

    #[test]
    fn test_parse_reading() {
        let reading = SensorReading::parse("7/T/23").unwrap();
        assert_eq!(reading.node_id, "7");
        assert_eq!(reading.metric, Metric::Temperature);
        assert_eq!(reading.value, "23");
        assert_eq!(reading.bus_topic().to_string(), "7/Temperature");
    }

    #[test]
    fn test_parse_reading_keeps_rest_of_line_as_value() {
        let reading = SensorReading::parse("1.2/B/3/1\r\n").unwrap();
        assert_eq!(reading.node_id, "1.2");
        assert_eq!(reading.metric, Metric::Battery);
        assert_eq!(reading.value, "3/1");
    }

    #[test]
    fn test_parse_malformed_readings() {
        assert!(matches!(
            SensorReading::parse("7/T"),
            Err(ProtocolError::MissingField(_))
        ));
        assert!(matches!(
            SensorReading::parse(""),
            Err(ProtocolError::MissingField(_))
        ));
        assert!(matches!(
            SensorReading::parse("/T/23"),
            Err(ProtocolError::EmptyNodeId(_))
        ));
        assert_eq!(
            SensorReading::parse("7/Temperature/23"),
            Err(ProtocolError::UnknownMetricCode("Temperature".into()))
        );
    }

    #[test]
    fn test_wildcard_node_ids_are_rejected() {
        assert_eq!(
            SensorReading::parse("+/T/5"),
            Err(ProtocolError::InvalidNodeId("+".into()))
        );
        assert_eq!(
            SensorReading::parse("a#/B/3"),
            Err(ProtocolError::InvalidNodeId("a#".into()))
        );
        assert_eq!(
            SensorReading::parse("7\0/T/1"),
            Err(ProtocolError::InvalidNodeId("7\0".into()))
        );
        assert_eq!(
            BusTopic::parse("#/Temperature"),
            Err(ProtocolError::InvalidNodeId("#".into()))
        );
        assert!(InterestKey::from_announcement("+/Battery").is_err());
    }

    #[test]
    fn test_announcement_maps_to_short_code() {
        let key = InterestKey::from_announcement("5/Battery").unwrap();
        assert_eq!(key.to_string(), "5/B");
        let key = InterestKey::from_announcement("7/Temperature\n").unwrap();
        assert_eq!(key.to_string(), "7/T");
        assert!(InterestKey::from_announcement("7/Humidity").is_err());
        assert!(InterestKey::from_announcement("7/Temperature/1").is_err());
    }

    #[test]
    fn test_control_token_encoding() {
        let key = InterestKey::new("7", Metric::Temperature);
        assert_eq!(ControlToken::Start(key.clone()).encode(), "7/T/1\n");
        assert_eq!(ControlToken::Stop(key).encode(), "7/T/0\n");
        assert_eq!(ControlToken::Mode(SendMode::Periodic).encode(), "P");
        assert_eq!(ControlToken::Mode(SendMode::OnChange).to_string(), "O");
    }

    #[test]
    fn test_send_mode_is_case_sensitive() {
        assert_eq!(SendMode::from_input("P"), Some(SendMode::Periodic));
        assert_eq!(SendMode::from_input("O"), Some(SendMode::OnChange));
        assert_eq!(SendMode::from_input("p"), None);
        assert_eq!(SendMode::from_input("PO"), None);
        assert_eq!(SendMode::from_input(""), None);
    }
}
