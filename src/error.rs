//! Error definitions for the gateway and subscriber processes

use thiserror::Error;

/// Process exit status for configuration problems (bad arguments, bad config file)
pub const EXIT_CONFIG: i32 = 2;
/// Process exit status when the serial source reached end-of-stream
pub const EXIT_SERIAL_CLOSED: i32 = 3;
/// Process exit status for every other fatal I/O or transport failure
pub const EXIT_FATAL: i32 = 1;

/// Errors that end a gateway loop
///
/// Every variant is fatal for the process. Recoverable conditions (malformed
/// serial lines, invalid operator input, undecodable announcements) never
/// leave the loop they occur in and therefore have no variant here.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Invalid configuration file or command line
    #[error("Configuration error: {0}")]
    Config(String),

    /// Broker unreachable at startup
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publishing to the bus failed
    #[error("Failed to publish to {topic}: {reason}")]
    Publish { topic: String, reason: String },

    /// Registering a subscription failed
    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// The serialdump helper could not be started
    #[error("Failed to start serial process '{command}': {source}")]
    SerialSpawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The serial source reached end-of-stream
    #[error("Serial process terminated")]
    SerialClosed,

    #[error("Failed to read from serial process: {0}")]
    SerialRead(#[source] std::io::Error),

    #[error("Failed to write to serial process: {0}")]
    SerialWrite(#[source] std::io::Error),

    #[error("Failed to read operator input: {0}")]
    OperatorInput(#[source] std::io::Error),

    /// Connection to the broker was lost and not recovered
    #[error("Lost connection to broker: {0}")]
    ConnectionLost(String),

    /// A gateway task panicked or was aborted
    #[error("Task error: {0}")]
    Task(String),
}

impl GatewayError {
    /// Distinct process exit status for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            GatewayError::Config(_) => EXIT_CONFIG,
            GatewayError::SerialClosed => EXIT_SERIAL_CLOSED,
            _ => EXIT_FATAL,
        }
    }
}

/// Errors decoding serial lines, topics and announcements
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Expected 'nodeId/metricCode/value', got '{0}'")]
    MissingField(String),

    #[error("Unknown metric code '{0}'")]
    UnknownMetricCode(String),

    #[error("Unknown metric name '{0}'")]
    UnknownMetricName(String),

    #[error("Empty node id in '{0}'")]
    EmptyNodeId(String),

    #[error("Node id '{0}' contains a topic wildcard or NUL")]
    InvalidNodeId(String),

    #[error("Expected 'nodeId/MetricName', got '{0}'")]
    InvalidTopic(String),
}

/// Errors raised by the subscriber process
#[derive(Debug, Error)]
pub enum SubscriberError {
    #[error("Invalid subscriber name '{0}': it must not be empty or start with a space")]
    InvalidName(String),

    #[error("A subscriber needs at least one topic. Expected input form: \"SubscriberName\" \"nodeID/Topic1\" \"nodeID/Topic2\"")]
    MissingTopics,

    #[error("Unknown topic '{0}'. Available topics: Battery and Temperature")]
    UnknownTopic(String),

    #[error("You subscribed more than once to the same topic: {0}")]
    DuplicateTopic(String),

    #[error(transparent)]
    Bus(#[from] GatewayError),
}

impl SubscriberError {
    pub fn exit_code(&self) -> i32 {
        match self {
            SubscriberError::Bus(e) => e.exit_code(),
            _ => EXIT_CONFIG,
        }
    }
}
