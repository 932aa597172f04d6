use crate::error::GatewayError;
use crate::mqtt::mqtt_handler::BusPublisher;
use crate::protocol::{BusTopic, SensorReading};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Counters reported when the relay stops
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub relayed: usize,
    pub malformed: usize,
}

/// Serial to bus relay
///
/// Each `nodeId/metricCode/value` line becomes a publish of `value` on
/// `nodeId/MetricName`. Malformed lines are logged and skipped. With an echo
/// topic set, the bus topic is re-announced there after every publish.
pub struct MessageRelay<P> {
    publisher: P,
    echo_topic: Option<String>,
    stats: RelayStats,
}

impl<P: BusPublisher> MessageRelay<P> {
    pub fn new(publisher: P, echo_topic: Option<String>) -> Self {
        Self {
            publisher,
            echo_topic,
            stats: RelayStats::default(),
        }
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Relays one serial line
    ///
    /// Returns the topic published on, `None` for a skipped line. Only bus
    /// failures are errors.
    pub async fn relay_line(&mut self, line: &str) -> Result<Option<BusTopic>, GatewayError> {
        if line.trim().is_empty() {
            return Ok(None);
        }
        let reading = match SensorReading::parse(line) {
            Ok(reading) => reading,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Wrong message received: {} ({})", line.trim_end(), e);
                return Ok(None);
            }
        };

        let topic = reading.bus_topic();
        let topic_name = topic.to_string();
        self.publisher
            .publish(&topic_name, reading.value.into_bytes())
            .await?;
        debug!("Published to subscribers: {}", line.trim_end());

        if let Some(echo_topic) = &self.echo_topic {
            self.publisher
                .publish(echo_topic, topic_name.into_bytes())
                .await?;
        }

        self.stats.relayed += 1;
        Ok(Some(topic))
    }

    /// Reads the serial source until it ends, fails or `shutdown` fires
    ///
    /// End of the source is fatal: nothing can be relayed any more.
    pub async fn run<R>(
        mut self,
        source: R,
        shutdown: CancellationToken,
    ) -> Result<RelayStats, GatewayError>
    where
        R: AsyncBufRead + Unpin,
    {
        info!("Relay started");
        let mut source = source;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(
                        "Relay stopped after {} readings ({} malformed)",
                        self.stats.relayed, self.stats.malformed
                    );
                    return Ok(self.stats);
                }
                read = source.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    error!("Serialdump process terminated");
                    return Err(GatewayError::SerialClosed);
                }
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    self.relay_line(&line).await?;
                }
                Err(e) => {
                    error!("Failed to read serial line: {}", e);
                    return Err(GatewayError::SerialRead(e));
                }
            }
        }
    }
}
