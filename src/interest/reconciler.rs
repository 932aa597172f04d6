use super::registry::{InterestSnapshot, TopicRegistry};
use crate::error::GatewayError;
use crate::protocol::{ControlToken, InterestKey};
use crate::serial::SerialSink;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Topics whose interest changed between two generations
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InterestDelta {
    /// In the previous generation, absent from the current one
    pub to_stop: Vec<InterestKey>,
    /// Newly observed in the current generation
    pub to_start: Vec<InterestKey>,
}

impl InterestDelta {
    pub fn is_empty(&self) -> bool {
        self.to_stop.is_empty() && self.to_start.is_empty()
    }

    /// Control tokens in write order: stops first, then starts
    pub fn tokens(&self) -> impl Iterator<Item = ControlToken> + '_ {
        self.to_stop
            .iter()
            .cloned()
            .map(ControlToken::Stop)
            .chain(self.to_start.iter().cloned().map(ControlToken::Start))
    }
}

/// Symmetric difference of two generations, in insertion order of each side
pub fn diff(previous: &InterestSnapshot, current: &InterestSnapshot) -> InterestDelta {
    InterestDelta {
        to_stop: previous
            .keys()
            .filter(|key| !current.contains(key))
            .cloned()
            .collect(),
        to_start: current
            .keys()
            .filter(|key| !previous.contains(key))
            .cloned()
            .collect(),
    }
}

/// Periodically turns registry generations into start/stop commands
///
/// Owns the previous generation. Every interval the registry is snapshotted
/// and cleared, the delta to the previous generation is written to the serial
/// sink, and the snapshot becomes the new previous generation.
pub struct InterestReconciler {
    registry: TopicRegistry,
    sink: SerialSink,
    interval: Duration,
    previous: InterestSnapshot,
}

impl InterestReconciler {
    pub fn new(registry: TopicRegistry, sink: SerialSink, interval: Duration) -> Self {
        Self {
            registry,
            sink,
            interval,
            previous: InterestSnapshot::default(),
        }
    }

    pub fn previous(&self) -> &InterestSnapshot {
        &self.previous
    }

    /// One reconciliation step without the sleep
    pub async fn run_cycle(&mut self) -> Result<InterestDelta, GatewayError> {
        let current = self.registry.snapshot_and_clear().await;
        let delta = diff(&self.previous, &current);

        for token in delta.tokens() {
            self.sink.send(&token).await?;
        }

        if delta.is_empty() {
            debug!("Interest unchanged ({} topics)", current.len());
        } else {
            info!(
                "Interest changed: {} stopped, {} started, {} active",
                delta.to_stop.len(),
                delta.to_start.len(),
                current.len()
            );
        }

        self.previous = current;
        Ok(delta)
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), GatewayError> {
        info!("Interest reconciliation every {:?}", self.interval);
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Interest reconciliation stopped");
                    return Ok(());
                }
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(e) = self.run_cycle().await {
                error!("Failed to push interest changes: {}", e);
                return Err(e);
            }
        }
    }
}
