//! Gateway lifecycle and supervision
//!
//! Runs the four units of the gateway and ends them together:
//!
//! ```text
//! serial source ──► relay ──publish──► broker ──► dispatch ──► tracker ──► registry
//!                                                                             │
//! operator stdin ──► console ──┐                               reconciler ◄───┘
//!                              ▼                                   │
//!                         serial sink ◄────── start/stop ──────────┘
//! ```
//!
//! The first unit to fail cancels the shared [`CancellationToken`]; every
//! other unit observes it at its blocking point and returns. The dispatch loop
//! disconnects from the broker on its way out and the supervisor stops the
//! serial process once all units are done.

use crate::config::Config;
use crate::error::GatewayError;
use crate::interest::tracker::{echo_topic, subscription_pattern};
use crate::interest::{InterestReconciler, InterestTracker, TopicRegistry};
use crate::mqtt::mqtt_handler::MqttHandler;
use crate::operator::OperatorConsole;
use crate::relay::MessageRelay;
use crate::serial::{self, SerialLink};
use statum::{machine, state};
use std::fmt;
use tokio::io::BufReader;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// The concurrently running parts of a gateway or subscriber process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Relay,
    Dispatch,
    Reconciler,
    Operator,
    Announcer,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Unit::Relay => "serial relay",
            Unit::Dispatch => "bus dispatch",
            Unit::Reconciler => "interest reconciliation",
            Unit::Operator => "operator console",
            Unit::Announcer => "subscriber announcements",
        };
        f.write_str(name)
    }
}

pub type UnitResult = (Unit, Result<(), GatewayError>);

#[state]
#[derive(Debug, Clone)]
pub enum GatewayState {
    Starting,
    Running,
}

#[machine]
pub struct Gateway<S: GatewayState> {
    port: String,
    config: Config,
    registry: TopicRegistry,
    shutdown: CancellationToken,
    serial: Option<SerialLink>,
    bus: Option<MqttHandler>,
}

impl<S: GatewayState> Gateway<S> {
    /// Cancelling this token stops the gateway
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Gateway<Starting> {
    pub fn create(port: impl Into<String>, config: Config) -> Self {
        Self::new(
            port.into(),
            config,
            TopicRegistry::new(),
            CancellationToken::new(),
            None,
            None,
        )
    }

    /// Connects to the broker and attaches to the serial port
    ///
    /// Both failures are fatal at startup.
    pub async fn start(mut self) -> Result<Gateway<Running>, GatewayError> {
        let tracker_pattern = subscription_pattern(&self.config.interest.introspection_topic);

        let mut bus = MqttHandler::new(self.config.broker.clone());
        bus.add_subscription(tracker_pattern);
        bus.connect().await?;

        let link = serial::spawn(&self.port, &self.config.serial)?;
        info!("Gateway attached to serial port {}", self.port);

        self.bus = Some(bus);
        self.serial = Some(link);
        Ok(self.transition())
    }
}

impl Gateway<Running> {
    /// Runs until a unit fails or the shutdown token is cancelled
    pub async fn run(mut self) -> Result<(), GatewayError> {
        let missing = || GatewayError::Task("gateway was not started".to_string());
        let SerialLink {
            mut process,
            source,
            sink,
        } = self.serial.take().ok_or_else(missing)?;
        let bus = self.bus.take().ok_or_else(missing)?;

        let introspection_topic = self.config.interest.introspection_topic.clone();
        let echo = self
            .config
            .interest
            .echo_readings
            .then(|| echo_topic(&introspection_topic));
        let tracker = InterestTracker::new(self.registry.clone(), introspection_topic);
        let relay = MessageRelay::new(bus.handle(), echo);
        let reconciler = InterestReconciler::new(
            self.registry.clone(),
            sink.clone(),
            self.config.interest.diff_interval(),
        );
        let console = OperatorConsole::new(sink);

        let mut units: JoinSet<UnitResult> = JoinSet::new();
        let token = self.shutdown.clone();
        units.spawn(async move {
            let result = relay.run(source, token).await.map(|stats| {
                info!("Relayed {} readings, skipped {}", stats.relayed, stats.malformed);
            });
            (Unit::Relay, result)
        });
        let token = self.shutdown.clone();
        units.spawn(async move {
            let result = bus.run(tracker, token).await.map(|status| {
                debug!("Bus status at shutdown: {:?}", status);
            });
            (Unit::Dispatch, result)
        });
        let token = self.shutdown.clone();
        units.spawn(async move { (Unit::Reconciler, reconciler.run(token).await) });
        let token = self.shutdown.clone();
        units.spawn(async move {
            let stdin = BufReader::new(tokio::io::stdin());
            (Unit::Operator, console.run(stdin, token).await)
        });
        info!("Gateway running");

        let result = supervise(units, self.shutdown.clone()).await;
        process.terminate().await;
        result
    }
}

/// Waits for all units, cancelling everything on the first failure or Ctrl-C
///
/// Returns the first failure.
pub async fn supervise(
    mut units: JoinSet<UnitResult>,
    shutdown: CancellationToken,
) -> Result<(), GatewayError> {
    let mut first_error: Option<GatewayError> = None;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !shutdown.is_cancelled() => {
                match signal {
                    Ok(()) => info!("Interrupted, shutting down"),
                    Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
                }
                shutdown.cancel();
            }
            joined = units.join_next() => {
                let failure = match joined {
                    None => break,
                    Some(Ok((unit, Ok(())))) => {
                        debug!("{} finished", unit);
                        None
                    }
                    Some(Ok((unit, Err(e)))) => {
                        error!("{} failed: {}", unit, e);
                        Some(e)
                    }
                    Some(Err(e)) => {
                        error!("Gateway task aborted: {}", e);
                        Some(GatewayError::Task(e.to_string()))
                    }
                };
                if let Some(e) = failure {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    shutdown.cancel();
                }
            }
        }
    }

    info!("Gateway stopped");
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
