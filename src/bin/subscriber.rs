use clap::Parser;
use color_eyre::Result;
use sensor_gateway::config::DEFAULT_INTROSPECTION_TOPIC;
use sensor_gateway::error::SubscriberError;
use sensor_gateway::logging;
use sensor_gateway::mqtt::config::MqttConfig;
use sensor_gateway::subscriber::{self, SubscriberSpec};
use std::time::Duration;
use tracing::error;

/// Prints sensor readings and announces interest in them to the gateway
#[derive(Debug, Parser)]
#[command(name = "subscriber", version, about, long_about = None)]
struct Cli {
    /// Subscriber name, also used as MQTT client id
    name: String,

    /// Topics of the form nodeId/Temperature or nodeId/Battery
    topics: Vec<String>,

    /// Broker address as host[:port]
    #[arg(long, default_value = "localhost:1883")]
    broker: String,

    /// Topic the gateway listens on for announcements
    #[arg(long, default_value = DEFAULT_INTROSPECTION_TOPIC)]
    introspection_topic: String,

    /// Seconds between two announcements
    #[arg(long, default_value_t = subscriber::DEFAULT_ANNOUNCE_INTERVAL.as_secs())]
    announce_interval: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::setup()?;
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Subscriber stopped: {}", e);
            eprintln!("{}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), SubscriberError> {
    let spec = SubscriberSpec::parse(&cli.name, &cli.topics)?;

    let mut broker = MqttConfig::default();
    broker.set_server(&cli.broker)?;
    let interval = Duration::from_secs(cli.announce_interval.max(1));

    subscriber::run(spec, broker, &cli.introspection_topic, interval).await
}
