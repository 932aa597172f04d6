use clap::Parser;
use color_eyre::Result;
use sensor_gateway::config::Config;
use sensor_gateway::error::GatewayError;
use sensor_gateway::gateway::Gateway;
use sensor_gateway::logging;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Relays sensor readings from a serial port to MQTT and pushes subscriber interest back
#[derive(Debug, Parser)]
#[command(name = "gateway", version, about, long_about = None)]
struct Cli {
    /// Serial port of the root node (e.g. /dev/ttyUSB0 or COM3)
    port: String,

    /// Configuration file, defaults to <config dir>/sensor-gateway/gateway.toml
    #[arg(long)]
    config: Option<PathBuf>,

    /// Broker address as host[:port], overrides the configuration file
    #[arg(long)]
    broker: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::setup()?;
    let cli = Cli::parse();

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            error!("Gateway stopped: {}", e);
            eprintln!("{}", e);
            e.exit_code()
        }
    };
    // stdin reads cannot be cancelled, exiting here avoids waiting on them
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), GatewayError> {
    let mut config = Config::load(cli.config.as_deref()).await?;
    if let Some(broker) = &cli.broker {
        config.broker.set_server(broker)?;
    }
    debug!("Effective configuration: {:?}", config);

    info!("Starting gateway on {}", cli.port);
    let gateway = Gateway::create(cli.port, config).start().await?;
    gateway.run().await
}
