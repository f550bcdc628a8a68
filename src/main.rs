use anyhow::{Context, Result};
use clap::Parser;
use mavbridge::channel::MqttChannel;
use mavbridge::mavlink::{FcConnectionType, MavlinkConnector};
use mavbridge::vehicle::{LinkConnector, ScriptedConnector, VehicleSession};
use mavbridge::{Bridge, BridgeConfig, BridgeExit};
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// MAVLink command and liveness bridge
///
/// Subscribes to `<prefix>/<device_id>/cmd`, drives the flight controller, and
/// publishes heartbeats, position and command results on
/// `<prefix>/<device_id>/state`.
#[derive(Parser, Debug)]
#[command(name = "mavbridge", version)]
#[command(about = "MAVLink command and liveness bridge over MQTT", long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long, env = "MAVBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Vehicle id used in topic names
    #[arg(long, env = "MAVBRIDGE_DEVICE_ID")]
    device_id: Option<String>,

    /// MQTT broker host
    #[arg(long, env = "MAVBRIDGE_BROKER_HOST")]
    broker_host: Option<String>,

    /// MQTT broker port
    #[arg(long, env = "MAVBRIDGE_BROKER_PORT")]
    broker_port: Option<u16>,

    /// Flight controller connection
    ///
    /// Format: serial:<port>:<baud>, udpin:<addr>, udpout:<addr>,
    /// tcpin:<addr>, tcpout:<addr>, or sim for the bench vehicle
    #[arg(long, env = "MAVBRIDGE_FC")]
    fc: Option<String>,

    /// Log as JSON lines
    #[arg(long, env = "MAVBRIDGE_LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn load_config(&self) -> Result<BridgeConfig> {
        let mut config = match &self.config {
            Some(path) => BridgeConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => BridgeConfig::default(),
        };

        if let Some(device_id) = &self.device_id {
            config.device_id = device_id.clone();
        }
        if let Some(host) = &self.broker_host {
            config.channel.host = host.clone();
        }
        if let Some(port) = self.broker_port {
            config.channel.port = port;
        }
        if let Some(fc) = &self.fc {
            config.vehicle.connection = fc.clone();
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (plain, json) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}

async fn run(cli: Cli) -> Result<BridgeExit> {
    let config = cli.load_config()?;
    info!("Bridge starting: device {}", config.device_id);

    let fc = config.fc_config()?;
    info!("  Flight controller: {}", fc.connection);
    let connector: Arc<dyn LinkConnector> = match fc.connection {
        FcConnectionType::Sim => Arc::new(ScriptedConnector::bench()),
        _ => Arc::new(MavlinkConnector::new(fc)),
    };
    let session = Arc::new(VehicleSession::new(connector, config.session_settings()?));

    let connection = MqttChannel::connect(&config.mqtt_settings())
        .await
        .context("channel connect failed")?;

    let bridge = Bridge::start(
        connection,
        session,
        config.topics(),
        &config.device_id,
        config.liveness_settings(),
        config.shutdown_grace(),
    )
    .await?;

    Ok(bridge.run().await)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let code = match run(cli).await {
        Ok(exit) => exit.exit_code(),
        Err(e) => {
            error!("{:#}", e);
            1
        }
    };

    std::process::exit(code);
}
