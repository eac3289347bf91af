pub mod config;
pub mod controller;
pub mod forwarder;
pub mod mqtt;

use crate::config::Config;
use crate::forwarder::{Forwarder, ForwarderSettings};
use color_eyre::{eyre::eyre, Result};
use mqtt::mqtt_handler::MqttHandler;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let config = setup()?;

    let cancel = CancellationToken::new();
    // Separate from `cancel` so the event loop outlives the forwarder and can
    // flush the DISCONNECT
    let mqtt_cancel = CancellationToken::new();

    // MQTT event loop runs on its own task, the controller stays on this one
    let (mqtt_handle, mqtt_task) = MqttHandler::spawn(&config.mqtt, mqtt_cancel.clone());
    info!("Publishing controller state on topic {}", mqtt_handle.topic());

    let source = controller::native_source(&config.controller);
    let forwarder = Forwarder::create(
        Box::new(source),
        Box::new(mqtt_handle.clone()),
        ForwarderSettings::from(&config.forwarder),
    );

    let mut forwarder = match forwarder.initialize() {
        Ok(forwarder) => forwarder,
        Err(e) => {
            mqtt_handle.shutdown(mqtt_task).await;
            return Err(eyre!("Failed to start forwarder: {}", e));
        }
    };

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, stopping"),
            Err(e) => error!("Unable to listen for shutdown signal: {}", e),
        }
        shutdown.cancel();
    });

    forwarder.run(cancel.clone()).await;

    let stats = forwarder.stats();
    info!(
        "Forwarded {} documents ({} failed, {} idle ticks)",
        stats.published, stats.failed, stats.idle
    );
    info!(
        "MQTT connection state at shutdown: {:?}",
        mqtt_handle.connection_state()
    );

    mqtt_handle.shutdown(mqtt_task).await;

    Ok(())
}

fn setup() -> Result<Config> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    let path = Config::default_path();
    let config = Config::load_from(&path)?;
    setup_logging_env(config.logging.level()?);
    info!("Configuration source: {}", path.display());

    Ok(config)
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
