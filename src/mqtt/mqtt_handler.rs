use std::time::Duration;

use rumqttc::{AsyncClient, ClientError, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::MqttConfig;

// Bound on publishes queued while the event loop catches up
const REQUEST_CAPACITY: usize = 100;
// Longest wait for the event loop to write the DISCONNECT packet
const DISCONNECT_FLUSH_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("MQTT client rejected publish: {0}")]
    Client(#[from] ClientError),
}

/// Sink for serialized controller documents.
pub trait StatePublisher {
    /// Queues one payload without blocking.
    fn publish(&mut self, payload: Vec<u8>) -> Result<(), PublishError>;
}

#[derive(Clone)]
pub struct MqttHandler {
    client: AsyncClient,
    topic: String,
    qos: QoS,
    status: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
}

impl MqttHandler {
    pub fn options(config: &MqttConfig) -> MqttOptions {
        let mut mqtt_options = MqttOptions::new(&config.client_id, &config.host, config.port);
        mqtt_options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1)));
        if let Some(user) = &config.user {
            mqtt_options.set_credentials(user, config.password.clone().unwrap_or_default());
        }
        mqtt_options
    }

    /// Creates the client and spawns the task that drives its event loop until
    /// `cancel` fires.
    pub fn spawn(config: &MqttConfig, cancel: CancellationToken) -> (Self, JoinHandle<()>) {
        info!(
            "Connecting to MQTT broker at {}:{} as {}",
            config.host, config.port, config.client_id
        );
        let (client, event_loop) = AsyncClient::new(Self::options(config), REQUEST_CAPACITY);
        let (status_tx, status_rx) = watch::channel(ConnectionState::Connecting);
        let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);

        let task = tokio::spawn(drive_event_loop(
            event_loop,
            status_tx,
            cancel.clone(),
            reconnect_delay,
        ));

        (
            Self::from_client(
                client,
                config.topic.clone(),
                config.qos.into(),
                status_rx,
                cancel,
            ),
            task,
        )
    }

    pub fn from_client(
        client: AsyncClient,
        topic: String,
        qos: QoS,
        status: watch::Receiver<ConnectionState>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            topic,
            qos,
            status,
            cancel,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Queues a DISCONNECT and waits for the event loop to write it before the
    /// task exits. Falls back to cancelling the task after a short timeout.
    pub async fn shutdown(&self, mut task: JoinHandle<()>) {
        match self.client.try_disconnect() {
            Ok(()) => debug!("MQTT disconnect queued"),
            Err(e) => warn!("Failed to queue MQTT disconnect: {}", e),
        }

        match tokio::time::timeout(DISCONNECT_FLUSH_TIMEOUT, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("MQTT task ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    "MQTT disconnect not flushed within {}ms, stopping event loop",
                    DISCONNECT_FLUSH_TIMEOUT.as_millis()
                );
                self.cancel.cancel();
                if let Err(e) = task.await {
                    warn!("MQTT task ended abnormally: {}", e);
                }
            }
        }
    }
}

impl StatePublisher for MqttHandler {
    fn publish(&mut self, payload: Vec<u8>) -> Result<(), PublishError> {
        self.client
            .try_publish(self.topic.as_str(), self.qos, false, payload)?;
        Ok(())
    }
}

async fn drive_event_loop(
    mut event_loop: EventLoop,
    status: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    reconnect_delay: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            polled = event_loop.poll() => match polled {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    info!("Connected to MQTT broker ({:?})", ack.code);
                    status.send_replace(ConnectionState::Connected);
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("MQTT broker closed the session");
                    status.send_replace(ConnectionState::Disconnected);
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("Disconnected from MQTT broker");
                    break;
                }
                Ok(event) => debug!("MQTT event: {:?}", event),
                Err(e) => {
                    if *status.borrow() != ConnectionState::Reconnecting {
                        warn!("MQTT connection error: {}", e);
                    }
                    status.send_replace(ConnectionState::Reconnecting);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(reconnect_delay) => {}
                    }
                }
            },
        }
    }

    status.send_replace(ConnectionState::Disconnected);
    debug!("MQTT event loop stopped");
}
