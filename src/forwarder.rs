//! Driver loop with statum state machine
//!
//! Owns one controller source and one publisher. Every tick pumps platform
//! events, refreshes the source and publishes the resulting document.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──(source ready)──► Forwarding ──(cancelled)──► done
//! ```
//!
//! The source is never moved to another task: the HID backend is bound to the
//! run loop of the thread that initialized it.

use std::time::{Duration, Instant};

use statum::{machine, state};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ForwarderConfig;
use crate::controller::source::{ControllerSource, SourceError};
use crate::mqtt::mqtt_handler::StatePublisher;

#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("Failed to initialize controller: {0}")]
    Source(#[from] SourceError),
}

#[derive(Clone, Debug)]
pub struct ForwarderSettings {
    pub poll_interval: Duration,
    pub pump_timeout: Duration,
    pub stats_interval: Duration,
}

impl Default for ForwarderSettings {
    fn default() -> Self {
        Self::from(&ForwarderConfig::default())
    }
}

impl From<&ForwarderConfig> for ForwarderSettings {
    fn from(config: &ForwarderConfig) -> Self {
        Self {
            poll_interval: Duration::from_millis(config.poll_interval_ms.max(1)),
            pump_timeout: Duration::from_millis(config.pump_timeout_ms),
            stats_interval: Duration::from_secs(config.stats_interval_secs.max(1)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickStats {
    pub published: u64,
    pub failed: u64,
    pub idle: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Published,
    // Nothing to publish this tick
    Idle,
    PublishFailed,
}

#[state]
#[derive(Debug, Clone)]
pub enum ForwarderState {
    Initializing,
    Forwarding,
}

#[machine]
pub struct Forwarder<S: ForwarderState> {
    source: Box<dyn ControllerSource>,
    publisher: Box<dyn StatePublisher>,
    settings: ForwarderSettings,
    stats: TickStats,
    was_connected: bool,
    publish_failing: bool,
}

impl<S: ForwarderState> Forwarder<S> {
    pub fn stats(&self) -> TickStats {
        self.stats
    }
}

impl Forwarder<Initializing> {
    pub fn create(
        source: Box<dyn ControllerSource>,
        publisher: Box<dyn StatePublisher>,
        settings: ForwarderSettings,
    ) -> Self {
        debug!("Creating forwarder with settings: {:?}", settings);
        Self::new(
            source,
            publisher,
            settings,
            TickStats::default(),
            false, // was_connected
            false, // publish_failing
        )
    }

    pub fn initialize(mut self) -> Result<Forwarder<Forwarding>, ForwarderError> {
        info!("Initializing {} controller source", self.source.backend());
        if let Err(e) = self.source.initialize() {
            error!("Failed to initialize controller: {}", e);
            return Err(e.into());
        }
        self.was_connected = self.source.is_connected();
        info!(
            "Controller source ready (connected: {}), transitioning to Forwarding state",
            self.was_connected
        );
        Ok(self.transition())
    }
}

impl Forwarder<Forwarding> {
    /// Runs one pump/update/publish cycle.
    pub fn tick(&mut self) -> TickOutcome {
        self.source.pump_events(self.settings.pump_timeout);
        let updated = self.source.update();
        self.track_connection();

        if !updated {
            debug!("Controller not connected. Waiting...");
            self.stats.idle += 1;
            return TickOutcome::Idle;
        }

        let document = self.source.state().to_document();
        let payload = match serde_json::to_vec(&document) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to serialize controller state: {}", e);
                self.stats.failed += 1;
                return TickOutcome::PublishFailed;
            }
        };

        trace!("{}", String::from_utf8_lossy(&payload));

        match self.publisher.publish(payload) {
            Ok(()) => {
                if self.publish_failing {
                    info!("Publishing resumed");
                    self.publish_failing = false;
                }
                self.stats.published += 1;
                TickOutcome::Published
            }
            Err(e) => {
                if !self.publish_failing {
                    warn!("Failed to publish controller state: {}", e);
                    self.publish_failing = true;
                } else {
                    debug!("Failed to publish controller state: {}", e);
                }
                self.stats.failed += 1;
                TickOutcome::PublishFailed
            }
        }
    }

    /// Ticks at the configured interval until `cancel` fires.
    pub async fn run(&mut self, cancel: CancellationToken) {
        info!(
            "Forwarding controller state every {}ms",
            self.settings.poll_interval.as_millis()
        );

        let mut ticker = tokio::time::interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut window = TickStats::default();
        let mut last_log_time = Instant::now();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.tick();

            // Log throughput periodically
            if last_log_time.elapsed() >= self.settings.stats_interval {
                info!(
                    "Forwarder stats: published {} documents, {} failed, {} idle ticks in last {} seconds",
                    self.stats.published - window.published,
                    self.stats.failed - window.failed,
                    self.stats.idle - window.idle,
                    self.settings.stats_interval.as_secs()
                );
                window = self.stats;
                last_log_time = Instant::now();
            }
        }

        info!("Shutting down...");
    }

    fn track_connection(&mut self) {
        let connected = self.source.is_connected();
        if connected != self.was_connected {
            if connected {
                info!("Controller connected");
            } else {
                warn!("Controller disconnected");
            }
            self.was_connected = connected;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::source::BackendKind;
    use crate::controller::state::ControllerState;
    use crate::mqtt::mqtt_handler::PublishError;
    use rumqttc::ClientError;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::io;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    // Plays back connected/disconnected ticks
    struct ScriptedSource {
        init_fails: bool,
        ticks: VecDeque<bool>,
        pumps: Rc<RefCell<usize>>,
        state: ControllerState,
    }

    impl ScriptedSource {
        fn new(ticks: impl IntoIterator<Item = bool>) -> Self {
            Self {
                init_fails: false,
                ticks: ticks.into_iter().collect(),
                pumps: Rc::default(),
                state: ControllerState::default(),
            }
        }
    }

    impl ControllerSource for ScriptedSource {
        fn initialize(&mut self) -> Result<(), SourceError> {
            if self.init_fails {
                return Err(SourceError::NoDevice {
                    candidates: vec![PathBuf::from("/dev/input/js3")],
                });
            }
            Ok(())
        }

        fn update(&mut self) -> bool {
            let connected = self.ticks.pop_front().unwrap_or(true);
            if connected {
                self.state.connected = true;
                self.state.button_a = true;
            } else {
                self.state.reset();
            }
            connected
        }

        fn state(&self) -> &ControllerState {
            &self.state
        }

        fn pump_events(&mut self, _timeout: Duration) {
            *self.pumps.borrow_mut() += 1;
        }

        fn backend(&self) -> BackendKind {
            BackendKind::Joystick
        }
    }

    #[derive(Default, Clone)]
    struct RecordingPublisher {
        payloads: Rc<RefCell<Vec<Vec<u8>>>>,
        failing: Rc<RefCell<bool>>,
    }

    impl StatePublisher for RecordingPublisher {
        fn publish(&mut self, payload: Vec<u8>) -> Result<(), PublishError> {
            if *self.failing.borrow() {
                return Err(PublishError::Client(ClientError::TryRequest(
                    rumqttc::Request::Disconnect(rumqttc::Disconnect),
                )));
            }
            self.payloads.borrow_mut().push(payload);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl io::Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("log buffer").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLog {
        type Writer = CapturedLog;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn forwarding(
        source: ScriptedSource,
        publisher: RecordingPublisher,
    ) -> Forwarder<Forwarding> {
        Forwarder::create(
            Box::new(source),
            Box::new(publisher),
            ForwarderSettings {
                poll_interval: Duration::from_millis(1),
                pump_timeout: Duration::from_millis(0),
                stats_interval: Duration::from_secs(10),
            },
        )
        .initialize()
        .expect("scripted source initializes")
    }

    #[test]
    fn initialization_failure_is_reported() {
        let mut source = ScriptedSource::new([]);
        source.init_fails = true;
        let result = Forwarder::create(
            Box::new(source),
            Box::new(RecordingPublisher::default()),
            ForwarderSettings::default(),
        )
        .initialize();

        assert!(matches!(
            result,
            Err(ForwarderError::Source(SourceError::NoDevice { .. }))
        ));
    }

    #[test]
    fn publishes_one_document_per_connected_tick() {
        let publisher = RecordingPublisher::default();
        let source = ScriptedSource::new([true, false, true]);
        let pumps = source.pumps.clone();
        let mut forwarder = forwarding(source, publisher.clone());

        assert_eq!(forwarder.tick(), TickOutcome::Published);
        assert_eq!(forwarder.tick(), TickOutcome::Idle);
        assert_eq!(forwarder.tick(), TickOutcome::Published);

        assert_eq!(*pumps.borrow(), 3);
        assert_eq!(publisher.payloads.borrow().len(), 2);
        assert_eq!(
            forwarder.stats(),
            TickStats {
                published: 2,
                failed: 0,
                idle: 1
            }
        );

        let document: serde_json::Value =
            serde_json::from_slice(&publisher.payloads.borrow()[0]).expect("json payload");
        assert_eq!(document["connected"], true);
        assert_eq!(document["buttons"]["A"], true);
        assert!(document["timestamp"].as_u64().is_some());
    }

    #[test]
    fn publish_errors_are_counted_and_not_fatal() {
        let publisher = RecordingPublisher::default();
        let mut forwarder = forwarding(ScriptedSource::new([]), publisher.clone());

        *publisher.failing.borrow_mut() = true;
        assert_eq!(forwarder.tick(), TickOutcome::PublishFailed);
        assert_eq!(forwarder.tick(), TickOutcome::PublishFailed);

        *publisher.failing.borrow_mut() = false;
        assert_eq!(forwarder.tick(), TickOutcome::Published);
        assert_eq!(forwarder.stats().failed, 2);
        assert_eq!(forwarder.stats().published, 1);
    }

    #[test]
    fn settings_clamp_zero_intervals() {
        let settings = ForwarderSettings::from(&ForwarderConfig {
            poll_interval_ms: 0,
            pump_timeout_ms: 0,
            stats_interval_secs: 0,
        });
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
        assert_eq!(settings.pump_timeout, Duration::ZERO);
        assert_eq!(settings.stats_interval, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let publisher = RecordingPublisher::default();
        let mut forwarder = forwarding(ScriptedSource::new([]), publisher.clone());
        let cancel = CancellationToken::new();

        let canceller = {
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                cancel.cancel();
            }
        };
        tokio::join!(forwarder.run(cancel.clone()), canceller);

        assert!(cancel.is_cancelled());
        assert!(!publisher.payloads.borrow().is_empty());
    }

    #[tokio::test]
    async fn run_with_cancelled_token_never_ticks() {
        let publisher = RecordingPublisher::default();
        let mut forwarder = forwarding(ScriptedSource::new([]), publisher.clone());
        let cancel = CancellationToken::new();
        cancel.cancel();

        forwarder.run(cancel).await;
        assert_eq!(forwarder.stats(), TickStats::default());
    }

    #[test]
    fn published_documents_are_traced() {
        let log = CapturedLog::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(log.clone())
            .finish();

        let publisher = RecordingPublisher::default();
        let mut forwarder = forwarding(ScriptedSource::new([true]), publisher.clone());
        tracing::subscriber::with_default(subscriber, || {
            assert_eq!(forwarder.tick(), TickOutcome::Published);
        });

        let output = String::from_utf8(log.0.lock().expect("log buffer").clone()).expect("utf8");
        let payload = String::from_utf8(publisher.payloads.borrow()[0].clone()).expect("utf8");
        assert!(output.contains("TRACE"));
        assert!(output.contains(&payload));
    }
}
