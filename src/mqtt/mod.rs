//! # MQTT Publishing
//!
//! Publishes every controller document on one topic of an MQTT broker.
//!
//! ```text
//! mqtt/
//! ├── config.rs        - Broker, topic and QoS settings
//! └── mqtt_handler.rs  - Client, event loop task and the StatePublisher seam
//! ```
//!
//! The client side is non-blocking: [`mqtt_handler::MqttHandler::publish`] only
//! queues the payload, while a spawned tokio task polls the `rumqttc` event loop,
//! tracks the [`mqtt_handler::ConnectionState`] and lets `rumqttc` reconnect
//! after errors. The event loop task never touches controller state.

pub mod config;
pub mod mqtt_handler;
