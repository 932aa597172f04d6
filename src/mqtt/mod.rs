//! # MQTT Integration Module
//!
//! Bus side of the gateway and of the subscriber process, built on `rumqttc`.
//!
//! ## Module Architecture
//!
//! ```text
//! mqtt/
//! ├── config.rs           - Broker address, client id, reconnect policy
//! ├── message_manager.rs  - Received message representation
//! └── mqtt_handler.rs     - Event loop driver, publish handle, handler seam
//! ```
//!
//! ## Threading
//!
//! `rumqttc` splits a connection into a cloneable `AsyncClient` and an
//! `EventLoop` that has to be polled for anything to happen. The event loop is
//! owned by [`mqtt_handler::MqttHandler`] and driven by one task, the dispatch
//! loop. Publishing goes through [`mqtt_handler::BusHandle`] clones from any
//! other task. Inbound publishes are handed to a
//! [`mqtt_handler::MessageHandler`] on the dispatch loop, which plays the role
//! of the transport's delivery thread.
//!
//! ## Connection Loss
//!
//! The dispatch loop fails fast by default. With `reconnect_attempts > 0` it
//! retries with exponential backoff and resubscribes on every `ConnAck`.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
