//! Bridge between a serial sensor network and an MQTT bus
//!
//! The gateway relays `nodeId/metricCode/value` lines from the serial link to
//! `nodeId/MetricName` topics and pushes start/stop commands back down the link
//! so nodes only report what some subscriber announced interest in.

pub mod config;
pub mod error;
pub mod gateway;
pub mod interest;
pub mod logging;
pub mod mqtt;
pub mod operator;
pub mod protocol;
pub mod relay;
pub mod serial;
pub mod subscriber;

#[cfg(test)]
mod test_support;
