//! Subscriber interest tracking
//!
//! MQTT brokers do not tell a publisher who is subscribed. The gateway infers
//! interest from announcements on the introspection topic and keeps the sensor
//! network sending only what someone listens to.
//!
//! ```text
//! bus ──► tracker ──add──► registry ◄──snapshot_and_clear── reconciler ──► serial sink
//!         (dispatch loop)               (every diff interval)   start/stop tokens
//! ```
//!
//! 1. [`tracker`] - decodes announcements and tags their source
//! 2. [`registry`] - the current generation of interest keys
//! 3. [`reconciler`] - diffs generations and pushes commands upstream

pub mod reconciler;
pub mod registry;
pub mod tracker;

pub use reconciler::{diff, InterestDelta, InterestReconciler};
pub use registry::{InterestSnapshot, InterestSource, Observation, TopicRegistry};
pub use tracker::InterestTracker;
