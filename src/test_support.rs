//! Test doubles shared by unit tests

use crate::error::GatewayError;
use crate::mqtt::mqtt_handler::BusPublisher;
use std::sync::{Arc, Mutex};

/// Publisher that records every publish
#[derive(Clone, Default)]
pub(crate) struct RecordingBus {
    published: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingBus {
    pub(crate) fn take(&self) -> Vec<(String, String)> {
        std::mem::take(&mut *self.published.lock().unwrap())
    }
}

impl BusPublisher for RecordingBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), GatewayError> {
        self.published.lock().unwrap().push((
            topic.to_string(),
            String::from_utf8(payload).unwrap(),
        ));
        Ok(())
    }
}
