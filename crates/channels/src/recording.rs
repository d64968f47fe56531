//! In-memory transport that captures messages for tests and rehearsals.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use multimail_core::error::TransportError;
use parking_lot::Mutex;

use crate::email::{EmailTransport, OutgoingEmail};

/// Records every completed send attempt in order. Can be programmed to fail
/// for specific addresses and to take a fixed time per send.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<OutgoingEmail>>,
    failures: Mutex<HashMap<String, String>>,
    latency: Option<Duration>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send takes `latency` before it resolves.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sends to `address` fail with `reason` until cleared.
    pub fn fail_for(&self, address: impl Into<String>, reason: impl Into<String>) {
        self.failures.lock().insert(address.into(), reason.into());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    /// All completed attempts, successful or not, in call order.
    pub fn calls(&self) -> Vec<OutgoingEmail> {
        self.calls.lock().clone()
    }

    /// Addresses of all completed attempts, in call order.
    pub fn addresses(&self) -> Vec<String> {
        self.calls.lock().iter().map(|c| c.to.clone()).collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), TransportError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        self.calls.lock().push(email.clone());

        match self.failures.lock().get(&email.to) {
            Some(reason) => Err(TransportError::Rejected(reason.clone())),
            None => Ok(()),
        }
    }
}
