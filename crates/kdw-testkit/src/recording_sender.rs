//! `NotificationSender` that records every attempt instead of sending.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use kdw_reconcile::{DeliveryError, NotificationSender, OutboundMessage};

#[derive(Default)]
struct Record {
    attempts: usize,
    delivered: Vec<OutboundMessage>,
    fail_with: Option<DeliveryError>,
    delay: Option<Duration>,
}

#[derive(Default)]
pub struct RecordingSender {
    record: Mutex<Record>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Record> {
        self.record.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Subsequent sends fail with `err`; `None` restores success.
    pub fn fail_with(&self, err: Option<DeliveryError>) {
        self.lock().fail_with = err;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.lock().delay = Some(delay);
    }

    pub fn delivered(&self) -> Vec<OutboundMessage> {
        self.lock().delivered.clone()
    }

    /// Includes failed sends.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }
}

#[async_trait]
impl NotificationSender for RecordingSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let delay = {
            let mut g = self.lock();
            g.attempts += 1;
            g.delay
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }

        let mut g = self.lock();
        if let Some(err) = g.fail_with.clone() {
            return Err(err);
        }
        g.delivered.push(message.clone());
        Ok(())
    }
}
