//! Order notification delivery.
//!
//! The orchestrator calls [`NotificationDispatch::dispatch`] synchronously
//! right after commit; everything past that point runs on a background task.
//! Delivery failures are retried with backoff and finally logged, never
//! surfaced to the buyer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::{debug, error, warn};

use checkout_core::DomainResult;
use checkout_engine::{NotificationDispatch, OrderNotification, RetryPolicy};

/// The actual delivery channel (email gateway, webhook, message bus).
#[async_trait]
pub trait NotificationDelivery: Send + Sync + 'static {
    async fn deliver(&self, notification: &OrderNotification) -> DomainResult<()>;
}

/// Dispatcher backed by a spawned worker task.
///
/// `dispatch` enqueues and returns immediately. The worker drains the queue,
/// retrying each delivery per the policy; a notification that still fails
/// after the last attempt is dropped with an error log.
pub struct SpawnedNotifier {
    tx: UnboundedSender<OrderNotification>,
}

impl SpawnedNotifier {
    /// Spawn the delivery worker on the current tokio runtime.
    pub fn spawn<D: NotificationDelivery>(delivery: Arc<D>, retry: RetryPolicy) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<OrderNotification>();
        tokio::spawn(async move {
            while let Some(notification) = rx.recv().await {
                deliver_with_retry(delivery.as_ref(), &notification, &retry).await;
            }
            debug!("notification worker stopped, channel closed");
        });
        Self { tx }
    }
}

async fn deliver_with_retry<D: NotificationDelivery>(
    delivery: &D,
    notification: &OrderNotification,
    retry: &RetryPolicy,
) {
    let mut attempt = 1u32;
    loop {
        match delivery.deliver(notification).await {
            Ok(()) => {
                debug!(
                    order_id = %notification.order_id,
                    order_number = %notification.order_number,
                    "order notification delivered"
                );
                return;
            }
            Err(e) if attempt < retry.max_attempts => {
                let backoff = retry.backoff_for(attempt);
                warn!(
                    attempt,
                    order_id = %notification.order_id,
                    error = %e,
                    "notification delivery failed, retrying"
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                // The order is already committed; dropping the notification
                // is the accepted worst case.
                error!(
                    order_id = %notification.order_id,
                    order_number = %notification.order_number,
                    error = %e,
                    "notification delivery exhausted retries, dropping"
                );
                return;
            }
        }
    }
}

impl NotificationDispatch for SpawnedNotifier {
    fn dispatch(&self, notification: OrderNotification) {
        // Fails only when the worker is gone, i.e. during shutdown.
        if let Err(e) = self.tx.send(notification) {
            warn!(order_id = %e.0.order_id, "notification dropped, worker not running");
        }
    }
}

/// Test dispatcher that records every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<OrderNotification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OrderNotification> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl NotificationDispatch for RecordingNotifier {
    fn dispatch(&self, notification: OrderNotification) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification);
        }
    }
}
