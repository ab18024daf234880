//! Deferred notification queue.
//!
//! Handlers enqueue a pass key after a successful write and return at once.
//! A background worker drains the queue and runs one broadcast per task,
//! retrying with exponential backoff while the broadcast reaches nobody.
//!
//! The queue is bounded. When it is full the task is dropped and logged;
//! devices still pick the change up on their next poll.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use wallet_core::PassKey;

use crate::services::dispatcher::NotificationDispatcher;

/// Retry schedule for failed broadcasts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per task, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles on each further attempt.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt` (1-based). The first attempt is immediate.
    #[must_use]
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let exponent = (attempt - 2).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }
}

/// Handle used to enqueue notification tasks.
#[derive(Debug, Clone)]
pub struct NotificationOutbox {
    sender: mpsc::Sender<PassKey>,
}

impl NotificationOutbox {
    /// Start the worker and return a handle to its queue.
    ///
    /// The worker stops once every `NotificationOutbox` clone is dropped and
    /// the queue is drained.
    #[must_use]
    pub fn start(
        dispatcher: NotificationDispatcher,
        policy: RetryPolicy,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::channel::<PassKey>(capacity.max(1));

        let worker = tokio::spawn(async move {
            info!(capacity, "Notification worker started");
            let mut in_flight = Vec::new();
            while let Some(key) = receiver.recv().await {
                let dispatcher = dispatcher.clone();
                in_flight.push(tokio::spawn(deliver(dispatcher, policy, key)));
                in_flight.retain(|task: &JoinHandle<()>| !task.is_finished());
            }
            for task in in_flight {
                if let Err(e) = task.await {
                    error!(error = %e, "Notification task panicked");
                }
            }
            info!("Notification worker stopped");
        });

        (Self { sender }, worker)
    }

    /// Queue a broadcast for `key`. Never blocks.
    pub fn enqueue(&self, key: PassKey) {
        match self.sender.try_send(key) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(key)) => {
                error!(pass = %key, "Notification queue full, dropping task");
            }
            Err(mpsc::error::TrySendError::Closed(key)) => {
                error!(pass = %key, "Notification worker stopped, dropping task");
            }
        }
    }
}

#[instrument(skip(dispatcher, policy), fields(pass = %key))]
async fn deliver(dispatcher: NotificationDispatcher, policy: RetryPolicy, key: PassKey) {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        tokio::time::sleep(policy.delay_before(attempt)).await;

        match dispatcher.broadcast(&key).await {
            Ok(report) if report.is_success() => return,
            Ok(report) => warn!(
                attempt,
                attempted = report.attempted,
                failed = report.failed,
                "Broadcast reached no device"
            ),
            Err(e) => warn!(attempt, error = %e, "Broadcast could not load registrations"),
        }
    }

    error!(attempts = max_attempts, "Giving up on notification task");
}
