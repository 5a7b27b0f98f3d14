//! Notification dispatch: priority-aware queue, fixed worker pool,
//! global token-bucket rate limit, per-notifier retry with backoff.

pub mod discord;
pub mod email;
pub mod webhook;

use parking_lot::Mutex;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cache::rate_limiter::TokenBucket;
use crate::config::AlertConfig;
use crate::store::models::{Alert, AlertStatus};

#[derive(Debug)]
pub enum NotifyOutcome {
    Ok,
    Retryable(String),
    NonRetryable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    #[error("notifier has no configured recipients")]
    Unconfigured,
}

/// Per-notifier contract: `send`, plus lifecycle hooks mirrored by
/// every transport so the dispatcher can treat them uniformly.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn send(&self, alert: &Alert) -> NotifyOutcome;
    async fn resolve(&self, alert_id: Uuid) -> NotifyOutcome;
    async fn update(&self, alert_id: Uuid, status: AlertStatus) -> NotifyOutcome;
    fn validate_config(&self) -> Result<(), NotifierError>;
    async fn health_check(&self) -> bool;
}

struct Task {
    alert: Alert,
    channels: Vec<String>,
    priority: u8,
    attempt: u32,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
    }
}
impl Eq for Task {}
impl PartialOrd for Task {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Task {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // BinaryHeap is a max-heap; priority 1 (critical) must pop first.
        other.priority.cmp(&self.priority)
    }
}

struct Queue {
    heap: Mutex<BinaryHeap<Task>>,
    notify: Notify,
}

#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<Queue>,
    notifiers: Arc<Vec<Arc<dyn Notifier>>>,
    max_retries: u32,
}

impl Dispatcher {
    /// Spawns `worker_count` workers draining a shared priority queue,
    /// gated by a process-local token bucket. Returns a handle; call
    /// `enqueue`/`resolve` from the alert pipeline.
    pub fn spawn(
        notifiers: Vec<Arc<dyn Notifier>>,
        config: &AlertConfig,
        worker_count: usize,
        token: CancellationToken,
    ) -> Self {
        for notifier in &notifiers {
            if let Err(e) = notifier.validate_config() {
                tracing::warn!(notifier = notifier.name(), error = %e, "notifier unconfigured, will be skipped");
            }
        }

        let queue = Arc::new(Queue { heap: Mutex::new(BinaryHeap::new()), notify: Notify::new() });
        let limiter = Arc::new(Mutex::new(TokenBucket::new(
            config.rate_limit_per_minute,
            Duration::from_secs(60),
        )));
        let dispatcher = Self { queue, notifiers: Arc::new(notifiers), max_retries: config.max_retries };

        for worker_id in 0..worker_count.max(1) {
            let queue = dispatcher.queue.clone();
            let notifiers = dispatcher.notifiers.clone();
            let limiter = limiter.clone();
            let max_retries = dispatcher.max_retries;
            let token = token.clone();
            tokio::spawn(async move {
                worker_loop(worker_id, queue, notifiers, limiter, max_retries, token).await;
            });
        }

        dispatcher
    }

    pub async fn enqueue(&self, alert: Alert, channels: Vec<String>) {
        let priority = alert.severity.priority();
        self.queue.heap.lock().push(Task { alert, channels, priority, attempt: 0 });
        self.queue.notify.notify_one();
    }

    /// Best-effort: tells every configured notifier the alert resolved.
    /// Idempotency isn't assumed on the notifier side.
    pub async fn resolve(&self, alert_id: Uuid) {
        for notifier in self.notifiers.iter() {
            let outcome = notifier.resolve(alert_id).await;
            if let NotifyOutcome::NonRetryable(msg) | NotifyOutcome::Retryable(msg) = outcome {
                tracing::warn!(notifier = notifier.name(), %alert_id, error = %msg, "resolve notification failed");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Queue>,
    notifiers: Arc<Vec<Arc<dyn Notifier>>>,
    limiter: Arc<Mutex<TokenBucket>>,
    max_retries: u32,
    token: CancellationToken,
) {
    loop {
        let task = loop {
            if let Some(task) = queue.heap.lock().pop() {
                break Some(task);
            }
            tokio::select! {
                _ = token.cancelled() => break None,
                _ = queue.notify.notified() => continue,
            }
        };
        let Some(mut task) = task else {
            tracing::debug!(worker_id, "notification worker shutting down");
            return;
        };

        if !limiter.lock().try_take() {
            tokio::time::sleep(Duration::from_millis(250)).await;
            queue.heap.lock().push(task);
            continue;
        }

        let channel_notifiers: Vec<_> =
            notifiers.iter().filter(|n| task.channels.iter().any(|c| c == n.name())).cloned().collect();
        if channel_notifiers.is_empty() {
            tracing::warn!(alert_id = %task.alert.id, channels = ?task.channels, "no matching configured notifier, dropping notification");
            continue;
        }

        let mut retry = false;
        for notifier in channel_notifiers {
            match notifier.send(&task.alert).await {
                NotifyOutcome::Ok => {}
                NotifyOutcome::NonRetryable(msg) => {
                    tracing::error!(notifier = notifier.name(), alert_id = %task.alert.id, error = %msg, "notification permanently failed");
                }
                NotifyOutcome::Retryable(msg) => {
                    tracing::warn!(notifier = notifier.name(), alert_id = %task.alert.id, error = %msg, attempt = task.attempt, "notification failed, will retry");
                    retry = true;
                }
            }
        }

        if retry && task.attempt < max_retries {
            task.attempt += 1;
            let backoff = Duration::from_secs(2u64.saturating_pow(task.attempt));
            let queue = queue.clone();
            tokio::spawn(async move {
                tokio::time::sleep(backoff).await;
                queue.heap.lock().push(task);
                queue.notify.notify_one();
            });
        }
    }
}
