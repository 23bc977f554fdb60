//! Subscription callbacks and delivery policies

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use super::filter::MessageFilter;
use super::message::GatewayMessage;
use crate::Result;

/// Lifetimes at or below this are treated as "no expiry"
const MIN_LIFETIME: Duration = Duration::from_secs(10);

/// Recipient of delivered notification batches
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver a batch of matching messages.
    ///
    /// # Errors
    ///
    /// Implementations report delivery failure; the engine applies the
    /// callback's [`ErrorPolicy`].
    async fn deliver(&self, messages: Vec<GatewayMessage>) -> Result<()>;
}

/// Buffering/scheduling policy applied to a subscription's deliveries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Deliver each matching message immediately, one at a time
    Unary,
    /// Accumulate and flush once the buffer reaches the threshold
    Buffered {
        /// Flush threshold in messages
        threshold: usize,
    },
    /// Deliver accumulated messages at a fixed interval
    Scheduled {
        /// Flush interval
        interval: Duration,
    },
    /// Flush on whichever of threshold or interval occurs first
    BufferedScheduled {
        /// Flush threshold in messages
        threshold: usize,
        /// Flush interval
        interval: Duration,
    },
}

impl DeliveryMode {
    /// Replace out-of-range parameters with the configured defaults
    #[must_use]
    pub fn normalized(self, default_threshold: usize, default_interval: Duration) -> Self {
        let fix_threshold = |t: usize| if t == 0 { default_threshold } else { t };
        let fix_interval = |i: Duration| {
            if i < Duration::from_millis(10) {
                default_interval
            } else {
                i
            }
        };
        match self {
            Self::Unary => Self::Unary,
            Self::Buffered { threshold } => Self::Buffered {
                threshold: fix_threshold(threshold),
            },
            Self::Scheduled { interval } => Self::Scheduled {
                interval: fix_interval(interval),
            },
            Self::BufferedScheduled {
                threshold,
                interval,
            } => Self::BufferedScheduled {
                threshold: fix_threshold(threshold),
                interval: fix_interval(interval),
            },
        }
    }

    /// Flush interval for scheduled modes
    #[must_use]
    pub const fn interval(&self) -> Option<Duration> {
        match self {
            Self::Scheduled { interval } | Self::BufferedScheduled { interval, .. } => {
                Some(*interval)
            }
            Self::Unary | Self::Buffered { .. } => None,
        }
    }
}

/// What the engine does when a sink reports a delivery failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Log and keep the callback alive
    #[default]
    Continue,
    /// Deactivate the callback
    Stop,
    /// Silently keep going
    Ignore,
    /// Log at error level and keep going
    Log,
}

/// A registered subscription callback
pub struct Callback {
    id: String,
    filter: MessageFilter,
    sink: std::sync::Arc<dyn NotificationSink>,
    mode: DeliveryMode,
    error_policy: ErrorPolicy,
    expires_at: Option<Instant>,
    active: AtomicBool,
    buffer: Mutex<Vec<GatewayMessage>>,
    flush_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Callback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Callback")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl Callback {
    /// Create a callback with a generated `cb-` name.
    ///
    /// A lifetime of 10 seconds or less means no expiry.
    #[must_use]
    pub fn new(
        filter: MessageFilter,
        sink: std::sync::Arc<dyn NotificationSink>,
        mode: DeliveryMode,
        error_policy: ErrorPolicy,
        lifetime: Option<Duration>,
    ) -> Self {
        let expires_at = lifetime
            .filter(|l| *l > MIN_LIFETIME)
            .map(|l| Instant::now() + l);
        Self {
            id: format!("cb-{}", Uuid::new_v4()),
            filter,
            sink,
            mode,
            error_policy,
            expires_at,
            active: AtomicBool::new(true),
            buffer: Mutex::new(Vec::new()),
            flush_task: Mutex::new(None),
        }
    }

    /// Generated callback name
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The filter this callback is bound to
    #[must_use]
    pub const fn filter(&self) -> &MessageFilter {
        &self.filter
    }

    /// Delivery mode
    #[must_use]
    pub const fn mode(&self) -> DeliveryMode {
        self.mode
    }

    /// Error policy applied on sink failure
    #[must_use]
    pub const fn error_policy(&self) -> ErrorPolicy {
        self.error_policy
    }

    /// The sink receiving deliveries
    #[must_use]
    pub fn sink(&self) -> std::sync::Arc<dyn NotificationSink> {
        std::sync::Arc::clone(&self.sink)
    }

    /// Whether the callback still receives messages
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire) && !self.is_expired()
    }

    /// Whether a configured lifetime has elapsed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() > at)
    }

    /// Permanently deactivate; aborts any scheduled flush task
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }

    /// Attach the scheduled flush task handle
    pub(crate) fn set_flush_task(&self, task: JoinHandle<()>) {
        *self
            .flush_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task);
    }

    /// Offer a matching message; returns a batch when one is due now.
    ///
    /// Unary returns the message immediately; buffered modes return the
    /// drained buffer exactly when the threshold is reached; purely
    /// scheduled accumulation returns nothing (the timer flushes).
    pub(crate) fn offer(&self, message: GatewayMessage) -> Option<Vec<GatewayMessage>> {
        match self.mode {
            DeliveryMode::Unary => Some(vec![message]),
            DeliveryMode::Buffered { threshold }
            | DeliveryMode::BufferedScheduled { threshold, .. } => {
                let mut buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
                buffer.push(message);
                if buffer.len() >= threshold {
                    Some(std::mem::take(&mut *buffer))
                } else {
                    None
                }
            }
            DeliveryMode::Scheduled { .. } => {
                self.buffer
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(message);
                None
            }
        }
    }

    /// Drain whatever has accumulated (scheduled flush path)
    pub(crate) fn drain(&self) -> Vec<GatewayMessage> {
        std::mem::take(&mut *self.buffer.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
