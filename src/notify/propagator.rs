//! The message propagator: one FIFO dispatch worker per gateway instance

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::agent::Agent;
use super::callback::{Callback, DeliveryMode, ErrorPolicy, NotificationSink};
use super::filter::MessageFilter;
use super::message::GatewayMessage;
use super::{Notifier, PropagatorEvent};

/// Instance-wide defaults applied to out-of-range delivery parameters
#[derive(Debug, Clone, Copy)]
pub struct DeliveryDefaults {
    /// Buffer threshold used when a subscription supplies zero
    pub buffer_threshold: usize,
    /// Schedule interval used when a subscription supplies one below 10 ms
    pub schedule_interval: Duration,
}

impl Default for DeliveryDefaults {
    fn default() -> Self {
        Self {
            buffer_threshold: 10,
            schedule_interval: Duration::from_millis(1000),
        }
    }
}

/// A filter with its bound callbacks
struct FilterEntry {
    filter: MessageFilter,
    callbacks: Vec<Arc<Callback>>,
}

struct Inner {
    /// Removal and delivery share this lock, so a callback is never invoked
    /// concurrently with its own teardown.
    filters: tokio::sync::Mutex<Vec<FilterEntry>>,
    agents: tokio::sync::Mutex<Vec<Arc<Agent>>>,
    defaults: DeliveryDefaults,
}

/// Single ingestion point for all gateway messages.
///
/// Producers push through [`Notifier`] handles; `start` spawns the one
/// dispatch worker that pops strictly in push order.
pub struct MessagePropagator {
    tx: UnboundedSender<PropagatorEvent>,
    rx: Mutex<Option<UnboundedReceiver<PropagatorEvent>>>,
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for MessagePropagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePropagator").finish_non_exhaustive()
    }
}

impl MessagePropagator {
    /// Create a propagator; messages queue until [`Self::start`] is called
    #[must_use]
    pub fn new(defaults: DeliveryDefaults) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            inner: Arc::new(Inner {
                filters: tokio::sync::Mutex::new(Vec::new()),
                agents: tokio::sync::Mutex::new(Vec::new()),
                defaults,
            }),
            worker: Mutex::new(None),
        }
    }

    /// Publishing handle for entity-tree nodes
    #[must_use]
    pub fn notifier(&self) -> Notifier {
        Notifier::new(self.tx.clone())
    }

    /// Spawn the dispatch worker. No-op when already started.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return;
        }
        let Some(rx) = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            return;
        };
        let inner = Arc::clone(&self.inner);
        *worker = Some(tokio::spawn(Self::run(inner, rx)));
    }

    /// Stop the worker and deactivate every callback
    pub async fn shutdown(&self) {
        let task = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        let mut filters = self.inner.filters.lock().await;
        for entry in filters.drain(..) {
            for cb in entry.callbacks {
                cb.deactivate();
            }
        }
        self.inner.agents.lock().await.clear();
    }

    /// Register a callback under `filter`.
    ///
    /// Callbacks with equal filters share one filter entry. Out-of-range
    /// delivery parameters fall back to the instance defaults. Returns the
    /// generated callback id.
    pub async fn subscribe(
        &self,
        filter: MessageFilter,
        sink: Arc<dyn NotificationSink>,
        mode: DeliveryMode,
        error_policy: ErrorPolicy,
        lifetime: Option<Duration>,
    ) -> String {
        let mode = mode.normalized(
            self.inner.defaults.buffer_threshold,
            self.inner.defaults.schedule_interval,
        );
        let callback = Arc::new(Callback::new(
            filter.clone(),
            sink,
            mode,
            error_policy,
            lifetime,
        ));
        let id = callback.id().to_string();

        if let Some(interval) = mode.interval() {
            let tx = self.tx.clone();
            let flush_id = id.clone();
            let task = tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                // The first tick completes immediately
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if tx.send(PropagatorEvent::Flush(flush_id.clone())).is_err() {
                        break;
                    }
                }
            });
            callback.set_flush_task(task);
        }

        let mut filters = self.inner.filters.lock().await;
        if let Some(entry) = filters.iter_mut().find(|e| e.filter == filter) {
            entry.callbacks.push(callback);
        } else {
            filters.push(FilterEntry {
                filter,
                callbacks: vec![callback],
            });
        }
        tracing::debug!(callback = %id, "subscribed");
        id
    }

    /// Remove a callback; the filter goes with it when its list empties.
    ///
    /// Idempotent: returns `false` for unknown ids.
    pub async fn unsubscribe(&self, id: &str) -> bool {
        let mut filters = self.inner.filters.lock().await;
        let mut found = false;
        for entry in filters.iter_mut() {
            if let Some(pos) = entry.callbacks.iter().position(|cb| cb.id() == id) {
                entry.callbacks[pos].deactivate();
                entry.callbacks.remove(pos);
                found = true;
                break;
            }
        }
        filters.retain(|e| !e.callbacks.is_empty());
        if found {
            tracing::debug!(callback = %id, "unsubscribed");
        }
        found
    }

    /// Register a cross-cutting agent; returns its id
    pub async fn register_agent(&self, agent: Agent) -> String {
        let id = agent.id().to_string();
        self.inner.agents.lock().await.push(Arc::new(agent));
        tracing::debug!(agent = %id, "agent registered");
        id
    }

    /// Unregister an agent. Idempotent: unknown ids are a no-op.
    pub async fn unregister_agent(&self, id: &str) -> bool {
        let mut agents = self.inner.agents.lock().await;
        let before = agents.len();
        agents.retain(|a| a.id() != id);
        before != agents.len()
    }

    /// Sink of a registered agent, used to relay federated notifications
    pub async fn agent_sink(&self, id: &str) -> Option<Arc<dyn NotificationSink>> {
        self.inner
            .agents
            .lock()
            .await
            .iter()
            .find(|a| a.id() == id)
            .map(|a| a.sink())
    }

    async fn run(inner: Arc<Inner>, rx: UnboundedReceiver<PropagatorEvent>) {
        let mut events = UnboundedReceiverStream::new(rx);
        while let Some(event) = events.next().await {
            match event {
                PropagatorEvent::Publish(message) => Self::dispatch(&inner, message).await,
                PropagatorEvent::Flush(id) => Self::flush(&inner, &id).await,
            }
        }
    }

    async fn dispatch(inner: &Inner, message: GatewayMessage) {
        // Agents first: access-gated, then filter callbacks
        {
            let agents = inner.agents.lock().await;
            for agent in &*agents {
                if !agent.accepts(&message) {
                    continue;
                }
                if let Err(e) = agent.sink().deliver(vec![message.clone()]).await {
                    tracing::warn!(agent = agent.id(), error = %e, "agent delivery failed");
                }
            }
        }

        let mut filters = inner.filters.lock().await;
        for entry in filters.iter_mut() {
            if !entry.filter.matches(&message) {
                continue;
            }
            for callback in &entry.callbacks {
                // Re-check liveness immediately before invoking
                if !callback.is_active() {
                    continue;
                }
                if let Some(batch) = callback.offer(message.clone()) {
                    Self::deliver(callback, batch).await;
                }
            }
        }
        Self::prune(&mut filters);
    }

    async fn flush(inner: &Inner, id: &str) {
        let mut filters = inner.filters.lock().await;
        let callback = filters
            .iter()
            .flat_map(|e| e.callbacks.iter())
            .find(|cb| cb.id() == id)
            .cloned();
        if let Some(callback) = callback
            && callback.is_active()
        {
            let batch = callback.drain();
            if !batch.is_empty() {
                Self::deliver(&callback, batch).await;
            }
        }
        Self::prune(&mut filters);
    }

    async fn deliver(callback: &Arc<Callback>, batch: Vec<GatewayMessage>) {
        if let Err(e) = callback.sink().deliver(batch).await {
            match callback.error_policy() {
                ErrorPolicy::Continue => {
                    tracing::warn!(callback = callback.id(), error = %e, "delivery failed");
                }
                ErrorPolicy::Stop => {
                    tracing::warn!(callback = callback.id(), error = %e, "delivery failed, stopping callback");
                    callback.deactivate();
                }
                ErrorPolicy::Ignore => {}
                ErrorPolicy::Log => {
                    tracing::error!(callback = callback.id(), error = %e, "delivery failed");
                }
            }
        }
    }

    /// Drop expired/deactivated callbacks and emptied filters
    fn prune(filters: &mut Vec<FilterEntry>) {
        for entry in filters.iter_mut() {
            entry.callbacks.retain(|cb| {
                if cb.is_active() {
                    true
                } else {
                    cb.deactivate();
                    false
                }
            });
        }
        filters.retain(|e| !e.callbacks.is_empty());
    }
}
