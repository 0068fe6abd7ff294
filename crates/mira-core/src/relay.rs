// event relay - fans events out to every overlay window and in-process listeners

use crate::speech::MicEvent;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::{debug, warn};

pub const MIC_STATUS: &str = "mic:status";
pub const MIC_RESPONSE: &str = "mic:response";
pub const MIC_VIEW: &str = "mic:view";
pub const DASHBOARD_UPDATED: &str = "dashboard:updated";

/// delivers a payload to renderer windows; the shell emits to every overlay
pub trait EventBroadcaster: Send + Sync {
    fn broadcast(&self, channel: &str, payload: &Value) -> Result<(), String>;
}

type Listener = Arc<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    id: u64,
    channel: String,
    listener: Listener,
}

struct RelayInner {
    listeners: Mutex<Vec<Entry>>,
    next_id: AtomicU64,
    broadcaster: Option<Arc<dyn EventBroadcaster>>,
}

impl RelayInner {
    fn remove(&self, id: u64) {
        lock(&self.listeners).retain(|e| e.id != id);
    }
}

#[derive(Clone)]
pub struct EventRelay {
    inner: Arc<RelayInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl EventRelay {
    pub fn new(broadcaster: Option<Arc<dyn EventBroadcaster>>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                listeners: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                broadcaster,
            }),
        }
    }

    pub fn subscribe<F>(&self, channel: &str, listener: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push(Entry {
            id,
            channel: channel.to_string(),
            listener: Arc::new(listener),
        });
        Subscription {
            id,
            relay: Arc::downgrade(&self.inner),
            disposed: AtomicBool::new(false),
        }
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        lock(&self.inner.listeners)
            .iter()
            .filter(|e| e.channel == channel)
            .count()
    }

    /// no filtering: every window and every listener on the channel gets it
    pub fn publish(&self, channel: &str, payload: &Value) {
        if let Some(broadcaster) = &self.inner.broadcaster {
            if let Err(e) = broadcaster.broadcast(channel, payload) {
                warn!(channel, error = %e, "broadcast failed");
            }
        }

        // snapshot so listeners can (un)subscribe from inside the callback
        let listeners: Vec<Listener> = lock(&self.inner.listeners)
            .iter()
            .filter(|e| e.channel == channel)
            .map(|e| e.listener.clone())
            .collect();
        debug!(channel, listeners = listeners.len(), "relaying event");
        for listener in listeners {
            listener(payload);
        }
    }

    pub fn publish_mic_event(&self, event: &MicEvent) {
        let (channel, payload) = match event {
            MicEvent::Status(status) => match serde_json::to_value(status) {
                Ok(v) => (MIC_STATUS, v),
                Err(e) => {
                    warn!(error = %e, "failed to serialize mic status");
                    return;
                }
            },
            MicEvent::Response(result) => (MIC_RESPONSE, result.as_value().clone()),
        };
        self.publish(channel, &payload);
    }
}

/// Handle returned by [`EventRelay::subscribe`]. Disposing is idempotent and
/// safe after the relay is gone; dropping the handle disposes it too.
#[must_use = "dropping a Subscription unsubscribes it"]
pub struct Subscription {
    id: u64,
    relay: Weak<RelayInner>,
    disposed: AtomicBool,
}

impl Subscription {
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(relay) = self.relay.upgrade() {
            relay.remove(self.id);
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}
