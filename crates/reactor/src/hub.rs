//! In-process fan-out of dashboard events.
//!
//! Each subscriber owns a bounded channel; `broadcast` serializes the event
//! once and attempts a non-blocking send to every subscriber. A full or
//! closed channel means the subscriber is too slow or gone, and it is
//! evicted on the spot — one bad consumer never back-pressures the rest.

use std::collections::HashMap;
use std::sync::Mutex;

use domain::DashboardUpdate;
use exporter::pool::ProgressSink;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Queued events per subscriber before it counts as slow.
const SUBSCRIBER_BUFFER: usize = 32;

/// Subscriber handle used for unregistration.
pub type SubscriberId = u64;

struct HubInner {
    subscribers: HashMap<SubscriberId, mpsc::Sender<String>>,
    next_id: SubscriberId,
    agent_count: i64,
}

/// WebSocket registry and broadcaster for dashboard connections.
pub struct Hub {
    inner: Mutex<HubInner>,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HubInner {
                subscribers: HashMap::new(),
                next_id: 0,
                agent_count: 0,
            }),
        }
    }

    /// Adds a subscriber and returns its id plus the event receiver. The
    /// connection task forwards received payloads to its socket; when the
    /// receiver closes, the hub has evicted the subscriber.
    pub fn register(&self) -> (SubscriberId, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let mut inner = self.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.insert(id, tx);
        info!(total_connections = inner.subscribers.len(), "dashboard connected");
        (id, rx)
    }

    /// Removes a subscriber. Dropping its sender closes the connection task.
    pub fn unregister(&self, id: SubscriberId) {
        let mut inner = self.lock();
        if inner.subscribers.remove(&id).is_some() {
            info!(
                total_connections = inner.subscribers.len(),
                "dashboard disconnected"
            );
        }
    }

    /// Sends an event to every subscriber, evicting any that cannot keep up.
    pub fn broadcast(&self, update: &DashboardUpdate) {
        let payload = match serde_json::to_string(update) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to serialize dashboard update");
                return;
            }
        };

        let mut inner = self.lock();
        inner.subscribers.retain(|id, tx| {
            if tx.try_send(payload.clone()).is_err() {
                warn!(subscriber = id, "evicting slow dashboard subscriber");
                false
            } else {
                true
            }
        });
    }

    /// Atomically adjusts the connected-agent counter and broadcasts the new
    /// total.
    pub fn update_agent_count(&self, delta: i64) {
        let count = {
            let mut inner = self.lock();
            inner.agent_count += delta;
            inner.agent_count
        };
        self.broadcast(&DashboardUpdate::agent_update(count));
    }

    pub fn agent_count(&self) -> i64 {
        self.lock().agent_count
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressSink for Hub {
    fn publish(&self, update: DashboardUpdate) {
        self.broadcast(&update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_reaches_all_subscribers() {
        let hub = Hub::new();
        let (_id1, mut rx1) = hub.register();
        let (_id2, mut rx2) = hub.register();

        hub.broadcast(&DashboardUpdate::progress("job-1", 10));

        let p1 = rx1.recv().await.unwrap();
        let p2 = rx2.recv().await.unwrap();
        assert_eq!(p1, p2);
        assert!(p1.contains("\"progress\""));
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let hub = Hub::new();
        let (id, mut rx) = hub.register();
        hub.unregister(id);
        hub.broadcast(&DashboardUpdate::progress("job-1", 10));
        // Sender dropped: the receiver reports closure instead of an event.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_slow_subscriber_evicted_others_unaffected() {
        let hub = Hub::new();
        let (_slow_id, slow_rx) = hub.register();

        // Fill the slow subscriber's buffer without draining it.
        for i in 0..SUBSCRIBER_BUFFER as u64 {
            hub.broadcast(&DashboardUpdate::progress("job-1", i));
        }
        assert_eq!(hub.subscriber_count(), 1);

        // A healthy late joiner still gets the event that evicts the slow one.
        let (_ok_id, mut ok_rx) = hub.register();
        hub.broadcast(&DashboardUpdate::progress("job-1", 99));

        assert_eq!(hub.subscriber_count(), 1);
        drop(slow_rx);
        let delivered = ok_rx.recv().await.unwrap();
        assert!(delivered.contains("\"rows\":99"));
    }

    #[tokio::test]
    async fn test_agent_count_broadcasts_total() {
        let hub = Hub::new();
        let (_id, mut rx) = hub.register();

        hub.update_agent_count(1);
        hub.update_agent_count(1);
        hub.update_agent_count(-1);
        assert_eq!(hub.agent_count(), 1);

        let first = rx.recv().await.unwrap();
        assert!(first.contains("\"agent_update\""));
        assert!(first.contains("\"agent_count\":1"));
        let second = rx.recv().await.unwrap();
        assert!(second.contains("\"agent_count\":2"));
    }

    #[tokio::test]
    async fn test_late_subscriber_sees_only_future_events() {
        let hub = Hub::new();
        hub.broadcast(&DashboardUpdate::progress("job-1", 10));

        let (_id, mut rx) = hub.register();
        hub.broadcast(&DashboardUpdate::progress("job-1", 20));

        let only = rx.recv().await.unwrap();
        assert!(only.contains("\"rows\":20"));
        assert!(rx.try_recv().is_err());
    }
}
