//! Fan-out of completed scans to stream subscribers
//!
//! One producer publishes; every subscriber owns a bounded queue. Publishing
//! never waits on a subscriber: a full queue sheds a scan according to its
//! overflow policy.

use lidar_core::{OverflowPolicy, Scan};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tokio::sync::Notify;
use tracing::{debug, info, trace};

/// Subscriber identifier, unique for the lifetime of the hub
pub type SubscriberId = u64;

/// One subscriber's queue
struct SubscriberSlot {
    queue: Mutex<VecDeque<Arc<Scan>>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
    created_at: Instant,
}

impl SubscriberSlot {
    fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
            created_at: Instant::now(),
        }
    }

    fn push(&self, scan: Arc<Scan>) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            // Checked under the lock so a push can never land after close()
            if self.closed.load(Ordering::Acquire) {
                return;
            }
            if queue.len() >= self.capacity {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        queue.pop_front();
                    }
                    OverflowPolicy::DropNewest => return,
                }
            }
            queue.push_back(scan);
        }
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<Arc<Scan>> {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        queue.pop_front()
    }

    fn close(&self) {
        {
            let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            self.closed.store(true, Ordering::Release);
            queue.clear();
        }
        self.notify.notify_one();
    }
}

/// Registry of subscribers plus the latest-scan cache
pub struct FanoutHub {
    subscribers: RwLock<HashMap<SubscriberId, Arc<SubscriberSlot>>>,
    latest: RwLock<Option<Arc<Scan>>>,
    next_id: AtomicU64,
    published: AtomicU64,
    default_capacity: usize,
    default_policy: OverflowPolicy,
}

impl FanoutHub {
    /// Create a hub whose `subscribe()` uses the given queue settings
    pub fn new(default_capacity: usize, default_policy: OverflowPolicy) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            latest: RwLock::new(None),
            next_id: AtomicU64::new(1),
            published: AtomicU64::new(0),
            default_capacity: default_capacity.max(1),
            default_policy,
        }
    }

    /// Register a subscriber with the hub's default queue settings
    pub fn subscribe(self: &Arc<Self>) -> SubscriberHandle {
        self.subscribe_with(self.default_capacity, self.default_policy)
    }

    /// Register a subscriber with explicit queue settings
    pub fn subscribe_with(
        self: &Arc<Self>,
        capacity: usize,
        policy: OverflowPolicy,
    ) -> SubscriberHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let slot = Arc::new(SubscriberSlot::new(capacity.max(1), policy));

        let count = {
            let mut subscribers = self.subscribers.write().unwrap_or_else(|e| e.into_inner());
            subscribers.insert(id, slot.clone());
            subscribers.len()
        };
        info!(
            "Subscriber {} connected (capacity {}, {:?}); {} active",
            id, slot.capacity, slot.policy, count
        );

        SubscriberHandle {
            id,
            slot,
            hub: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber; its pending `recv()` resolves to `None`.
    ///
    /// Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&id);

        match removed {
            Some(slot) => {
                slot.close();
                debug!(
                    "Subscriber {} removed after {:.1}s ({} scans dropped)",
                    id,
                    slot.created_at.elapsed().as_secs_f64(),
                    slot.dropped.load(Ordering::Relaxed)
                );
                true
            }
            None => false,
        }
    }

    /// Publish a completed scan: update the cache, then enqueue for everyone
    pub fn publish(&self, scan: Arc<Scan>) {
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(scan.clone());
        self.published.fetch_add(1, Ordering::Relaxed);

        // Snapshot so concurrent (un)subscribes never wait on queue pushes
        let slots: Vec<Arc<SubscriberSlot>> = self
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();

        trace!("Publishing scan with {} points to {} subscribers", scan.len(), slots.len());
        for slot in slots {
            if !slot.closed.load(Ordering::Acquire) {
                slot.push(scan.clone());
            }
        }
    }

    /// Most recently published scan
    pub fn latest(&self) -> Option<Arc<Scan>> {
        self.latest.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Scans published since creation
    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn default_capacity(&self) -> usize {
        self.default_capacity
    }

    pub fn default_policy(&self) -> OverflowPolicy {
        self.default_policy
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct SubscriberHandle {
    id: SubscriberId,
    slot: Arc<SubscriberSlot>,
    hub: std::sync::Weak<FanoutHub>,
}

impl SubscriberHandle {
    /// Wait for the next scan; `None` once unsubscribed.
    ///
    /// Cancellation safe: a scan is only removed from the queue when it is
    /// returned.
    pub async fn recv(&self) -> Option<Arc<Scan>> {
        loop {
            let notified = self.slot.notify.notified();
            if self.slot.closed.load(Ordering::Acquire) {
                return None;
            }
            if let Some(scan) = self.slot.pop() {
                return Some(scan);
            }
            notified.await;
        }
    }

    /// Take a queued scan without waiting; `None` once unsubscribed
    pub fn try_recv(&self) -> Option<Arc<Scan>> {
        self.slot.pop()
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.slot.capacity
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.slot.policy
    }

    /// Scans shed because the queue was full
    pub fn dropped(&self) -> u64 {
        self.slot.dropped.load(Ordering::Relaxed)
    }

    /// Scans currently queued
    pub fn queued(&self) -> usize {
        self.slot
            .queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl Drop for SubscriberHandle {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.unsubscribe(self.id) {
                info!("Subscriber {} disconnected", self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lidar_core::Sample;
    use std::time::Duration;

    fn scan(ts: f64) -> Arc<Scan> {
        Arc::new(Scan::with_timestamp(ts, vec![Sample::new(0.0, 100.0, 1)]))
    }

    fn hub(capacity: usize) -> Arc<FanoutHub> {
        Arc::new(FanoutHub::new(capacity, OverflowPolicy::DropOldest))
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_every_scan_in_order() {
        let hub = hub(16);
        let subs: Vec<_> = (0..5).map(|_| hub.subscribe()).collect();

        for i in 0..10 {
            hub.publish(scan(i as f64));
        }

        for sub in &subs {
            for i in 0..10 {
                assert_eq!(sub.recv().await.unwrap().timestamp(), i as f64);
            }
            assert!(sub.try_recv().is_none());
        }
        assert_eq!(hub.published_count(), 10);
    }

    #[tokio::test]
    async fn test_latest_updated_and_delivered() {
        let hub = hub(10);
        let sub = hub.subscribe();
        assert!(hub.latest().is_none());

        hub.publish(scan(1.0));
        hub.publish(Arc::new(Scan::with_timestamp(1.1, vec![])));

        assert_eq!(sub.recv().await.unwrap().timestamp(), 1.0);
        let stalled = sub.recv().await.unwrap();
        assert_eq!(stalled.timestamp(), 1.1);
        assert!(stalled.is_empty());

        let latest = hub.latest().unwrap();
        assert_eq!(latest.timestamp(), 1.1);
        assert!(latest.is_empty());
    }

    #[test]
    fn test_slow_subscriber_never_blocks_publish() {
        let hub = hub(3);
        let slow = hub.subscribe();

        for i in 0..1000 {
            hub.publish(scan(i as f64));
        }

        assert_eq!(slow.queued(), 3);
        assert_eq!(slow.dropped(), 997);
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest() {
        let hub = hub(2);
        let sub = hub.subscribe();

        for i in 0..5 {
            hub.publish(scan(i as f64));
        }

        assert_eq!(sub.recv().await.unwrap().timestamp(), 3.0);
        assert_eq!(sub.recv().await.unwrap().timestamp(), 4.0);
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_oldest() {
        let hub = hub(10);
        let sub = hub.subscribe_with(2, OverflowPolicy::DropNewest);
        assert_eq!(sub.policy(), OverflowPolicy::DropNewest);
        assert_eq!(sub.capacity(), 2);

        for i in 0..5 {
            hub.publish(scan(i as f64));
        }

        assert_eq!(sub.recv().await.unwrap().timestamp(), 0.0);
        assert_eq!(sub.recv().await.unwrap().timestamp(), 1.0);
        assert_eq!(sub.dropped(), 3);
    }

    #[tokio::test]
    async fn test_unsubscribe_wakes_pending_recv() {
        let hub = hub(10);
        let sub = Arc::new(hub.subscribe());
        let id = sub.id();

        let waiter = {
            let sub = sub.clone();
            tokio::spawn(async move { sub.recv().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(hub.unsubscribe(id));
        let result = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());

        hub.publish(scan(1.0));
        assert!(sub.try_recv().is_none());
        assert!(!hub.unsubscribe(id));
    }

    #[tokio::test]
    async fn test_removed_subscriber_receives_nothing_more() {
        let hub = hub(10);
        let sub = hub.subscribe();
        hub.publish(scan(1.0));
        hub.publish(scan(2.0));
        assert_eq!(sub.queued(), 2);

        assert!(hub.unsubscribe(sub.id()));
        assert!(sub.try_recv().is_none());
        assert!(sub.recv().await.is_none());

        // Direct pushes to a closed slot are refused too
        sub.slot.push(scan(3.0));
        assert_eq!(sub.queued(), 0);
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_drop_handle_unsubscribes() {
        let hub = hub(10);
        let a = hub.subscribe();
        let b = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);
        assert_ne!(a.id(), b.id());

        drop(a);
        assert_eq!(hub.subscriber_count(), 1);
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_recv_waits_for_publish() {
        let hub = hub(10);
        let sub = hub.subscribe();

        let publisher = {
            let hub = hub.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                hub.publish(scan(7.0));
            })
        };

        let received = tokio::time::timeout(Duration::from_secs(1), sub.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.timestamp(), 7.0);
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_unsubscribe_during_publish() {
        let hub = hub(4);
        let producer = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    hub.publish(scan(i as f64));
                    tokio::task::yield_now().await;
                }
            })
        };

        for _ in 0..50 {
            let sub = hub.subscribe();
            tokio::task::yield_now().await;
            drop(sub);
        }

        producer.await.unwrap();
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.published_count(), 500);
    }
}
