//! In-memory submission queue.
//!
//! Same delivery model as the Redis stream binding: one shared log, one
//! cursor per consumer group, and a pending list per group holding entries
//! handed out but not acknowledged. Entries left pending longer than the ack
//! timeout are reclaimed on the next receive. Unlike the Redis binding, a
//! nacked entry is queued for redelivery right away; the worker backs off
//! after a nack so a failing store is not retried in a tight loop.
//!
//! The log keeps at most `max_len` entries, oldest dropped first, like
//! `XADD MAXLEN`. A group that falls further behind than that skips the
//! dropped entries; entries already handed out stay pending with their
//! payload.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::domain::{QueueDelivery, QueueError, SubmissionQueue};

struct PendingEntry {
    payload: String,
    delivery_count: u64,
    delivered_at: Instant,
}

#[derive(Default)]
struct GroupState {
    /// Absolute index of the next log entry this group has not seen
    cursor: usize,
    pending: HashMap<String, PendingEntry>,
    /// Pending ids due for redelivery, oldest first
    retry: VecDeque<String>,
}

#[derive(Default)]
struct QueueState {
    log: VecDeque<(String, String)>,
    /// Absolute index of `log[0]`; entries before it were trimmed
    offset: usize,
    groups: HashMap<String, GroupState>,
    closed: bool,
}

impl QueueState {
    /// Absolute index one past the newest entry.
    fn end(&self) -> usize {
        self.offset + self.log.len()
    }

    fn trim_to(&mut self, max_len: usize) {
        while self.log.len() > max_len {
            self.log.pop_front();
            self.offset += 1;
        }
    }
}

/// Entries kept when no cap is configured.
pub const DEFAULT_MAX_LEN: usize = 100_000;

pub struct InMemoryQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    block: Duration,
    ack_timeout: Duration,
    max_len: usize,
}

impl InMemoryQueue {
    pub fn new(block: Duration, ack_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            block,
            ack_timeout,
            max_len: DEFAULT_MAX_LEN,
        }
    }

    /// Cap the number of retained log entries.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len.max(1);
        self
    }

    /// Entries published so far, trimmed ones included.
    pub fn published(&self) -> usize {
        self.state.lock().end()
    }

    /// Entries currently held in the log.
    pub fn retained(&self) -> usize {
        self.state.lock().log.len()
    }

    /// Entries handed to `group` and not yet acknowledged.
    pub fn pending(&self, group: &str) -> usize {
        self.state
            .lock()
            .groups
            .get(group)
            .map_or(0, |g| g.pending.len())
    }

    /// Whether `group` has nothing left to deliver or acknowledge.
    pub fn is_drained(&self, group: &str) -> bool {
        let state = self.state.lock();
        state
            .groups
            .get(group)
            .map_or(true, |g| g.pending.is_empty() && g.cursor >= state.end())
    }

    /// Refuse further operations and wake blocked receivers.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    fn try_take(&self, group: &str) -> Result<Option<QueueDelivery>, QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(QueueError::Closed);
        }
        let QueueState {
            log, offset, groups, ..
        } = &mut *state;
        let Some(group_state) = groups.get_mut(group) else {
            return Err(QueueError::Broker(format!("NOGROUP no such consumer group {}", group)));
        };

        let now = Instant::now();
        let ack_timeout = self.ack_timeout;
        let mut expired: Vec<String> = group_state
            .pending
            .iter()
            .filter(|(id, p)| {
                now.duration_since(p.delivered_at) >= ack_timeout && !group_state.retry.contains(*id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        expired.sort();
        group_state.retry.extend(expired);

        while let Some(id) = group_state.retry.pop_front() {
            if let Some(entry) = group_state.pending.get_mut(&id) {
                entry.delivery_count += 1;
                entry.delivered_at = now;
                return Ok(Some(QueueDelivery {
                    id,
                    group: group.to_string(),
                    payload: entry.payload.clone(),
                    delivery_count: entry.delivery_count,
                }));
            }
        }

        if group_state.cursor < *offset {
            group_state.cursor = *offset;
        }
        if let Some((id, payload)) = log.get(group_state.cursor - *offset).cloned() {
            group_state.cursor += 1;
            group_state.pending.insert(
                id.clone(),
                PendingEntry {
                    payload: payload.clone(),
                    delivery_count: 1,
                    delivered_at: now,
                },
            );
            return Ok(Some(QueueDelivery {
                id,
                group: group.to_string(),
                payload,
                delivery_count: 1,
            }));
        }

        Ok(None)
    }
}

#[async_trait]
impl SubmissionQueue for InMemoryQueue {
    async fn publish(&self, payload: &str) -> Result<String, QueueError> {
        let id = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let id = format!("{}-0", state.end() + 1);
            state.log.push_back((id.clone(), payload.to_string()));
            state.trim_to(self.max_len);
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn ensure_group(&self, group: &str) -> Result<(), QueueError> {
        self.state.lock().groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn receive(&self, group: &str, _consumer: &str) -> Result<Option<QueueDelivery>, QueueError> {
        let deadline = tokio::time::Instant::now() + self.block;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(delivery) = self.try_take(group)? {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &QueueDelivery) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if let Some(group) = state.groups.get_mut(&delivery.group) {
            group.pending.remove(&delivery.id);
            group.retry.retain(|id| *id != delivery.id);
        }
        Ok(())
    }

    async fn nack(&self, delivery: &QueueDelivery) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if let Some(group) = state.groups.get_mut(&delivery.group) {
                if group.pending.contains_key(&delivery.id) && !group.retry.contains(&delivery.id) {
                    group.retry.push_back(delivery.id.clone());
                }
            }
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn ping(&self) -> Result<(), QueueError> {
        if self.state.lock().closed {
            return Err(QueueError::Closed);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn queue() -> InMemoryQueue {
        InMemoryQueue::new(Duration::from_millis(20), Duration::from_secs(30))
    }

    #[tokio::test]
    async fn test_every_group_sees_every_entry() {
        let q = queue();
        q.ensure_group("storage").await.unwrap();
        q.ensure_group("delivery").await.unwrap();
        q.publish("a").await.unwrap();

        let s = q.receive("storage", "c1").await.unwrap().unwrap();
        let d = q.receive("delivery", "c1").await.unwrap().unwrap();
        assert_eq!(s.payload, "a");
        assert_eq!(d.payload, "a");
        assert_eq!(s.id, d.id);
        assert!(q.receive("storage", "c1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_nack_redelivers_before_new_entries() {
        let q = queue();
        q.ensure_group("g").await.unwrap();
        q.publish("first").await.unwrap();
        q.publish("second").await.unwrap();

        let first = q.receive("g", "c1").await.unwrap().unwrap();
        q.nack(&first).await.unwrap();

        let again = q.receive("g", "c1").await.unwrap().unwrap();
        assert_eq!(again.payload, "first");
        assert_eq!(again.delivery_count, 2);
        assert!(again.is_redelivery());
        q.ack(&again).await.unwrap();

        let second = q.receive("g", "c1").await.unwrap().unwrap();
        assert_eq!(second.payload, "second");
        q.ack(&second).await.unwrap();
        assert!(q.is_drained("g"));
    }

    #[tokio::test]
    async fn test_unacked_entry_is_reclaimed_after_timeout() {
        let q = InMemoryQueue::new(Duration::from_millis(20), Duration::from_millis(10));
        q.ensure_group("g").await.unwrap();
        q.publish("a").await.unwrap();

        let first = q.receive("g", "crashed").await.unwrap().unwrap();
        assert_eq!(q.pending("g"), 1);
        tokio::time::sleep(Duration::from_millis(15)).await;

        let reclaimed = q.receive("g", "survivor").await.unwrap().unwrap();
        assert_eq!(reclaimed.id, first.id);
        assert_eq!(reclaimed.delivery_count, 2);
    }

    #[tokio::test]
    async fn test_receive_wakes_on_publish() {
        let q = std::sync::Arc::new(InMemoryQueue::new(Duration::from_secs(5), Duration::from_secs(30)));
        q.ensure_group("g").await.unwrap();

        let receiver = {
            let q = q.clone();
            tokio::spawn(async move { q.receive("g", "c1").await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        q.publish("late").await.unwrap();

        let delivery = receiver.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.payload, "late");
    }

    #[tokio::test]
    async fn test_log_is_capped_like_maxlen() {
        let q = queue().with_max_len(100);
        q.ensure_group("g").await.unwrap();
        for i in 0..1000 {
            q.publish(&format!("m{}", i)).await.unwrap();
            let delivery = q.receive("g", "c1").await.unwrap().unwrap();
            assert_eq!(delivery.payload, format!("m{}", i));
            q.ack(&delivery).await.unwrap();
        }

        assert!(q.is_drained("g"));
        assert_eq!(q.published(), 1000);
        assert_eq!(q.retained(), 100);
    }

    #[tokio::test]
    async fn test_lagging_group_skips_trimmed_entries() {
        let q = queue().with_max_len(2);
        q.ensure_group("fast").await.unwrap();
        q.ensure_group("slow").await.unwrap();
        q.publish("a").await.unwrap();

        // handed out before the trim, so its payload survives it
        let held = q.receive("fast", "c1").await.unwrap().unwrap();
        q.publish("b").await.unwrap();
        q.publish("c").await.unwrap();
        assert_eq!(q.retained(), 2);

        let next = q.receive("slow", "c1").await.unwrap().unwrap();
        assert_eq!(next.payload, "b");
        assert_eq!(next.id, "2-0");

        q.nack(&held).await.unwrap();
        let again = q.receive("fast", "c1").await.unwrap().unwrap();
        assert_eq!(again.payload, "a");
    }

    #[tokio::test]
    async fn test_missing_group_is_an_error() {
        let q = queue();
        assert!(q.receive("nope", "c1").await.is_err());
    }
}
