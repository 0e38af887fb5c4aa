//! Per-service priority wait queue.
//!
//! Entries are ordered by `(priority, sequence)`: lower priority values
//! first, then enqueue order. The queue holds only what admission needs;
//! the caller keeps the request payload and waits on the entry's oneshot.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use crate::ledger::Reservation;

/// What a queued caller is woken with.
#[derive(Debug)]
pub enum QueueOutcome {
    /// Bucket tokens were consumed on the caller's behalf; the reservation
    /// now travels with the request to completion.
    Dispatched {
        reservation: Reservation,
        queued_for: Duration,
    },
    /// The deadline passed. The reservation has already been released.
    TimedOut { waited: Duration },
    /// Removed by an explicit cancel. The reservation has already been
    /// released.
    Cancelled,
}

/// A waiting request.
#[derive(Debug)]
pub struct QueuedRequest {
    pub request_id: Uuid,
    pub agent_id: String,
    pub estimated_tokens: u64,
    pub priority: u32,
    pub enqueued_at: Instant,
    pub deadline: Instant,
    pub reservation: Reservation,
    pub notify: oneshot::Sender<QueueOutcome>,
}

impl QueuedRequest {
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.deadline
    }
}

type Key = (u32, u64);

#[derive(Debug, Default)]
pub struct ServiceQueue {
    entries: BTreeMap<Key, QueuedRequest>,
    index: HashMap<Uuid, Key>,
    next_seq: u64,
}

impl ServiceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, request_id: &Uuid) -> bool {
        self.index.contains_key(request_id)
    }

    /// Append behind everything of equal or lower priority value.
    ///
    /// Hands the entry back if its request_id is already queued.
    pub fn push(&mut self, entry: QueuedRequest) -> Result<(), QueuedRequest> {
        if self.index.contains_key(&entry.request_id) {
            return Err(entry);
        }
        let key = (entry.priority, self.next_seq);
        self.next_seq += 1;
        self.index.insert(entry.request_id, key);
        self.entries.insert(key, entry);
        Ok(())
    }

    /// The entry that dispatches next.
    pub fn peek(&self) -> Option<&QueuedRequest> {
        self.entries.values().next()
    }

    pub fn pop_front(&mut self) -> Option<QueuedRequest> {
        let (_, entry) = self.entries.pop_first()?;
        self.index.remove(&entry.request_id);
        Some(entry)
    }

    pub fn remove(&mut self, request_id: &Uuid) -> Option<QueuedRequest> {
        let key = self.index.remove(request_id)?;
        self.entries.remove(&key)
    }

    /// Take every entry whose deadline is at or before `now`, in queue
    /// order.
    pub fn drain_expired(&mut self, now: Instant) -> Vec<QueuedRequest> {
        let expired: Vec<Key> = self
            .entries
            .iter()
            .filter(|(_, e)| e.is_expired(now))
            .map(|(k, _)| *k)
            .collect();

        expired
            .into_iter()
            .filter_map(|key| {
                let entry = self.entries.remove(&key)?;
                self.index.remove(&entry.request_id);
                Some(entry)
            })
            .collect()
    }

    /// Request ids in dispatch order.
    pub fn order(&self) -> Vec<Uuid> {
        self.entries.values().map(|e| e.request_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;
    use crate::ledger::{QuotaPolicy, ServiceLedger};

    fn ledger() -> ServiceLedger {
        let policy = Arc::new(QuotaPolicy::new(100.0, HashMap::new()));
        let day = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        ServiceLedger::new("svc", 1_000_000, policy, day)
    }

    fn entry(
        ledger: &mut ServiceLedger,
        priority: u32,
        enqueued_at: Instant,
        timeout: Duration,
    ) -> (QueuedRequest, oneshot::Receiver<QueueOutcome>) {
        let (tx, rx) = oneshot::channel();
        let entry = QueuedRequest {
            request_id: Uuid::new_v4(),
            agent_id: "agent".into(),
            estimated_tokens: 10,
            priority,
            enqueued_at,
            deadline: enqueued_at + timeout,
            reservation: ledger.reserve("agent", 10).unwrap(),
            notify: tx,
        };
        (entry, rx)
    }

    #[test]
    fn priority_then_arrival_order() {
        let mut ledger = ledger();
        let mut queue = ServiceQueue::new();
        let now = Instant::now();
        let timeout = Duration::from_secs(30);

        let (a, _ra) = entry(&mut ledger, 5, now, timeout);
        let (b, _rb) = entry(&mut ledger, 5, now, timeout);
        let (c, _rc) = entry(&mut ledger, 1, now, timeout);
        let (a_id, b_id, c_id) = (a.request_id, b.request_id, c.request_id);

        queue.push(a).unwrap();
        queue.push(b).unwrap();
        queue.push(c).unwrap();

        assert_eq!(queue.order(), vec![c_id, a_id, b_id]);
        assert_eq!(queue.pop_front().unwrap().request_id, c_id);
        assert_eq!(queue.peek().unwrap().request_id, a_id);
    }

    #[test]
    fn duplicate_ids_are_refused() {
        let mut ledger = ledger();
        let mut queue = ServiceQueue::new();
        let now = Instant::now();
        let (a, _ra) = entry(&mut ledger, 5, now, Duration::from_secs(1));
        let (mut b, _rb) = entry(&mut ledger, 5, now, Duration::from_secs(1));
        b.request_id = a.request_id;

        queue.push(a).unwrap();
        assert!(queue.push(b).is_err());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn remove_and_expire_are_exclusive() {
        let mut ledger = ledger();
        let mut queue = ServiceQueue::new();
        let t0 = Instant::now();
        let (a, _ra) = entry(&mut ledger, 5, t0, Duration::from_secs(5));
        let (b, _rb) = entry(&mut ledger, 5, t0, Duration::from_secs(60));
        let (a_id, b_id) = (a.request_id, b.request_id);
        queue.push(a).unwrap();
        queue.push(b).unwrap();

        assert!(queue.drain_expired(t0 + Duration::from_secs(4)).is_empty());

        let expired = queue.drain_expired(t0 + Duration::from_secs(5));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].request_id, a_id);
        assert!(queue.remove(&a_id).is_none());

        assert!(queue.remove(&b_id).is_some());
        assert!(queue.remove(&b_id).is_none());
        assert!(queue.is_empty());
    }
}
