use std::collections::VecDeque;
use std::time::Instant;

use crate::message::AlertMessage;

/// One queued alert plus its delivery bookkeeping.
#[derive(Debug)]
pub struct PendingAlert {
    pub message: AlertMessage,
    /// Times this alert has been put on the wire.
    pub attempts: u32,
    /// When the latest attempt was sent; None means not currently in
    /// flight (new, or queued for replay after a reconnect).
    pub sent_at: Option<Instant>,
}

/// Ordered queue of unacknowledged alerts for one device session. Ids are
/// assigned here and only here, so they are unique and monotonic per
/// session by construction. The queue is bounded: when full, the oldest
/// pending alert yields to the newest; for a safety alert, recency beats
/// completeness.
pub struct PendingQueue {
    alerts: VecDeque<PendingAlert>,
    next_id: u64,
    max_pending: usize,
}

impl PendingQueue {
    pub fn new(max_pending: usize) -> Self {
        Self {
            alerts: VecDeque::new(),
            next_id: 1,
            max_pending: max_pending.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.alerts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alerts.is_empty()
    }

    /// Peek at the id the next enqueued alert will get.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Assign the next id and enqueue. Returns the assigned id and, when
    /// the bound was hit, the evicted oldest alert.
    pub fn enqueue(&mut self, mut message: AlertMessage) -> (u64, Option<AlertMessage>) {
        let id = self.next_id;
        self.next_id += 1;
        message.id = id;
        self.alerts.push_back(PendingAlert {
            message,
            attempts: 0,
            sent_at: None,
        });

        let evicted = if self.alerts.len() > self.max_pending {
            self.alerts.pop_front().map(|p| p.message)
        } else {
            None
        };
        (id, evicted)
    }

    /// Cumulative acknowledgment: remove and return every alert with
    /// id ≤ `ack_id`, in id order. Out-of-order acks are fine; an ack for
    /// an already-retired id is a no-op.
    pub fn acknowledge(&mut self, ack_id: u64) -> Vec<AlertMessage> {
        let mut retired = Vec::new();
        while let Some(front) = self.alerts.front() {
            if front.message.id <= ack_id {
                retired.push(self.alerts.pop_front().unwrap().message);
            } else {
                break;
            }
        }
        retired
    }

    /// Alerts never sent on the current link, in id order.
    pub fn unsent_mut(&mut self) -> impl Iterator<Item = &mut PendingAlert> {
        self.alerts.iter_mut().filter(|p| p.sent_at.is_none())
    }

    /// The in-flight alert the wearable owes an ack for first.
    pub fn oldest_in_flight_mut(&mut self) -> Option<&mut PendingAlert> {
        self.alerts.iter_mut().find(|p| p.sent_at.is_some())
    }

    pub fn get_mut(&mut self, id: u64) -> Option<&mut PendingAlert> {
        self.alerts.iter_mut().find(|p| p.message.id == id)
    }

    /// Remove a specific alert (delivery exhausted).
    pub fn remove(&mut self, id: u64) -> Option<AlertMessage> {
        let idx = self.alerts.iter().position(|p| p.message.id == id)?;
        self.alerts.remove(idx).map(|p| p.message)
    }

    /// After a reconnect every queued alert must be replayed in id order
    /// before anything new goes out; mark them all unsent.
    pub fn mark_all_unsent(&mut self) {
        for alert in self.alerts.iter_mut() {
            alert.sent_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(signature: &str) -> AlertMessage {
        AlertMessage {
            id: 0, // assigned by the queue
            signature: signature.into(),
            confidence: 0.9,
            timestamp: 0,
            direction: None,
        }
    }

    #[test]
    fn ids_are_monotonic_from_one() {
        let mut q = PendingQueue::new(8);
        let (a, _) = q.enqueue(alert("siren"));
        let (b, _) = q.enqueue(alert("horn"));
        let (c, _) = q.enqueue(alert("bike"));
        assert_eq!((a, b, c), (1, 2, 3));
        assert_eq!(q.next_id(), 4);
    }

    #[test]
    fn cumulative_ack_retires_everything_at_or_below() {
        let mut q = PendingQueue::new(8);
        for _ in 0..5 {
            q.enqueue(alert("siren"));
        }

        let retired = q.acknowledge(3);
        assert_eq!(
            retired.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(q.len(), 2);

        // Ack below the current front is a no-op.
        assert!(q.acknowledge(2).is_empty());

        let retired = q.acknowledge(100);
        assert_eq!(
            retired.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_evicts_oldest() {
        let mut q = PendingQueue::new(2);
        q.enqueue(alert("siren"));
        q.enqueue(alert("horn"));
        let (id, evicted) = q.enqueue(alert("bike"));

        assert_eq!(id, 3);
        assert_eq!(evicted.unwrap().id, 1);
        assert_eq!(q.len(), 2);
    }

    #[test]
    fn eviction_never_reuses_ids() {
        let mut q = PendingQueue::new(1);
        q.enqueue(alert("siren"));
        q.enqueue(alert("horn"));
        let (id, _) = q.enqueue(alert("bike"));
        assert_eq!(id, 3);
    }

    #[test]
    fn replay_marks_everything_unsent() {
        let mut q = PendingQueue::new(8);
        q.enqueue(alert("siren"));
        q.enqueue(alert("horn"));
        for p in q.unsent_mut() {
            p.sent_at = Some(Instant::now());
            p.attempts += 1;
        }
        assert!(q.unsent_mut().next().is_none());

        q.mark_all_unsent();
        assert_eq!(q.unsent_mut().count(), 2);
        // Attempts survive the reconnect; the delivery bound is global.
        assert!(q.unsent_mut().all(|p| p.attempts == 1));
    }

    #[test]
    fn remove_targets_one_id() {
        let mut q = PendingQueue::new(8);
        q.enqueue(alert("siren"));
        q.enqueue(alert("horn"));
        q.enqueue(alert("bike"));

        assert_eq!(q.remove(2).unwrap().signature, "horn");
        assert!(q.remove(2).is_none());
        assert_eq!(q.len(), 2);
    }
}
