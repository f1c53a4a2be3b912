// SPDX-License-Identifier: Apache-2.0

//! In-memory queue backend: an unbounded flume channel. The channel's own
//! waiter list provides the blocked-receiver wakeups; cancellation composes
//! in through `select!`.

use crate::queue::{Queue, QueueError};
use crate::record::Record;
use crate::scope::CancelScope;
use tokio::select;

#[derive(Clone)]
pub struct MemoryQueue {
    tx: flume::Sender<Record>,
    rx: flume::Receiver<Record>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Queue for MemoryQueue {
    async fn send(&self, record: Record) -> Result<(), QueueError> {
        self.tx
            .send(record)
            .map_err(|_| QueueError::unavailable("channel disconnected"))
    }

    async fn receive(&self, scope: &CancelScope) -> Result<Record, QueueError> {
        select! {
            biased;

            r = self.rx.recv_async() => {
                r.map_err(|_| QueueError::unavailable("channel disconnected"))
            },
            _ = scope.cancelled() => Err(QueueError::ScopeCancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryQueue;
    use crate::queue::{Queue, QueueError};
    use crate::record::Record;
    use crate::scope::CancelScope;
    use std::time::Duration;

    #[tokio::test]
    async fn fifo_order() {
        let q = MemoryQueue::new();
        q.send(Record::new().with("i", 1)).await.unwrap();
        q.send(Record::new().with("i", 2)).await.unwrap();
        q.send(Record::new().with("i", 3)).await.unwrap();

        for expected in 1..=3 {
            let record = q.receive(&CancelScope::new()).await.unwrap();
            assert_eq!(record.get("i").unwrap().as_i64(), Some(expected));
        }
    }

    #[tokio::test]
    async fn cancel_unblocks_parked_receiver() {
        let q = MemoryQueue::new();
        let scope = CancelScope::new();

        let recv_q = q.clone();
        let recv_scope = scope.clone();
        let handle = tokio::spawn(async move { recv_q.receive(&recv_scope).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        scope.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("receiver stayed parked")
            .unwrap();
        assert!(matches!(result, Err(QueueError::ScopeCancelled)));
    }

    #[tokio::test]
    async fn receive_on_cancelled_scope_fails() {
        let q = MemoryQueue::new();
        let scope = CancelScope::new();
        scope.cancel();

        let result = q.receive(&scope).await;
        assert!(matches!(result, Err(QueueError::ScopeCancelled)));
    }

    #[tokio::test]
    async fn send_wakes_a_parked_receiver() {
        let q = MemoryQueue::new();
        let scope = CancelScope::new();

        let recv_q = q.clone();
        let handle = tokio::spawn(async move { recv_q.receive(&scope).await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.send(Record::new().with("i", 7)).await.unwrap();

        let record = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("send did not wake receiver")
            .unwrap()
            .unwrap();
        assert_eq!(record.get("i").unwrap().as_i64(), Some(7));
    }

    #[tokio::test]
    async fn receiver_parks_until_send() {
        use tokio_test::{assert_ok, assert_pending, assert_ready, task::spawn};

        let q = MemoryQueue::new();
        let scope = CancelScope::new();

        let mut recv = spawn(q.receive(&scope));
        assert_pending!(recv.poll());

        let mut send = spawn(q.send(Record::new().with("i", 1)));
        assert_ok!(assert_ready!(send.poll()));

        assert!(recv.is_woken());
        let record = assert_ready!(recv.poll()).unwrap();
        assert_eq!(record.get("i").unwrap().as_i64(), Some(1));
    }

    #[tokio::test]
    async fn each_record_goes_to_exactly_one_receiver() {
        let q = MemoryQueue::new();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let q = q.clone();
            handles.push(tokio::spawn(async move {
                q.receive(&CancelScope::new()).await.unwrap()
            }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        q.send(Record::new().with("i", 1)).await.unwrap();
        q.send(Record::new().with("i", 2)).await.unwrap();

        let mut seen = Vec::new();
        for handle in handles {
            let record = tokio::time::timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
            seen.push(record.get("i").unwrap().as_i64().unwrap());
        }
        seen.sort();
        assert_eq!(seen, [1, 2]);
    }
}
