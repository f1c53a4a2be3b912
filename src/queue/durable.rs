// SPDX-License-Identifier: Apache-2.0

//! Durable queue backend: a single-file SQLite store.
//!
//! A send is an INSERT in its own transaction, so an acknowledged record
//! survives restart. A receive SELECTs the lowest id and DELETEs it in the
//! same transaction, which is what makes delivery at-least-once with no
//! double delivery inside a live process: a crash between read and commit
//! leaves the row for the next process instance.
//!
//! Parked receivers wait on an in-process notify signal and additionally
//! poll at a short interval, so rows written by a previous process instance
//! still drain after a restart.

use crate::queue::{Queue, QueueError};
use crate::record::Record;
use crate::scope::CancelScope;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::select;
use tokio::sync::Notify;
use tokio::task;
use tracing::warn;

const RECEIVE_POLL_INTERVAL: Duration = Duration::from_millis(50);

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS messages (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    payload     TEXT NOT NULL,
    enqueued_at INTEGER NOT NULL
)";

#[derive(Clone)]
pub struct DurableQueue {
    conn: Arc<Mutex<Connection>>,
    notify: Arc<Notify>,
}

impl DurableQueue {
    /// Open or create the queue file. The file is single-writer within a
    /// process; cross-process sharing is undefined.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, QueueError> {
        let conn = Connection::open(path).map_err(QueueError::unavailable)?;
        conn.busy_timeout(Duration::from_secs(5))
            .map_err(QueueError::unavailable)?;
        conn.execute(SCHEMA, []).map_err(QueueError::unavailable)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            notify: Arc::new(Notify::new()),
        })
    }

    pub fn depth(&self) -> Result<u64, QueueError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .map_err(QueueError::unavailable)
    }

    async fn pop_front(&self) -> Result<Option<(i64, String)>, QueueError> {
        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    "SELECT id, payload FROM messages ORDER BY id ASC LIMIT 1",
                    [],
                    |r| Ok((r.get::<_, i64>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            if let Some((id, _)) = &row {
                tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok::<_, rusqlite::Error>(row)
        })
        .await
        .map_err(QueueError::unavailable)?
        .map_err(QueueError::unavailable)
    }
}

impl Queue for DurableQueue {
    async fn send(&self, record: Record) -> Result<(), QueueError> {
        let payload = serde_json::to_string(&record).map_err(QueueError::unavailable)?;
        let enqueued_at = unix_millis();

        let conn = self.conn.clone();
        task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO messages (payload, enqueued_at) VALUES (?1, ?2)",
                params![payload, enqueued_at],
            )?;
            tx.commit()
        })
        .await
        .map_err(QueueError::unavailable)?
        .map_err(QueueError::unavailable)?;

        self.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, scope: &CancelScope) -> Result<Record, QueueError> {
        loop {
            match self.pop_front().await? {
                Some((id, payload)) => match serde_json::from_str::<Record>(&payload) {
                    Ok(record) => return Ok(record),
                    Err(e) => {
                        // The row is already deleted; returning it to the
                        // head would redeliver it forever.
                        warn!(id, error = %e, "dropping undecodable queue payload");
                    }
                },
                None => {
                    select! {
                        biased;

                        _ = scope.cancelled() => return Err(QueueError::ScopeCancelled),
                        _ = self.notify.notified() => {},
                        _ = tokio::time::sleep(RECEIVE_POLL_INTERVAL) => {},
                    }
                }
            }
        }
    }
}

fn unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::DurableQueue;
    use crate::queue::{Queue, QueueError};
    use crate::record::Record;
    use crate::scope::CancelScope;
    use rusqlite::params;
    use std::time::Duration;

    fn queue_path(dir: &tempfile::TempDir) -> std::path::PathBuf {
        dir.path().join("queue.db")
    }

    #[tokio::test]
    async fn fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(queue_path(&dir)).unwrap();

        for i in 1..=3 {
            q.send(Record::new().with("i", i)).await.unwrap();
        }
        for expected in 1..=3 {
            let record = q.receive(&CancelScope::new()).await.unwrap();
            assert_eq!(record.get("i").unwrap().as_i64(), Some(expected));
        }
    }

    #[tokio::test]
    async fn receive_consumes_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(queue_path(&dir)).unwrap();

        q.send(Record::new().with("i", 1)).await.unwrap();
        q.receive(&CancelScope::new()).await.unwrap();
        assert_eq!(q.depth().unwrap(), 0);

        let scope = CancelScope::new();
        scope.cancel();
        let result = q.receive(&scope).await;
        assert!(matches!(result, Err(QueueError::ScopeCancelled)));
    }

    #[tokio::test]
    async fn records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);

        {
            let q = DurableQueue::open(&path).unwrap();
            q.send(Record::new().with("i", 1)).await.unwrap();
            q.send(Record::new().with("i", 2)).await.unwrap();
        }

        let q = DurableQueue::open(&path).unwrap();
        let record = q.receive(&CancelScope::new()).await.unwrap();
        assert_eq!(record.get("i").unwrap().as_i64(), Some(1));
        assert_eq!(q.depth().unwrap(), 1);
    }

    #[tokio::test]
    async fn send_wakes_a_parked_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(queue_path(&dir)).unwrap();

        let recv_q = q.clone();
        let handle = tokio::spawn(async move {
            recv_q.receive(&CancelScope::new()).await.unwrap()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        q.send(Record::new().with("i", 9)).await.unwrap();

        let record = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("send did not wake receiver")
            .unwrap();
        assert_eq!(record.get("i").unwrap().as_i64(), Some(9));
    }

    #[tokio::test]
    async fn cancel_unblocks_parked_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let q = DurableQueue::open(queue_path(&dir)).unwrap();
        let scope = CancelScope::new();

        let recv_q = q.clone();
        let recv_scope = scope.clone();
        let handle = tokio::spawn(async move { recv_q.receive(&recv_scope).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();

        let result = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("receiver stayed parked")
            .unwrap();
        assert!(matches!(result, Err(QueueError::ScopeCancelled)));
    }

    #[tokio::test]
    async fn polling_drains_rows_written_out_of_band() {
        // Simulates rows left behind by a previous process instance: the
        // in-process notify never fires, only the poll tick can see them.
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);
        let q = DurableQueue::open(&path).unwrap();

        let recv_q = q.clone();
        let handle = tokio::spawn(async move {
            recv_q.receive(&CancelScope::new()).await.unwrap()
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let side = rusqlite::Connection::open(&path).unwrap();
        side.execute(
            "INSERT INTO messages (payload, enqueued_at) VALUES (?1, ?2)",
            params![r#"{"i":42}"#, 0],
        )
        .unwrap();

        let record = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("poll fallback did not drain the row")
            .unwrap();
        assert_eq!(record.get("i").unwrap().as_i64(), Some(42));
    }

    #[tokio::test]
    async fn undecodable_payload_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = queue_path(&dir);
        let q = DurableQueue::open(&path).unwrap();

        let side = rusqlite::Connection::open(&path).unwrap();
        side.execute(
            "INSERT INTO messages (payload, enqueued_at) VALUES (?1, ?2)",
            params!["not json {{", 0],
        )
        .unwrap();
        q.send(Record::new().with("i", 1)).await.unwrap();

        let record = q.receive(&CancelScope::new()).await.unwrap();
        assert_eq!(record.get("i").unwrap().as_i64(), Some(1));
        assert_eq!(q.depth().unwrap(), 0);
    }
}
