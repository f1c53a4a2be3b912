// SPDX-License-Identifier: Apache-2.0

//! Record queues feeding the batching exporter.
//!
//! Producers call [`Queue::send`]; the exporter blocks on [`Queue::receive`]
//! under a cancellation scope. Both backends are FIFO at their linearization
//! point and hand each record to exactly one receiver in a live process.

use crate::record::Record;
use crate::scope::CancelScope;
use std::future::Future;
use thiserror::Error;

pub mod durable;
pub mod memory;

pub use durable::DurableQueue;
pub use memory::MemoryQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Control-flow sentinel: the receive scope was cancelled before a
    /// record arrived. Never logged as fatal.
    #[error("scope cancelled")]
    ScopeCancelled,

    /// The backend is unusable (disk error, closed channel, ...). The
    /// caller's retry policy decides what happens next.
    #[error("queue unavailable: {0}")]
    Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl QueueError {
    pub fn unavailable(cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        QueueError::Unavailable(cause.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, QueueError::ScopeCancelled)
    }
}

pub trait Queue: Send + Sync + 'static {
    /// Enqueue one record. Does not block on queue capacity.
    fn send(&self, record: Record) -> impl Future<Output = Result<(), QueueError>> + Send;

    /// Block until a record is available or `scope` is cancelled. On
    /// cancellation fails with [`QueueError::ScopeCancelled`]; a failed
    /// receive never consumes a record.
    fn receive(
        &self,
        scope: &CancelScope,
    ) -> impl Future<Output = Result<Record, QueueError>> + Send;
}
