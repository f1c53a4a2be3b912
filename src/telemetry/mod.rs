// SPDX-License-Identifier: Apache-2.0

//! Local diagnostics and the producer-side record sink.
//!
//! The exporter must never log through the pipeline it is exporting, so its
//! own diagnostics go through a [`FallbackSink`]. Production code uses
//! [`TracingSink`]; tests swap in [`CapturingSink`] to assert on what the
//! exporter said.

use crate::queue::Queue;
use crate::record::{Record, Severity};
use std::sync::Mutex;
use tracing::{debug, error, warn};

pub trait FallbackSink: Send + Sync {
    fn log(&self, severity: Severity, message: &str);

    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message);
    }

    fn warn(&self, message: &str) {
        self.log(Severity::Warn, message);
    }

    fn fatal(&self, message: &str) {
        self.log(Severity::Fatal, message);
    }
}

/// Production sink: forwards to the `tracing` macros.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl FallbackSink for TracingSink {
    fn log(&self, severity: Severity, message: &str) {
        match severity {
            Severity::Debug => debug!("{message}"),
            Severity::Warn => warn!("{message}"),
            Severity::Fatal => error!("{message}"),
        }
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpSink;

impl FallbackSink for NoOpSink {
    fn log(&self, _severity: Severity, _message: &str) {}
}

/// Records every entry; used by tests to assert on exporter diagnostics.
#[derive(Debug, Default)]
pub struct CapturingSink {
    entries: Mutex<Vec<(Severity, String)>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(Severity, String)> {
        std::mem::take(&mut self.entries.lock().unwrap())
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == severity)
            .count()
    }
}

impl FallbackSink for CapturingSink {
    fn log(&self, severity: Severity, message: &str) {
        self.entries
            .lock()
            .unwrap()
            .push((severity, message.to_string()));
    }
}

/// Producer-side sink: drops debug records unless debug logging is enabled,
/// and tees every surviving record into the bound queue. Queue failures
/// only surface as a warn so emitting a log can never fail the caller.
pub struct ProducerSink<Q> {
    queue: Option<Q>,
    debug_enabled: bool,
}

impl<Q: Queue> ProducerSink<Q> {
    pub fn new(debug_enabled: bool) -> Self {
        Self {
            queue: None,
            debug_enabled,
        }
    }

    pub fn with_queue(mut self, queue: Q) -> Self {
        self.queue = Some(queue);
        self
    }

    pub async fn emit(&self, record: Record) {
        if record.severity() == Some(Severity::Debug) && !self.debug_enabled {
            return;
        }
        if let Some(queue) = &self.queue {
            if let Err(e) = queue.send(record).await {
                warn!(error = %e, "failed to tee record into queue");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryQueue;
    use crate::record::keys;
    use crate::scope::CancelScope;

    #[test]
    fn capturing_sink_records_entries() {
        let sink = CapturingSink::new();
        sink.warn("first");
        sink.fatal("second");

        assert_eq!(sink.count(Severity::Fatal), 1);
        let entries = sink.take();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], (Severity::Warn, "first".to_string()));
    }

    #[tokio::test]
    async fn producer_sink_drops_debug_when_disabled() {
        let queue = MemoryQueue::new();
        let sink = ProducerSink::new(false).with_queue(queue.clone());

        sink.emit(
            Record::new()
                .with(keys::MESSAGE, "noise")
                .with_severity(Severity::Debug),
        )
        .await;
        sink.emit(
            Record::new()
                .with(keys::MESSAGE, "kept")
                .with_severity(Severity::Warn),
        )
        .await;

        assert_eq!(queue.len(), 1);
        let record = queue.receive(&CancelScope::new()).await.unwrap();
        assert_eq!(record.get(keys::MESSAGE).unwrap().as_str(), Some("kept"));
    }

    #[tokio::test]
    async fn producer_sink_keeps_debug_when_enabled() {
        let queue = MemoryQueue::new();
        let sink = ProducerSink::new(true).with_queue(queue.clone());

        sink.emit(
            Record::new()
                .with(keys::MESSAGE, "noise")
                .with_severity(Severity::Debug),
        )
        .await;

        assert_eq!(queue.len(), 1);
    }
}
