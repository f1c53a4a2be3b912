// SPDX-License-Identifier: Apache-2.0

//! The batching logs exporter.
//!
//! Pulls records from the queue, batches them by count and age, and ships
//! each batch to the collector. A batch is dropped after its flush attempt
//! whatever the outcome: logs must never block the data plane, durability
//! is the queue's job.
//!
//! Stopping comes in two flavours. With `soft_stop` off, cancelling the
//! outer scope aborts the current receive and the loop exits at once. With
//! `soft_stop` on, the receive-timeout scope is detached from the outer
//! scope, so a stop request cannot cut a wait short: the loop only exits
//! once the queue has been idle for a full `receive_timeout` *and* a stop
//! was requested. That bounds the drain window to one timeout interval
//! after the stop.

use crate::exporters::otlp::client::OtlpClient;
use crate::exporters::otlp::errors::{self, ExporterError};
use crate::exporters::otlp::transformer::transform;
use crate::queue::{Queue, QueueError};
use crate::record::Record;
use crate::scope::CancelScope;
use crate::telemetry::FallbackSink;
use http::Uri;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tower::timeout::{Timeout, TimeoutLayer};
use tower::{BoxError, Service, ServiceBuilder, ServiceExt};

#[derive(Clone)]
pub struct ExporterConfig {
    pub endpoint: String,
    pub batch_size: usize,
    pub full_batch_timeout: Duration,
    pub receive_timeout: Duration,
    pub request_timeout: Duration,
    pub soft_stop: bool,
}

impl Default for ExporterConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4318/v1/logs".to_string(),
            batch_size: 100,
            full_batch_timeout: Duration::from_millis(2000),
            receive_timeout: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(30),
            soft_stop: true,
        }
    }
}

/// Creates a configured logs exporter.
///
/// # Arguments
/// * `config` - Exporter configuration, including the collector endpoint
/// * `queue` - Queue the exporter drains
/// * `sink` - Fallback sink for the exporter's own diagnostics
pub fn build_logs_exporter<Q: Queue>(
    config: ExporterConfig,
    queue: Q,
    sink: Arc<dyn FallbackSink>,
) -> Result<LogsExporter<Q>, BoxError> {
    let endpoint: Uri = config.endpoint.parse()?;
    let client = OtlpClient::build(endpoint)?;
    let svc = ServiceBuilder::new()
        .layer(TimeoutLayer::new(config.request_timeout))
        .service(client);

    Ok(LogsExporter {
        config,
        queue,
        svc,
        sink,
        batch: Vec::new(),
        last_flush: Instant::now(),
    })
}

pub struct LogsExporter<Q> {
    config: ExporterConfig,
    queue: Q,
    svc: Timeout<OtlpClient>,
    sink: Arc<dyn FallbackSink>,
    batch: Vec<Record>,
    last_flush: Instant,
}

impl<Q: Queue> LogsExporter<Q> {
    /// Runs the exporter until `scope` requests a stop (see the module docs
    /// for the two stop modes). Flushes any residual batch before
    /// returning.
    pub async fn start(&mut self, scope: CancelScope) {
        self.batch = Vec::with_capacity(self.config.batch_size);
        self.last_flush = Instant::now();

        loop {
            if self.batch.len() >= self.config.batch_size
                || self.last_flush.elapsed() > self.config.full_batch_timeout
            {
                self.flush().await;
                continue;
            }

            let recv_scope = if self.config.soft_stop {
                CancelScope::new()
            } else {
                scope.child()
            };

            // One-shot timer; not cleared on a successful receive. The
            // sub-scope is single-use, so a late cancel is inert.
            let timer_scope = recv_scope.clone();
            let receive_timeout = self.config.receive_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(receive_timeout).await;
                timer_scope.cancel();
            });

            match self.queue.receive(&recv_scope).await {
                Ok(record) => self.batch.push(record),
                Err(QueueError::ScopeCancelled) => {
                    // Either the receive timed out or (non-soft) the outer
                    // cancellation propagated; both exit only once a stop
                    // was actually requested.
                    if scope.done() {
                        break;
                    }
                }
                Err(e) => self.sink.warn(&format!("queue receive failed: {}", e)),
            }
        }

        if !self.batch.is_empty() {
            self.flush().await;
        }
    }

    async fn flush(&mut self) {
        let batch = std::mem::take(&mut self.batch);
        self.last_flush = Instant::now();
        if batch.is_empty() {
            return;
        }

        let record_count = batch.len();
        let request = transform(&batch, self.sink.as_ref());

        let result = match self.svc.ready().await {
            Ok(svc) => svc.call(request).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(response) => match response.partial_success {
                None => self
                    .sink
                    .debug(&format!("exported {} log records", record_count)),
                Some(partial) if partial.rejected_logs_records > 0 => self.sink.fatal(&format!(
                    "collector rejected {} of {} log records: {}",
                    partial.rejected_logs_records, record_count, partial.error_message
                )),
                Some(partial) => self.sink.warn(&format!(
                    "collector accepted batch with message: {}",
                    partial.error_message
                )),
            },
            Err(e) => match errors::simplify(e) {
                ExporterError::Http(status, body) => self.sink.fatal(&format!(
                    "export failed with status {}: {}",
                    status,
                    body.as_deref().unwrap_or("<no body>")
                )),
                transport => self
                    .sink
                    .fatal(&format!("export transport failure: {}", transport)),
            },
        }
        // The batch is gone either way.
    }
}
