// SPDX-License-Identifier: Apache-2.0

use crate::exporters::otlp::ExporterConfig;
use clap::Parser;
use std::net::{SocketAddr, ToSocketAddrs};
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "logship", version, about = "Telemetry pipeline for the archive fetch service")]
pub struct PipelineArgs {
    /// OTLP logs endpoint
    #[arg(
        long,
        env = "LOGSHIP_OTLP_ENDPOINT",
        default_value = "http://localhost:4318/v1/logs"
    )]
    pub otlp_endpoint: String,

    /// Dispatch receiver endpoint
    #[arg(long, env = "LOGSHIP_DISPATCH_ENDPOINT", default_value = "localhost:4380", value_parser = parse_endpoint
    )]
    pub dispatch_endpoint: SocketAddr,

    /// Durable queue file
    #[arg(
        long,
        env = "LOGSHIP_QUEUE_FILE",
        default_value = "/tmp/logship-queue.db"
    )]
    pub queue_file: String,

    /// Max records per export batch
    #[arg(long, env = "LOGSHIP_BATCH_SIZE", default_value = "100")]
    pub batch_size: usize,

    /// Max age of an open batch before a forced flush, in milliseconds
    #[arg(long, env = "LOGSHIP_FULL_BATCH_TIMEOUT_MS", default_value = "2000")]
    pub full_batch_timeout_ms: u64,

    /// Bound on a single blocking queue receive, in milliseconds
    #[arg(long, env = "LOGSHIP_RECEIVE_TIMEOUT_MS", default_value = "1500")]
    pub receive_timeout_ms: u64,

    /// Export request timeout, in milliseconds
    #[arg(long, env = "LOGSHIP_REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Drain the log queue until idle before exiting
    #[arg(long, env = "LOGSHIP_SOFT_STOP", default_value = "true")]
    pub soft_stop: bool,

    /// Keep debug-severity records at the producer sink
    #[arg(long, env = "LOG_DEBUG", default_value = "false")]
    pub debug_log: bool,

    /// Tee producer records into the durable queue
    #[arg(long, env = "LOG_QUEUE", default_value = "false")]
    pub log_queue: bool,
}

impl PipelineArgs {
    pub fn exporter_config(&self) -> ExporterConfig {
        ExporterConfig {
            endpoint: self.otlp_endpoint.clone(),
            batch_size: self.batch_size.max(1),
            full_batch_timeout: Duration::from_millis(self.full_batch_timeout_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            soft_stop: self.soft_stop,
        }
    }
}

fn parse_endpoint(s: &str) -> Result<SocketAddr, String> {
    s.to_socket_addrs()
        .map_err(|e| format!("unable to resolve {}: {}", s, e))?
        .next()
        .ok_or_else(|| format!("no address for {}", s))
}
