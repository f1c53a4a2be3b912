// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use logship::exporters::otlp::build_logs_exporter;
use logship::init::args::PipelineArgs;
use logship::queue::DurableQueue;
use logship::receivers::dispatch::{ContentInspector, DispatchServer};
use logship::record::{keys, Record, Severity};
use logship::scope::CancelScope;
use logship::telemetry::{ProducerSink, TracingSink};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::select;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinSet;
use tower::BoxError;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Extension-based stand-in for the archival service's URL inspection
/// heuristics.
struct ExtensionInspector;

impl ContentInspector for ExtensionInspector {
    fn classify(&self, url: &str) -> Option<String> {
        let path = url.split(['?', '#']).next().unwrap_or(url);
        let (_, ext) = path.rsplit_once('.')?;
        match ext {
            "html" | "htm" => Some("text/html".to_string()),
            "pdf" => Some("application/pdf".to_string()),
            "json" => Some("application/json".to_string()),
            "txt" => Some("text/plain".to_string()),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    let args = PipelineArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to build runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("pipeline failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: PipelineArgs) -> Result<(), BoxError> {
    let root = CancelScope::new();
    let mut tasks: JoinSet<Result<(), BoxError>> = JoinSet::new();

    // One durable queue carries the whole pipeline: the dispatch receiver
    // and the producer tee feed it, the exporter drains it.
    let queue = DurableQueue::open(&args.queue_file)?;

    let listener = TcpListener::bind(args.dispatch_endpoint).await?;
    info!(endpoint = %args.dispatch_endpoint, "dispatch receiver listening");

    let server = DispatchServer::new(queue.clone(), Arc::new(ExtensionInspector));
    let server_scope = root.child();
    tasks.spawn(async move { server.serve(listener, server_scope).await });

    let mut exporter =
        build_logs_exporter(args.exporter_config(), queue.clone(), Arc::new(TracingSink))?;
    let exporter_scope = root.child();
    tasks.spawn(async move {
        exporter.start(exporter_scope).await;
        Ok(())
    });
    info!(endpoint = %args.otlp_endpoint, "logs exporter started");

    let producer = args
        .log_queue
        .then(|| ProducerSink::new(args.debug_log).with_queue(queue));

    if let Some(producer) = &producer {
        producer
            .emit(
                Record::new()
                    .with(keys::MESSAGE, "pipeline started")
                    .with(keys::SERVICE_NAME, env!("CARGO_PKG_NAME"))
                    .with(keys::SERVICE_VERSION, env!("CARGO_PKG_VERSION"))
                    .with_severity(Severity::Debug),
            )
            .await;
    }

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    select! {
        _ = sigint.recv() => info!("received SIGINT, stopping"),
        _ = sigterm.recv() => info!("received SIGTERM, stopping"),
    }

    if let Some(producer) = &producer {
        producer
            .emit(
                Record::new()
                    .with(keys::MESSAGE, "pipeline stopping")
                    .with(keys::SERVICE_NAME, env!("CARGO_PKG_NAME"))
                    .with(keys::SERVICE_VERSION, env!("CARGO_PKG_VERSION"))
                    .with_severity(Severity::Debug),
            )
            .await;
    }

    // With soft stop enabled the exporter keeps draining until the queue
    // has been idle for a full receive timeout.
    root.cancel();

    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("task failed: {}", e),
            Err(e) => error!("task panicked: {}", e),
        }
    }

    Ok(())
}
