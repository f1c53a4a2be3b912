// SPDX-License-Identifier: Apache-2.0

//! The dispatch receiver.
//!
//! `POST /` takes a plain-text URL, classifies it to a content type, and
//! enqueues a fetch request for the archival workers. The queue send is
//! retried a fixed number of times with a fixed back-off; exhaustion is the
//! caller's 500.

use crate::queue::{Queue, QueueError};
use crate::record::{ErrorDetail, Record};
use crate::scope::CancelScope;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response};
use hyper_util::rt::{TokioExecutor, TokioIo, TokioTimer};
use hyper_util::server::conn::auto::Builder;
use hyper_util::service::TowerToHyperService;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::select;
use tower::{BoxError, Service};
use tracing::{error, warn};

pub const SEND_ATTEMPTS: u32 = 5;
pub const SEND_BACKOFF: Duration = Duration::from_millis(500);

/// Classifies a URL to a content type. Implemented by the archival
/// service's inspection heuristics; `None` means the URL cannot be
/// dispatched.
pub trait ContentInspector: Send + Sync + 'static {
    fn classify(&self, url: &str) -> Option<String>;
}

/// The work item handed to the fetch workers through the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchRequest {
    pub url: String,
    pub content_type: String,
}

impl FetchRequest {
    pub fn into_record(self) -> Record {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => Record::from(map),
            _ => Record::new(),
        }
    }
}

/// Send one record with bounded retry: up to [`SEND_ATTEMPTS`] attempts,
/// [`SEND_BACKOFF`] apart, a warn per failed attempt. The last queue error
/// is returned on exhaustion.
pub async fn enqueue_with_retry<Q: Queue>(queue: &Q, record: Record) -> Result<(), QueueError> {
    let mut attempt = 1;
    loop {
        match queue.send(record.clone()).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(attempt, error = %e, "failed to enqueue fetch request");
                if attempt >= SEND_ATTEMPTS {
                    return Err(e);
                }
                attempt += 1;
                tokio::time::sleep(SEND_BACKOFF).await;
            }
        }
    }
}

async fn handle_dispatch<Q: Queue>(
    queue: &Q,
    inspector: &dyn ContentInspector,
    url: &str,
) -> Response<Full<Bytes>> {
    let url = url.trim();
    if url.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("empty_body", "request body must contain a URL"),
        );
    }

    let Some(content_type) = inspector.classify(url) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ErrorDetail::new("unclassifiable_url", "no content type for URL")
                .with_context("url", url),
        );
    };

    let record = FetchRequest {
        url: url.to_string(),
        content_type,
    }
    .into_record();

    match enqueue_with_retry(queue, record).await {
        Ok(()) => empty_response(StatusCode::OK),
        Err(e) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorDetail::from_error("queue_exhausted", &e),
        ),
    }
}

fn empty_response(status: StatusCode) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::default())
        .unwrap()
}

fn error_response(status: StatusCode, detail: ErrorDetail) -> Response<Full<Bytes>> {
    let body = serde_json::to_vec(&detail).unwrap_or_default();
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap()
}

struct DispatchService<Q, I> {
    queue: Q,
    inspector: Arc<I>,
}

impl<Q: Clone, I> Clone for DispatchService<Q, I> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            inspector: self.inspector.clone(),
        }
    }
}

impl<Q, I> Service<Request<Incoming>> for DispatchService<Q, I>
where
    Q: Queue + Clone,
    I: ContentInspector,
{
    type Response = Response<Full<Bytes>>;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Incoming>) -> Self::Future {
        let queue = self.queue.clone();
        let inspector = self.inspector.clone();

        Box::pin(async move {
            if req.method() != Method::POST || req.uri().path() != "/" {
                return Ok(empty_response(StatusCode::NOT_FOUND));
            }

            let body = req.into_body().collect().await?.to_bytes();
            let url = match std::str::from_utf8(&body) {
                Ok(s) => s,
                Err(_) => {
                    return Ok(error_response(
                        StatusCode::BAD_REQUEST,
                        ErrorDetail::new("invalid_body", "request body is not UTF-8"),
                    ))
                }
            };

            Ok(handle_dispatch(&queue, inspector.as_ref(), url).await)
        })
    }
}

pub struct DispatchServer<Q, I> {
    queue: Q,
    inspector: Arc<I>,
}

impl<Q, I> DispatchServer<Q, I>
where
    Q: Queue + Clone,
    I: ContentInspector,
{
    pub fn new(queue: Q, inspector: Arc<I>) -> Self {
        Self { queue, inspector }
    }

    /// Accepts connections until `scope` is cancelled, then drains the
    /// in-flight ones.
    pub async fn serve(&self, listener: TcpListener, scope: CancelScope) -> Result<(), BoxError> {
        let svc = TowerToHyperService::new(DispatchService {
            queue: self.queue.clone(),
            inspector: self.inspector.clone(),
        });

        let graceful = hyper_util::server::graceful::GracefulShutdown::new();
        let mut builder = Builder::new(TokioExecutor::new());
        builder.http1().timer(TokioTimer::new());

        loop {
            let stream = select! {
                r = listener.accept() => {
                    match r {
                        Ok((stream, _)) => stream,
                        Err(e) => return Err(e.into()),
                    }
                },
                _ = scope.cancelled() => break,
            };

            let io = TokioIo::new(stream);
            let conn = builder.serve_connection(io, svc.clone());
            let fut = graceful.watch(conn.into_owned());

            tokio::spawn(async move {
                if let Err(e) = fut.await {
                    error!("error serving dispatch connection: {:?}", e);
                }
            });
        }

        graceful.shutdown().await;

        Ok(())
    }
}
