// SPDX-License-Identifier: Apache-2.0

//! OTLP/HTTP client: POSTs a JSON-encoded export request to the collector
//! and decodes the export response. Implemented as a `tower::Service` so
//! the exporter can stack a request timeout above it.

use crate::exporters::otlp::errors::ExporterError;
use crate::exporters::otlp::model::{ExportLogsServiceRequest, ExportLogsServiceResponse};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{BoxError, Service};

#[derive(Clone)]
pub struct OtlpClient {
    inner: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    endpoint: Uri,
}

impl OtlpClient {
    pub fn build(endpoint: Uri) -> Result<Self, BoxError> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()?
            .https_or_http()
            .enable_http1()
            .build();

        let inner = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(30))
            .timer(TokioTimer::new())
            .build::<_, Full<Bytes>>(https);

        Ok(Self { inner, endpoint })
    }

    async fn perform_request(
        &self,
        body: Bytes,
    ) -> Result<ExportLogsServiceResponse, ExporterError> {
        let req = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(Full::new(body))
            .map_err(|e| ExporterError::Generic(e.to_string()))?;

        let resp = match self.inner.request(req).await {
            Ok(resp) => resp,
            Err(e) if e.is_connect() => return Err(ExporterError::Connect),
            Err(e) => return Err(ExporterError::Generic(e.to_string())),
        };

        let (head, body) = resp.into_parts();
        let bytes = body
            .collect()
            .await
            .map_err(|e| ExporterError::Generic(format!("failed reading response: {}", e)))?
            .to_bytes();

        if !head.status.is_success() {
            let text =
                (!bytes.is_empty()).then(|| String::from_utf8_lossy(&bytes).into_owned());
            return Err(ExporterError::Http(head.status, text));
        }

        if bytes.is_empty() {
            return Ok(ExportLogsServiceResponse::default());
        }
        serde_json::from_slice(&bytes)
            .map_err(|e| ExporterError::Generic(format!("failed decoding response: {}", e)))
    }
}

impl Service<ExportLogsServiceRequest> for OtlpClient {
    type Response = ExportLogsServiceResponse;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: ExportLogsServiceRequest) -> Self::Future {
        let this = self.clone();

        Box::pin(async move {
            let body = serde_json::to_vec(&req)
                .map_err(|e| ExporterError::Generic(format!("failed encoding request: {}", e)))?;
            this.perform_request(Bytes::from(body))
                .await
                .map_err(Into::into)
        })
    }
}
