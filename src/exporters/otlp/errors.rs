// SPDX-License-Identifier: Apache-2.0

use http::StatusCode;
use std::error::Error;
use std::fmt;
use tower::BoxError;

/// ExporterError is the result of exporting one batch of log records.
#[derive(Clone, Debug)]
pub enum ExporterError {
    /// Processing error
    Generic(String),

    /// Failed to reach the collector at all
    Connect,

    /// The request timed out
    Timeout,

    /// HTTP error resulting in invalid status code
    Http(StatusCode, Option<String>),
}

impl fmt::Display for ExporterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterError::Generic(msg) => write!(f, "Generic error: {}", msg),
            ExporterError::Connect => write!(f, "Failed to connect"),
            ExporterError::Timeout => write!(f, "Request timed out"),
            ExporterError::Http(status, resp) => match resp {
                None => write!(f, "HTTP error: {}", status),
                Some(text) => write!(f, "HTTP error: {}:{}", status, text),
            },
        }
    }
}

impl Error for ExporterError {}

/// Collapse a boxed service-stack error into an ExporterError. Timeouts
/// arrive as `tower::timeout::error::Elapsed` from the layer above the
/// client; everything unknown degrades to a generic transport failure.
pub fn simplify(err: BoxError) -> ExporterError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return ExporterError::Timeout;
    }
    match err.downcast::<ExporterError>() {
        Ok(e) => *e,
        Err(e) => ExporterError::Generic(e.to_string()),
    }
}
