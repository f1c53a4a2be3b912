// SPDX-License-Identifier: Apache-2.0

//! OTLP logs export over HTTP/JSON.
//!
//! # Modules
//!
//! - `model`: the OTLP logs wire model as serialized on the JSON transport
//! - `transformer`: flat records -> `ExportLogsServiceRequest`
//! - `client`: the hyper-backed collector client
//! - `exporter`: the batching export loop
//! - `errors`: error types specific to export operations

pub mod exporter;
pub mod model;
pub mod transformer;

pub(crate) mod errors;

mod client;

pub use exporter::{build_logs_exporter, ExporterConfig, LogsExporter};

/// Default collector path for OTLP/HTTP logs.
pub const DEFAULT_LOGS_PATH: &str = "/v1/logs";
