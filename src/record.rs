// SPDX-License-Identifier: Apache-2.0

//! Structured log records and the error attribute model.
//!
//! A [`Record`] is an ordered mapping from string keys to JSON values. A
//! small set of reserved keys carries OTLP semantics (see [`keys`]); every
//! other key ends up in the exported record body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Reserved record keys. Records may carry any other key freely.
pub mod keys {
    pub const MESSAGE: &str = "message";
    pub const TRACE_ID: &str = "traceId";
    pub const SPAN_ID: &str = "spanId";
    pub const SEVERITY_TEXT: &str = "severityText";
    pub const SEVERITY_NUMBER: &str = "severityNumber";
    pub const TIME_UNIX_NANO: &str = "timeUnixNano";
    pub const SERVICE_NAME: &str = "service.name";
    pub const SERVICE_VERSION: &str = "service.version";
    pub const ERROR: &str = "error";
}

/// The closed severity set. Text and number are two views of the same value
/// and must agree when a record carries both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Warn,
    Fatal,
}

impl Severity {
    pub fn text(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Warn => "warn",
            Severity::Fatal => "fatal",
        }
    }

    pub fn number(self) -> u64 {
        match self {
            Severity::Debug => 5,
            Severity::Warn => 13,
            Severity::Fatal => 21,
        }
    }

    pub fn from_text(text: &str) -> Option<Self> {
        match text {
            "debug" => Some(Severity::Debug),
            "warn" => Some(Severity::Warn),
            "fatal" => Some(Severity::Fatal),
            _ => None,
        }
    }

    pub fn from_number(number: u64) -> Option<Self> {
        match number {
            5 => Some(Severity::Debug),
            13 => Some(Severity::Warn),
            21 => Some(Severity::Fatal),
            _ => None,
        }
    }
}

/// One structured log record. Insertion order is preserved end to end, all
/// the way into the exported body kvlist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fluent insert, for building records at call sites.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn with_severity(self, severity: Severity) -> Self {
        self.with(keys::SEVERITY_TEXT, severity.text())
            .with(keys::SEVERITY_NUMBER, severity.number())
    }

    pub fn with_error(self, error: ErrorDetail) -> Self {
        let value = serde_json::to_value(error).unwrap_or(Value::Null);
        self.with(keys::ERROR, value)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Map<String, Value> {
        self.0
    }

    /// The record's severity, when both reserved keys are present and agree.
    /// A record carrying only one of the two, or a disagreeing pair, has no
    /// severity.
    pub fn severity(&self) -> Option<Severity> {
        let text = self
            .0
            .get(keys::SEVERITY_TEXT)
            .and_then(Value::as_str)
            .and_then(Severity::from_text)?;
        let number = self
            .0
            .get(keys::SEVERITY_NUMBER)
            .and_then(Value::as_u64)
            .and_then(Severity::from_number)?;
        (text == number).then_some(text)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// A structured error carried as a record attribute under the `error` key.
///
/// `bug` distinguishes programmer-invariant violations from expected
/// failures; only bug-class errors may abort the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorDetail>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bug: bool,
}

impl ErrorDetail {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            context: None,
            cause: None,
            bug: false,
        }
    }

    /// Build from a std error, folding its source chain into nested causes.
    pub fn from_error(name: impl Into<String>, error: &(dyn std::error::Error + 'static)) -> Self {
        let mut detail = Self::new(name, error.to_string());
        if let Some(source) = error.source() {
            detail.cause = Some(Box::new(Self::from_error("cause", source)));
        }
        detail
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_cause(mut self, cause: ErrorDetail) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn bug(mut self) -> Self {
        self.bug = true;
        self
    }
}
