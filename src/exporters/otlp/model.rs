// SPDX-License-Identifier: Apache-2.0

//! The OTLP logs wire model, as encoded on the JSON transport.
//!
//! Field names follow the OTLP/JSON mapping (camelCase, absent fields
//! omitted). `AnyValue` is externally tagged, which yields the exact
//! `{"stringValue": ...}` discriminated-object shape on the wire.

use serde::{Deserialize, Serialize};

pub const SCHEMA_URL: &str = "https://opentelemetry.io/schemas/1.30.0";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsServiceRequest {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub resource_logs: Vec<ResourceLogs>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLogs {
    pub resource: Resource,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scope_logs: Vec<ScopeLogs>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeLogs {
    pub scope: InstrumentationScope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_records: Vec<LogRecord>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub schema_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstrumentationScope {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_unix_nano: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_time_unix_nano: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<AnyValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attributes: Vec<KeyValue>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub dropped_attributes_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,
    pub value: AnyValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnyValue {
    #[serde(rename = "stringValue")]
    String(String),
    #[serde(rename = "boolValue")]
    Bool(bool),
    #[serde(rename = "intValue")]
    Int(i64),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "arrayValue")]
    Array(ArrayValue),
    #[serde(rename = "kvlistValue")]
    KvList(KvListValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<AnyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KvListValue {
    #[serde(default)]
    pub values: Vec<KeyValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsServiceResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_success: Option<ExportLogsPartialSuccess>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportLogsPartialSuccess {
    #[serde(default)]
    pub rejected_logs_records: u64,
    #[serde(default)]
    pub error_message: String,
}

fn is_zero(count: &u32) -> bool {
    *count == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn any_value_wire_shapes() {
        assert_eq!(
            serde_json::to_value(AnyValue::String("hi".into())).unwrap(),
            json!({"stringValue": "hi"})
        );
        assert_eq!(
            serde_json::to_value(AnyValue::Bool(true)).unwrap(),
            json!({"boolValue": true})
        );
        assert_eq!(
            serde_json::to_value(AnyValue::Int(42)).unwrap(),
            json!({"intValue": 42})
        );
        assert_eq!(
            serde_json::to_value(AnyValue::Double(1.5)).unwrap(),
            json!({"doubleValue": 1.5})
        );
        assert_eq!(
            serde_json::to_value(AnyValue::Array(ArrayValue {
                values: vec![AnyValue::Int(1), AnyValue::Int(2)],
            }))
            .unwrap(),
            json!({"arrayValue": {"values": [{"intValue": 1}, {"intValue": 2}]}})
        );
        assert_eq!(
            serde_json::to_value(AnyValue::KvList(KvListValue {
                values: vec![KeyValue {
                    key: "k".into(),
                    value: AnyValue::String("v".into()),
                }],
            }))
            .unwrap(),
            json!({"kvlistValue": {"values": [{"key": "k", "value": {"stringValue": "v"}}]}})
        );
    }

    #[test]
    fn log_record_omits_absent_fields() {
        let record = LogRecord {
            severity_number: Some(13),
            severity_text: Some("warn".into()),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({"severityNumber": 13, "severityText": "warn"})
        );
    }

    #[test]
    fn request_round_trips_through_json() {
        let request = ExportLogsServiceRequest {
            resource_logs: vec![ResourceLogs {
                resource: Resource {
                    attributes: vec![KeyValue {
                        key: "service.name".into(),
                        value: AnyValue::String("archiver".into()),
                    }],
                    dropped_attributes_count: 0,
                },
                scope_logs: vec![ScopeLogs {
                    scope: InstrumentationScope {
                        name: "logship".into(),
                        version: "0.1.0".into(),
                    },
                    log_records: vec![LogRecord {
                        time_unix_nano: Some(1_700_000_000_000_000_000),
                        severity_number: Some(21),
                        severity_text: Some("fatal".into()),
                        body: Some(AnyValue::KvList(KvListValue {
                            values: vec![KeyValue {
                                key: "message".into(),
                                value: AnyValue::String("boom".into()),
                            }],
                        })),
                        ..Default::default()
                    }],
                    schema_url: SCHEMA_URL.into(),
                }],
                schema_url: SCHEMA_URL.into(),
            }],
        };

        let text = serde_json::to_string(&request).unwrap();
        let back: ExportLogsServiceRequest = serde_json::from_str(&text).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn partial_success_response_decodes() {
        let response: ExportLogsServiceResponse = serde_json::from_value(json!({
            "partialSuccess": {"rejectedLogsRecords": 2, "errorMessage": "bad records"}
        }))
        .unwrap();

        let partial = response.partial_success.unwrap();
        assert_eq!(partial.rejected_logs_records, 2);
        assert_eq!(partial.error_message, "bad records");
    }

    #[test]
    fn empty_response_decodes() {
        let response: ExportLogsServiceResponse = serde_json::from_str("{}").unwrap();
        assert!(response.partial_success.is_none());
    }
}
