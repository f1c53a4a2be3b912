// SPDX-License-Identifier: Apache-2.0

//! Maps flat log records into the OTLP export request shape.
//!
//! Records are grouped into one `ResourceLogs` per distinct
//! `(service.name, service.version)` tuple, keeping first-seen group order
//! and input order within each group. Reserved keys move into the
//! `LogRecord` skeleton; everything else becomes the record body. The
//! output is a pure function of the input, modulo `observedTimeUnixNano`.

use crate::exporters::otlp::model::{
    AnyValue, ArrayValue, ExportLogsServiceRequest, InstrumentationScope, KeyValue, KvListValue,
    LogRecord, Resource, ResourceLogs, ScopeLogs, SCHEMA_URL,
};
use crate::record::{keys, Record, Severity};
use crate::telemetry::FallbackSink;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SCOPE_NAME: &str = env!("CARGO_PKG_NAME");
pub const SCOPE_VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_SERVICE_NAME: &str = "unknown";
const DEFAULT_SERVICE_VERSION: &str = "0.0.0-unknown";

pub fn transform(records: &[Record], sink: &dyn FallbackSink) -> ExportLogsServiceRequest {
    let mut groups: Vec<((String, String), Vec<LogRecord>)> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();

    for record in records {
        let mut map = record.clone().into_inner();

        let service_name = take_string(&mut map, keys::SERVICE_NAME)
            .unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string());
        let service_version = take_string(&mut map, keys::SERVICE_VERSION)
            .unwrap_or_else(|| DEFAULT_SERVICE_VERSION.to_string());

        let log_record = map_record(map, sink);

        let key = (service_name, service_version);
        match index.get(&key) {
            Some(&at) => groups[at].1.push(log_record),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![log_record]));
            }
        }
    }

    ExportLogsServiceRequest {
        resource_logs: groups
            .into_iter()
            .map(|((name, version), log_records)| ResourceLogs {
                resource: Resource {
                    attributes: vec![
                        KeyValue {
                            key: keys::SERVICE_NAME.to_string(),
                            value: AnyValue::String(name),
                        },
                        KeyValue {
                            key: keys::SERVICE_VERSION.to_string(),
                            value: AnyValue::String(version),
                        },
                    ],
                    dropped_attributes_count: 0,
                },
                scope_logs: vec![ScopeLogs {
                    scope: InstrumentationScope {
                        name: SCOPE_NAME.to_string(),
                        version: SCOPE_VERSION.to_string(),
                    },
                    log_records,
                    schema_url: SCHEMA_URL.to_string(),
                }],
                schema_url: SCHEMA_URL.to_string(),
            })
            .collect(),
    }
}

fn map_record(mut map: Map<String, Value>, sink: &dyn FallbackSink) -> LogRecord {
    let mut dropped = 0u32;

    let time_unix_nano = take_u64(&mut map, keys::TIME_UNIX_NANO);
    let trace_id = take_string(&mut map, keys::TRACE_ID);
    let span_id = take_string(&mut map, keys::SPAN_ID);

    let text_value = map.remove(keys::SEVERITY_TEXT);
    let number_value = map.remove(keys::SEVERITY_NUMBER);
    let text = text_value
        .as_ref()
        .and_then(Value::as_str)
        .and_then(Severity::from_text);
    let number = number_value
        .as_ref()
        .and_then(Value::as_u64)
        .and_then(Severity::from_number);
    let severity = match (&text_value, &number_value) {
        (Some(tv), Some(nv)) => match (text, number) {
            (Some(t), Some(n)) if t == n => Some(t),
            _ => {
                drop_attribute(sink, &mut dropped, keys::SEVERITY_TEXT, tv);
                drop_attribute(sink, &mut dropped, keys::SEVERITY_NUMBER, nv);
                None
            }
        },
        // A lone severity key is a valid record with no severity.
        _ => None,
    };

    let mut body_values = Vec::with_capacity(map.len());
    for (key, value) in map {
        if let Some(converted) = convert_value(&key, value, &mut dropped, sink) {
            body_values.push(KeyValue {
                key,
                value: converted,
            });
        }
    }
    let body = (!body_values.is_empty()).then(|| {
        AnyValue::KvList(KvListValue {
            values: body_values,
        })
    });

    LogRecord {
        time_unix_nano,
        observed_time_unix_nano: Some(now_unix_nanos()),
        severity_number: severity.map(|s| s.number() as u32),
        severity_text: severity.map(|s| s.text().to_string()),
        body,
        attributes: vec![],
        dropped_attributes_count: dropped,
        trace_id,
        span_id,
    }
}

fn convert_value(
    key: &str,
    value: Value,
    dropped: &mut u32,
    sink: &dyn FallbackSink,
) -> Option<AnyValue> {
    match value {
        Value::String(s) => Some(AnyValue::String(s)),
        Value::Bool(b) => Some(AnyValue::Bool(b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(AnyValue::Int(i))
            } else if let Some(f) = n.as_f64() {
                Some(AnyValue::Double(f))
            } else {
                drop_attribute(sink, dropped, key, &Value::Number(n));
                None
            }
        }
        Value::Array(items) => Some(AnyValue::Array(ArrayValue {
            values: items
                .into_iter()
                .filter_map(|item| convert_value(key, item, dropped, sink))
                .collect(),
        })),
        Value::Object(entries) => {
            let mut values = Vec::with_capacity(entries.len());
            for (k, v) in entries {
                if let Some(converted) = convert_value(&k, v, dropped, sink) {
                    values.push(KeyValue {
                        key: k,
                        value: converted,
                    });
                }
            }
            Some(AnyValue::KvList(KvListValue { values }))
        }
        other => {
            drop_attribute(sink, dropped, key, &other);
            None
        }
    }
}

fn drop_attribute(sink: &dyn FallbackSink, dropped: &mut u32, key: &str, value: &Value) {
    *dropped += 1;
    sink.warn(&format!(
        "dropping unsupported attribute {}={}",
        key, value
    ));
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.get(key) {
        Some(Value::String(_)) => match map.remove(key) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        },
        // Wrong-typed reserved keys stay in the body.
        _ => None,
    }
}

fn take_u64(map: &mut Map<String, Value>, key: &str) -> Option<u64> {
    match map.get(key).and_then(Value::as_u64) {
        Some(v) => {
            map.remove(key);
            Some(v)
        }
        None => None,
    }
}

fn now_unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
