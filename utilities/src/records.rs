use logship::record::{keys, Record, Severity};

/// Builders for fake log records used across integration tests.
pub struct FakeRecords;

impl FakeRecords {
    pub fn message(text: &str) -> Record {
        Record::new().with(keys::MESSAGE, text)
    }

    pub fn warn(text: &str) -> Record {
        Self::message(text).with_severity(Severity::Warn)
    }

    pub fn for_service(service: &str, version: &str, text: &str) -> Record {
        Self::message(text)
            .with(keys::SERVICE_NAME, service)
            .with(keys::SERVICE_VERSION, version)
    }

    pub fn batch_for_service(service: &str, version: &str, count: usize) -> Vec<Record> {
        (0..count)
            .map(|i| Self::for_service(service, version, &format!("record {i}")).with("seq", i))
            .collect()
    }
}
