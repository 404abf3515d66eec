//! Audit trail of wrapper invocations.
//!
//! Each invocation appends one pretty-printed JSON record to a shared log
//! file. Many wrapper processes write the same file concurrently, so every
//! record goes out in a single `write` on an `O_APPEND` descriptor.

use k8s_openapi::api::core::v1::Pod;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use tracing::error;

use crate::error::{Result, WrapperError};

/// Everything observed during one invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Environment handed to the delegate
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    /// Network configuration read from stdin
    #[serde(rename = "input", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    /// Result printed by the delegate
    #[serde(rename = "output", default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Pod fetched while enriching an ADD
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod: Option<Pod>,
}

impl TransactionRecord {
    pub fn push_error(&mut self, err: impl ToString) {
        self.errors.push(err.to_string());
    }
}

/// Appends records to the audit log
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    path: PathBuf,
}

impl AuditRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` followed by a newline
    pub fn record(&self, record: &TransactionRecord) -> Result<()> {
        let log_error = |source: std::io::Error| WrapperError::LogWrite {
            path: self.path.display().to_string(),
            source,
        };

        let mut buf = serde_json::to_vec_pretty(record)
            .map_err(|err| log_error(std::io::Error::other(err)))?;
        buf.push(b'\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .mode(0o644)
            .open(&self.path)
            .map_err(log_error)?;

        file.write_all(&buf).map_err(log_error)
    }
}

/// Holds the record of the running invocation and writes it exactly once,
/// on [`AuditScope::finish`] or, failing that, when dropped.
pub struct AuditScope {
    recorder: AuditRecorder,
    record: Option<TransactionRecord>,
}

impl AuditScope {
    pub fn new(recorder: AuditRecorder) -> Self {
        Self {
            recorder,
            record: Some(TransactionRecord::default()),
        }
    }

    pub fn record_mut(&mut self) -> &mut TransactionRecord {
        self.record.get_or_insert_with(TransactionRecord::default)
    }

    /// Write the record, reporting failures to the caller
    pub fn finish(mut self) -> Result<()> {
        match self.record.take() {
            Some(record) => self.recorder.record(&record),
            None => Ok(()),
        }
    }
}

impl Drop for AuditScope {
    fn drop(&mut self) {
        if let Some(mut record) = self.record.take() {
            record.push_error("wrapper exited abnormally");
            if let Err(err) = self.recorder.record(&record) {
                error!("{}", err);
            }
        }
    }
}

/// Read every record back from an audit log
pub fn read_records(path: &Path) -> anyhow::Result<Vec<TransactionRecord>> {
    let file = File::open(path)?;
    let records = serde_json::Deserializer::from_reader(BufReader::new(file))
        .into_iter::<TransactionRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_fields_are_omitted() {
        let json = serde_json::to_value(TransactionRecord::default()).unwrap();
        assert_eq!(json, serde_json::json!({}));
    }

    #[test]
    fn appends_records() {
        let dir = TempDir::new().unwrap();
        let recorder = AuditRecorder::new(dir.path().join("wrapper.log"));

        let mut first = TransactionRecord::default();
        first.push_error("boom");
        recorder.record(&first).unwrap();
        recorder.record(&TransactionRecord::default()).unwrap();

        let contents = std::fs::read_to_string(recorder.path()).unwrap();
        assert!(contents.starts_with("{\n  \"errors\": [\n    \"boom\"\n  ]\n}\n"));
        assert!(contents.ends_with("{}\n"));

        let records = read_records(recorder.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].errors, vec!["boom".to_string()]);
    }

    #[test]
    fn unopenable_log_is_a_log_write_error() {
        let recorder = AuditRecorder::new("/nonexistent/dir/wrapper.log");
        let err = recorder.record(&TransactionRecord::default()).unwrap_err();
        assert!(matches!(err, WrapperError::LogWrite { .. }));
    }

    #[test]
    fn scope_writes_once_on_finish() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrapper.log");

        let mut scope = AuditScope::new(AuditRecorder::new(&path));
        scope.record_mut().push_error("lookup failed");
        scope.finish().unwrap();

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].errors, vec!["lookup failed".to_string()]);
    }

    #[test]
    fn scope_writes_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wrapper.log");

        {
            let mut scope = AuditScope::new(AuditRecorder::new(&path));
            scope.record_mut().input = Some(serde_json::json!({"name": "net"}));
        }

        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].errors, vec!["wrapper exited abnormally".to_string()]);
    }
}
