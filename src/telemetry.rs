//! Error records for the observability sink.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::error;

pub const SOURCE: &str = "swap-tx-builder";
pub const ENDPOINT: &str = "/api/swap";

const REDACTED_LEN: usize = 8;

/// Short prefix of an address; enough to correlate, not enough to identify.
pub fn redact(address: &str) -> String {
    address.chars().take(REDACTED_LEN).collect()
}

/// Single-line, quote-free version of an error message.
pub fn clean_error(message: &str) -> String {
    message.replace(['\n', '\r'], " ").replace('"', "'")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub severity: Severity,
    pub source: &'static str,
    pub endpoint: &'static str,
    pub operation: String,
    pub error: String,
    pub metadata: BTreeMap<String, String>,
}

impl ErrorReport {
    pub fn new(severity: Severity, operation: &str, error: &str) -> Self {
        Self {
            severity,
            source: SOURCE,
            endpoint: ENDPOINT,
            operation: operation.to_string(),
            error: clean_error(error),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Adds a redacted address under `key`, or `unknown` when absent.
    pub fn with_address(self, key: &str, address: Option<&str>) -> Self {
        let value = address.map(redact).unwrap_or_else(|| "unknown".to_string());
        self.with(key, value)
    }
}

/// Where failure records go. Implementations must not block or panic; the
/// pipeline never waits on them.
pub trait ErrorSink: Send + Sync {
    fn log_error(&self, report: &ErrorReport);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ErrorSink for NoopSink {
    fn log_error(&self, _report: &ErrorReport) {}
}

/// Forwards records as `tracing` events so any installed subscriber can ship them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn log_error(&self, report: &ErrorReport) {
        let metadata = serde_json::to_string(&report.metadata).unwrap_or_default();
        error!(
            target: "swap_tx_builder::sink",
            severity = ?report.severity,
            source = report.source,
            endpoint = report.endpoint,
            operation = %report.operation,
            error = %report.error,
            metadata = %metadata,
            "swap pipeline failure"
        );
    }
}
