use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// A single log entry, possibly spanning several physical lines
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Component that generated the log (e.g., "core-universal", "socket", "driver")
    pub component: String,
    /// Optional component ID (e.g., "manager-ufg-43w/eyes-ufg-oer/check-ufg-jdx")
    pub component_id: String,
    pub timestamp: DateTime<Utc>,
    /// Log level as written, without padding (e.g., "INFO", "WARN", "ERROR")
    pub level: String,
    pub message: String,
    /// The original, unaltered log text including continuation lines
    pub raw_logline: String,
    /// First JSON object or array embedded in the message
    pub payload: Option<Value>,
    /// Source line number in the original file (1-indexed)
    pub source_line_number: usize,
}

impl LogEntry {
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Follow a dotted path into the payload
    ///
    /// Numeric segments index into arrays, so `items.0.id` reads the `id` of
    /// the first element of `items`.
    pub fn payload_value(&self, path: &str) -> Option<&Value> {
        path.split('.')
            .try_fold(self.payload.as_ref()?, |value, segment| match value {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }
}
