//! Telemetry records
//!
//! One [`SessionReport`] is emitted per ended session and one [`ErrorReport`]
//! per classified error. Both travel inside a [`TelemetryEnvelope`] to a
//! [`TelemetrySink`]; transport is the sink's business.

use crate::classify::ErrorRecord;
use crate::recovery::RecoveryAction;
use crate::types::{SessionId, Stage, SubStage};
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Flat per-session record with a free-form side channel
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub fields: Map<String, Value>,
    pub extra: Map<String, Value>,
}

impl SessionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn insert_extra(&mut self, key: &str, value: impl Into<Value>) {
        self.extra.insert(key.to_string(), value.into());
    }

    /// Merge the top-level fields of a serializable struct
    pub fn merge<T: Serialize>(&mut self, value: &T) -> Result<()> {
        match serde_json::to_value(value)? {
            Value::Object(map) => self.fields.extend(map),
            other => debug!(value = %other, "Ignoring non-object report section"),
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// One classified error and what was done about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error: ErrorRecord,
    pub stage: Stage,
    pub sub_stage: SubStage,
    pub action: RecoveryAction,
    pub rule: Option<String>,
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Session(SessionReport),
    Error(ErrorReport),
}

/// Telemetry record with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEnvelope {
    /// Unique record ID
    pub id: Uuid,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    /// Sequence number, increasing per manager
    pub sequence: u64,
    #[serde(flatten)]
    pub record: TelemetryRecord,
}

/// Telemetry destination
pub trait TelemetrySink: Send {
    fn record(&mut self, envelope: TelemetryEnvelope);
}

/// Sink that keeps every envelope; clones share the buffer
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<TelemetryEnvelope>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<TelemetryEnvelope> {
        self.records.lock().clone()
    }

    pub fn session_reports(&self) -> Vec<SessionReport> {
        self.records
            .lock()
            .iter()
            .filter_map(|e| match &e.record {
                TelemetryRecord::Session(report) => Some(report.clone()),
                TelemetryRecord::Error(_) => None,
            })
            .collect()
    }

    pub fn error_reports(&self) -> Vec<ErrorReport> {
        self.records
            .lock()
            .iter()
            .filter_map(|e| match &e.record {
                TelemetryRecord::Error(report) => Some(report.clone()),
                TelemetryRecord::Session(_) => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl TelemetrySink for MemorySink {
    fn record(&mut self, envelope: TelemetryEnvelope) {
        self.records.lock().push(envelope);
    }
}

/// Sink that writes each envelope to the tracing log
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record(&mut self, envelope: TelemetryEnvelope) {
        match serde_json::to_string(&envelope) {
            Ok(json) => info!(target: "kino_qos::telemetry", sequence = envelope.sequence, "{json}"),
            Err(e) => debug!(error = %e, "Telemetry envelope not serializable"),
        }
    }
}

/// Wraps records into envelopes and hands them to the sink
pub struct TelemetryEmitter {
    sequence: u64,
    sink: Box<dyn TelemetrySink>,
}

impl TelemetryEmitter {
    pub fn new(sink: Box<dyn TelemetrySink>) -> Self {
        Self { sequence: 0, sink }
    }

    pub fn emit(&mut self, session_id: SessionId, record: TelemetryRecord) {
        self.sequence += 1;
        let envelope = TelemetryEnvelope {
            id: Uuid::new_v4(),
            session_id,
            timestamp: Utc::now(),
            sequence: self.sequence,
            record,
        };
        debug!(record_id = %envelope.id, sequence = envelope.sequence, "Telemetry record");
        self.sink.record(envelope);
    }
}

impl std::fmt::Debug for TelemetryEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEmitter")
            .field("sequence", &self.sequence)
            .finish()
    }
}
