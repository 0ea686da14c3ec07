//! Append-only change journal.
//!
//! A [`NotificationSink`] implementation recording one JSON object per line
//! (NDJSON) for every changed entity. Each record carries an RFC3339
//! timestamp, the delta classification, and the entity's resolved
//! properties with obscured values redacted.

use crate::delta::{ConfigDelta, DeltaKind, DeltaReason};
use crate::engine::NotificationSink;
use crate::error::{ConfigError, Result};
use crate::evaluate::EvaluationResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Replacement text for obscured property values.
pub const OBSCURED_VALUE: &str = "*****";

/// One journal record.
#[derive(Debug, Clone, Serialize)]
pub struct ChangeRecord {
    /// RFC3339 timestamp when the change was journaled.
    pub ts: DateTime<Utc>,
    pub kind: DeltaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DeltaReason>,
    /// Display form of the entity's identity.
    pub config_id: String,
    /// Redacted resolved properties; absent for removals.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<JsonValue>,
}

impl ChangeRecord {
    fn new(delta: &ConfigDelta, snapshot: Option<&EvaluationResult>) -> Result<Self> {
        let properties = snapshot.map(redacted_properties).transpose()?;
        Ok(ChangeRecord {
            ts: Utc::now(),
            kind: delta.kind,
            reason: delta.reason,
            config_id: delta.config_id.to_string(),
            properties,
        })
    }

    /// Serialize the record to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ConfigError::Journal(e.to_string()))
    }
}

/// The entity's properties as JSON, with obscured values replaced by
/// [`OBSCURED_VALUE`].
fn redacted_properties(snapshot: &EvaluationResult) -> Result<JsonValue> {
    let mut map = serde_json::Map::new();
    for (name, value) in &snapshot.properties {
        let json = if snapshot.obscured.contains(name) {
            JsonValue::String(OBSCURED_VALUE.to_string())
        } else {
            serde_json::to_value(value).map_err(|e| ConfigError::Journal(e.to_string()))?
        };
        map.insert(name.clone(), json);
    }
    Ok(JsonValue::Object(map))
}

/// NDJSON change journal appending to one file.
pub struct ChangeJournal {
    path: PathBuf,
}

impl ChangeJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ChangeJournal { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &ChangeRecord) -> Result<()> {
        let line = record.to_ndjson_line()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                ConfigError::Journal(format!("failed to open '{}': {}", self.path.display(), e))
            })?;
        writeln!(file, "{line}").map_err(|e| {
            ConfigError::Journal(format!("failed to write '{}': {}", self.path.display(), e))
        })?;
        file.sync_all().map_err(|e| {
            ConfigError::Journal(format!("failed to sync '{}': {}", self.path.display(), e))
        })?;
        Ok(())
    }
}

impl NotificationSink for ChangeJournal {
    fn entity_updated(&mut self, delta: &ConfigDelta, snapshot: &EvaluationResult) -> Result<()> {
        self.append(&ChangeRecord::new(delta, Some(snapshot))?)
    }

    fn entity_removed(&mut self, delta: &ConfigDelta) -> Result<()> {
        self.append(&ChangeRecord::new(delta, None)?)
    }
}
