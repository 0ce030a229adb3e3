//! Per-run key/value store for facts one stage hands to a later one.
//!
//! Each key is written once per run by exactly one stage and read any number
//! of times. The bus lives only as long as the run that owns it.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct MetadataEntry {
    pub stage_id: String,
    pub value: Value,
    pub published_at: DateTime<Utc>,
}

/// Single coarse lock: concurrent stages publish different keys, so
/// contention is limited to the insert itself.
#[derive(Debug)]
pub struct MetadataBus {
    run_id: Uuid,
    entries: Mutex<HashMap<String, MetadataEntry>>,
}

impl MetadataBus {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, MetadataEntry>> {
        // A panicking stage can't leave an entry half-written, so the map is usable
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish `value` under `key` on behalf of `stage_id`.
    ///
    /// Fails if the key already exists in this run, whoever wrote it.
    pub fn publish(&self, stage_id: &str, key: &str, value: impl Into<Value>) -> Result<()> {
        let mut entries = self.entries();
        if let Some(existing) = entries.get(key) {
            return Err(PipelineError::MetadataAlreadyPublished {
                stage: stage_id.to_string(),
                key: key.to_string(),
                owner: existing.stage_id.clone(),
            });
        }
        let value = value.into();
        debug!(run_id = %self.run_id, stage = stage_id, key, %value, "metadata published");
        entries.insert(
            key.to_string(),
            MetadataEntry {
                stage_id: stage_id.to_string(),
                value,
                published_at: Utc::now(),
            },
        );
        Ok(())
    }

    pub fn publish_count(&self, stage_id: &str, key: &str, count: u64) -> Result<()> {
        self.publish(stage_id, key, count)
    }

    /// Read a key regardless of which stage wrote it.
    pub fn read(&self, key: &str) -> Option<MetadataEntry> {
        self.entries().get(key).cloned()
    }

    /// Read a record count that `stage_id` is expected to have published.
    ///
    /// A key written by a different stage is treated as missing.
    pub fn read_count(&self, stage_id: &str, key: &str) -> Result<u64> {
        let missing = || PipelineError::MetadataMissing {
            stage: stage_id.to_string(),
            key: key.to_string(),
        };
        let entry = self.read(key).ok_or_else(missing)?;
        if entry.stage_id != stage_id {
            return Err(missing());
        }
        entry.value.as_u64().ok_or_else(|| PipelineError::MetadataType {
            key: key.to_string(),
            found: entry.value.to_string(),
        })
    }

    /// Drop everything `stage_id` published, so a retried attempt can
    /// publish again. Returns the number of keys removed.
    pub fn discard_stage(&self, stage_id: &str) -> usize {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|_, entry| entry.stage_id != stage_id);
        before - entries.len()
    }

    pub fn snapshot(&self) -> BTreeMap<String, MetadataEntry> {
        self.entries()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
