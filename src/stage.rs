use crate::error::Result;
use crate::metadata::MetadataBus;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// Everything a stage is handed for one attempt: the run it belongs to and
/// that run's metadata bus.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: Uuid,
    pub bus: Arc<MetadataBus>,
}

impl StageContext {
    pub fn new(bus: Arc<MetadataBus>) -> Self {
        Self {
            run_id: bus.run_id(),
            bus,
        }
    }
}

/// What a successful stage reports back to the runner
#[derive(Debug, Clone, Serialize)]
pub struct StageOutcome {
    pub records: Option<u64>,
    pub message: String,
}

impl StageOutcome {
    pub fn processed(records: u64, message: impl Into<String>) -> Self {
        Self {
            records: Some(records),
            message: message.into(),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            records: None,
            message: message.into(),
        }
    }
}

/// A unit of pipeline work.
///
/// Implementations must be idempotent: the runner may call `execute` again
/// after a retryable failure, and a repeat must overwrite rather than add.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Identity used for graph wiring and as the owner of published metadata
    fn stage_id(&self) -> &str;

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutcome>;
}
