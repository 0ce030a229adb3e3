use super::source::RecordSource;
use crate::constants::{EXTRACTED_COUNT_KEY, EXTRACT_STAGE};
use crate::error::Result;
use crate::stage::{Stage, StageContext, StageOutcome};
use crate::storage::RecordTarget;
use crate::types::PurchaseRecord;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument};

/// Pulls a fresh batch from the source and replaces the raw target with it
pub struct ExtractStage {
    source: Arc<dyn RecordSource>,
    raw: Arc<dyn RecordTarget<PurchaseRecord>>,
}

impl ExtractStage {
    pub fn new(source: Arc<dyn RecordSource>, raw: Arc<dyn RecordTarget<PurchaseRecord>>) -> Self {
        Self { source, raw }
    }
}

#[async_trait]
impl Stage for ExtractStage {
    fn stage_id(&self) -> &str {
        EXTRACT_STAGE
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutcome> {
        info!("📥 Starting data extraction from {}", self.source.describe());

        let records = self.source.fetch()?;
        let written = self.raw.write_all(&records)? as u64;

        info!("✅ Extracted {} records to {}", written, self.raw.describe());
        ctx.bus.publish_count(EXTRACT_STAGE, EXTRACTED_COUNT_KEY, written)?;

        Ok(StageOutcome::processed(
            written,
            format!("extracted {} records to {}", written, self.raw.describe()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataBus;
    use crate::stages::source::SampleSource;
    use crate::storage::{CsvTarget, InMemoryTarget};
    use tempfile::tempdir;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_extract_writes_samples_and_publishes_count() {
        let raw = Arc::new(InMemoryTarget::<PurchaseRecord>::new("raw"));
        let stage = ExtractStage::new(Arc::new(SampleSource), raw.clone());
        let ctx = StageContext::new(Arc::new(MetadataBus::new(Uuid::new_v4())));

        let outcome = stage.execute(&ctx).await.unwrap();
        assert_eq!(outcome.records, Some(5));
        assert_eq!(raw.read_all().unwrap().len(), 5);
        assert_eq!(ctx.bus.read_count(EXTRACT_STAGE, EXTRACTED_COUNT_KEY).unwrap(), 5);
    }

    #[tokio::test]
    async fn test_extract_creates_missing_data_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does/not/exist/raw_data.csv");
        let raw = Arc::new(CsvTarget::<PurchaseRecord>::new(path.clone()));
        let stage = ExtractStage::new(Arc::new(SampleSource), raw);
        let ctx = StageContext::new(Arc::new(MetadataBus::new(Uuid::new_v4())));

        stage.execute(&ctx).await.unwrap();
        assert!(path.exists());
    }
}
