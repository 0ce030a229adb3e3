use crate::constants::{LOADED_COUNT_KEY, LOAD_STAGE};
use crate::db::PurchaseStore;
use crate::error::Result;
use crate::stage::{Stage, StageContext, StageOutcome};
use crate::storage::RecordTarget;
use crate::types::DerivedPurchase;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Replaces the store's table with the transformed records, then counts what
/// actually landed there.
pub struct LoadStage {
    transformed: Arc<dyn RecordTarget<DerivedPurchase>>,
    store: Arc<dyn PurchaseStore>,
}

impl LoadStage {
    pub fn new(
        transformed: Arc<dyn RecordTarget<DerivedPurchase>>,
        store: Arc<dyn PurchaseStore>,
    ) -> Self {
        Self { transformed, store }
    }
}

#[async_trait]
impl Stage for LoadStage {
    fn stage_id(&self) -> &str {
        LOAD_STAGE
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutcome> {
        info!("💾 Starting data loading into {}", self.store.describe());

        let records = self.transformed.read_all()?;
        let inserted = self.store.replace_all(&records)?;

        // The published count comes from the store, not from `inserted`
        let loaded = self.store.count()?;
        if loaded != inserted as u64 {
            warn!(
                "store reports {} rows after inserting {} into {}",
                loaded,
                inserted,
                self.store.describe()
            );
        }

        info!("✅ Loaded {} records into {}", loaded, self.store.describe());
        ctx.bus.publish_count(LOAD_STAGE, LOADED_COUNT_KEY, loaded)?;

        Ok(StageOutcome::processed(
            loaded,
            format!("loaded {} records into {}", loaded, self.store.describe()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::metadata::MetadataBus;
    use crate::stages::source::SampleSource;
    use crate::stages::transform::transform_records;
    use crate::storage::InMemoryTarget;
    use std::sync::Mutex;
    use uuid::Uuid;

    /// Keeps only the first `keep` rows, like a store that silently truncates
    struct LossyStore {
        keep: usize,
        rows: Mutex<Vec<DerivedPurchase>>,
    }

    impl PurchaseStore for LossyStore {
        fn replace_all(&self, records: &[DerivedPurchase]) -> Result<usize> {
            let mut rows = self.rows.lock().unwrap();
            *rows = records.iter().take(self.keep).cloned().collect();
            Ok(records.len())
        }

        fn count(&self) -> Result<u64> {
            Ok(self.rows.lock().unwrap().len() as u64)
        }

        fn fetch_all(&self) -> Result<Vec<DerivedPurchase>> {
            Ok(self.rows.lock().unwrap().clone())
        }

        fn describe(&self) -> String {
            "lossy".to_string()
        }
    }

    #[tokio::test]
    async fn test_loaded_count_is_read_back_from_store() {
        let derived = transform_records(&SampleSource::records()).unwrap();
        let transformed = Arc::new(InMemoryTarget::with_records("transformed", derived));
        let store = Arc::new(LossyStore {
            keep: 4,
            rows: Mutex::new(Vec::new()),
        });
        let stage = LoadStage::new(transformed, store);
        let ctx = StageContext::new(Arc::new(MetadataBus::new(Uuid::new_v4())));

        let outcome = stage.execute(&ctx).await.unwrap();
        assert_eq!(outcome.records, Some(4));
        assert_eq!(ctx.bus.read_count(LOAD_STAGE, LOADED_COUNT_KEY).unwrap(), 4);
    }

    #[tokio::test]
    async fn test_missing_transformed_target_is_retryable() {
        let transformed = Arc::new(InMemoryTarget::<DerivedPurchase>::new("transformed"));
        let store = Arc::new(LossyStore {
            keep: 10,
            rows: Mutex::new(Vec::new()),
        });
        let stage = LoadStage::new(transformed, store);
        let ctx = StageContext::new(Arc::new(MetadataBus::new(Uuid::new_v4())));

        let err: PipelineError = stage.execute(&ctx).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
