use crate::constants::{
    EXTRACTED_COUNT_KEY, EXTRACT_STAGE, LOADED_COUNT_KEY, LOAD_STAGE, TRANSFORMED_COUNT_KEY,
    TRANSFORM_STAGE, VALIDATE_STAGE,
};
use crate::error::{PipelineError, Result};
use crate::metadata::MetadataBus;
use crate::stage::{Stage, StageContext, StageOutcome};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountSummary {
    pub extracted: u64,
    pub transformed: u64,
    pub loaded: u64,
}

impl CountSummary {
    pub fn read_from(bus: &MetadataBus) -> Result<Self> {
        Ok(Self {
            extracted: bus.read_count(EXTRACT_STAGE, EXTRACTED_COUNT_KEY)?,
            transformed: bus.read_count(TRANSFORM_STAGE, TRANSFORMED_COUNT_KEY)?,
            loaded: bus.read_count(LOAD_STAGE, LOADED_COUNT_KEY)?,
        })
    }

    /// Stages whose count differs from the stage feeding them
    pub fn diverging_stages(&self) -> Vec<String> {
        let mut out = Vec::new();
        if self.transformed != self.extracted {
            out.push(TRANSFORM_STAGE.to_string());
        }
        if self.loaded != self.transformed {
            out.push(LOAD_STAGE.to_string());
        }
        out
    }

    pub fn check(&self) -> Result<()> {
        let diverging = self.diverging_stages();
        if diverging.is_empty() {
            Ok(())
        } else {
            Err(PipelineError::CountMismatch {
                extracted: self.extracted,
                transformed: self.transformed,
                loaded: self.loaded,
                diverging,
            })
        }
    }
}

/// Cross-checks the counts published by extract, transform and load.
/// Reads metadata only.
#[derive(Debug, Default)]
pub struct ValidateStage;

#[async_trait]
impl Stage for ValidateStage {
    fn stage_id(&self) -> &str {
        VALIDATE_STAGE
    }

    #[instrument(skip(self, ctx), fields(run_id = %ctx.run_id))]
    async fn execute(&self, ctx: &StageContext) -> Result<StageOutcome> {
        info!("🔍 Validating pipeline execution");

        let counts = CountSummary::read_from(&ctx.bus)?;
        info!(
            "Pipeline summary: extracted={} transformed={} loaded={}",
            counts.extracted, counts.transformed, counts.loaded
        );

        if let Err(e) = counts.check() {
            error!("❌ Pipeline validation failed: {}", e);
            return Err(e);
        }

        info!("✅ Pipeline validation successful, all stages processed the same number of records");
        Ok(StageOutcome::message(format!(
            "validated {} records across extract, transform and load",
            counts.extracted
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use uuid::Uuid;

    fn ctx_with(counts: &[(&str, &str, u64)]) -> StageContext {
        let bus = Arc::new(MetadataBus::new(Uuid::new_v4()));
        for (stage, key, n) in counts {
            bus.publish_count(stage, key, *n).unwrap();
        }
        StageContext::new(bus)
    }

    #[tokio::test]
    async fn test_equal_counts_pass() {
        let ctx = ctx_with(&[
            (EXTRACT_STAGE, EXTRACTED_COUNT_KEY, 5),
            (TRANSFORM_STAGE, TRANSFORMED_COUNT_KEY, 5),
            (LOAD_STAGE, LOADED_COUNT_KEY, 5),
        ]);
        let outcome = ValidateStage.execute(&ctx).await.unwrap();
        assert!(outcome.message.contains("validated 5"));
    }

    #[tokio::test]
    async fn test_load_mismatch_is_named() {
        let ctx = ctx_with(&[
            (EXTRACT_STAGE, EXTRACTED_COUNT_KEY, 5),
            (TRANSFORM_STAGE, TRANSFORMED_COUNT_KEY, 5),
            (LOAD_STAGE, LOADED_COUNT_KEY, 4),
        ]);
        let err = ValidateStage.execute(&ctx).await.unwrap_err();
        match &err {
            PipelineError::CountMismatch {
                extracted,
                transformed,
                loaded,
                diverging,
            } => {
                assert_eq!((*extracted, *transformed, *loaded), (5, 5, 4));
                assert_eq!(diverging, &vec![LOAD_STAGE.to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_retryable());
        let msg = err.to_string();
        assert!(msg.contains("extracted=5"));
        assert!(msg.contains("loaded=4"));
    }

    #[tokio::test]
    async fn test_transform_loss_is_named() {
        let ctx = ctx_with(&[
            (EXTRACT_STAGE, EXTRACTED_COUNT_KEY, 5),
            (TRANSFORM_STAGE, TRANSFORMED_COUNT_KEY, 3),
            (LOAD_STAGE, LOADED_COUNT_KEY, 3),
        ]);
        match ValidateStage.execute(&ctx).await.unwrap_err() {
            PipelineError::CountMismatch { diverging, .. } => {
                assert_eq!(diverging, vec![TRANSFORM_STAGE.to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_each_stage_is_compared_with_its_feeder() {
        let counts = CountSummary {
            extracted: 5,
            transformed: 4,
            loaded: 5,
        };
        assert_eq!(
            counts.diverging_stages(),
            vec![TRANSFORM_STAGE.to_string(), LOAD_STAGE.to_string()]
        );
    }

    #[tokio::test]
    async fn test_missing_count_fails() {
        let ctx = ctx_with(&[
            (EXTRACT_STAGE, EXTRACTED_COUNT_KEY, 5),
            (TRANSFORM_STAGE, TRANSFORMED_COUNT_KEY, 5),
        ]);
        let err = ValidateStage.execute(&ctx).await.unwrap_err();
        match &err {
            PipelineError::MetadataMissing { stage, key } => {
                assert_eq!(stage, LOAD_STAGE);
                assert_eq!(key, LOADED_COUNT_KEY);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!err.is_retryable());
    }
}
