use crate::config::PipelineConfig;
use crate::constants::{EXTRACT_STAGE, LOAD_STAGE, TRANSFORM_STAGE, VALIDATE_STAGE};
use crate::db::{PurchaseStore, SqlitePurchaseStore};
use crate::error::Result;
use crate::graph::PipelineGraph;
use crate::runner::{PipelineRun, Runner};
use crate::stages::{
    ExtractStage, LoadStage, RecordSource, SampleSource, TransformStage, ValidateStage,
};
use crate::storage::{CsvTarget, RecordTarget};
use crate::types::{DerivedPurchase, PurchaseRecord};
use std::sync::Arc;
use tracing::info;

/// The storage a four-stage run hands records through
pub struct EtlTargets {
    pub raw: Arc<dyn RecordTarget<PurchaseRecord>>,
    pub transformed: Arc<dyn RecordTarget<DerivedPurchase>>,
    pub store: Arc<dyn PurchaseStore>,
}

impl EtlTargets {
    /// CSV files and the SQLite database under the configured data directory
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            raw: Arc::new(CsvTarget::<PurchaseRecord>::new(config.raw_path())),
            transformed: Arc::new(CsvTarget::<DerivedPurchase>::new(config.transformed_path())),
            store: Arc::new(SqlitePurchaseStore::new(
                config.database_path(),
                &config.table_name,
            )?),
        })
    }
}

/// extract -> transform -> load -> validate
pub fn etl_graph(source: Arc<dyn RecordSource>, targets: &EtlTargets) -> Result<PipelineGraph> {
    let mut builder = PipelineGraph::builder();
    builder
        .add_stage(Arc::new(ExtractStage::new(source, targets.raw.clone())))
        .add_stage(Arc::new(TransformStage::new(
            targets.raw.clone(),
            targets.transformed.clone(),
        )))
        .add_stage(Arc::new(LoadStage::new(
            targets.transformed.clone(),
            targets.store.clone(),
        )))
        .add_stage(Arc::new(ValidateStage))
        .add_dependency(TRANSFORM_STAGE, EXTRACT_STAGE)
        .add_dependency(LOAD_STAGE, TRANSFORM_STAGE)
        .add_dependency(VALIDATE_STAGE, LOAD_STAGE);
    builder.build()
}

/// A configured ETL pipeline: graph plus the runner that executes it
pub struct EtlPipeline {
    config: PipelineConfig,
    targets: EtlTargets,
    graph: PipelineGraph,
}

impl EtlPipeline {
    pub fn new(config: PipelineConfig, source: Arc<dyn RecordSource>) -> Result<Self> {
        config.validate()?;
        let targets = EtlTargets::from_config(&config)?;
        let graph = etl_graph(source, &targets)?;
        Ok(Self {
            config,
            targets,
            graph,
        })
    }

    pub fn with_sample_data(config: PipelineConfig) -> Result<Self> {
        Self::new(config, Arc::new(SampleSource))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn graph(&self) -> &PipelineGraph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn PurchaseStore> {
        &self.targets.store
    }

    pub async fn run(&self) -> PipelineRun {
        info!(
            "{}: {} (data dir {})",
            self.config.name,
            self.config.description,
            self.config.data_dir.display()
        );
        // Each run gets its own snapshot of the configuration
        Runner::from_config(&self.config).run(&self.graph).await
    }
}
