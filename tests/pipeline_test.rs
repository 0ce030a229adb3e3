use anyhow::Result;
use etl_pipeline::constants::{
    EXTRACTED_COUNT_KEY, EXTRACT_STAGE, LOADED_COUNT_KEY, LOAD_STAGE, TRANSFORMED_COUNT_KEY,
    TRANSFORM_STAGE, VALIDATE_STAGE,
};
use etl_pipeline::db::PurchaseStore;
use etl_pipeline::stages::CsvFileSource;
use etl_pipeline::storage::{CsvTarget, RecordTarget};
use etl_pipeline::types::{DerivedPurchase, PurchaseCategory};
use etl_pipeline::{EtlPipeline, PipelineConfig, RetryPolicy, RunState, StageStatus};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tempfile::tempdir;

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig {
        data_dir: dir.to_path_buf(),
        retry: RetryPolicy::no_retries(),
        ..PipelineConfig::default()
    }
}

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

#[tokio::test]
async fn test_sample_run_loads_and_validates() -> Result<()> {
    let dir = tempdir()?;
    let config = config_in(dir.path());
    let pipeline = EtlPipeline::with_sample_data(config.clone())?;

    let run = pipeline.run().await;
    assert_eq!(run.state, RunState::Validated, "{:?}", run.failure_summary());
    for id in [EXTRACT_STAGE, TRANSFORM_STAGE, LOAD_STAGE, VALIDATE_STAGE] {
        let report = run.stage(id).unwrap();
        assert_eq!(report.status, StageStatus::Succeeded);
        assert_eq!(report.attempts, 1);
    }
    for key in [EXTRACTED_COUNT_KEY, TRANSFORMED_COUNT_KEY, LOADED_COUNT_KEY] {
        assert_eq!(run.metadata[key].value, serde_json::json!(5));
    }

    assert!(config.raw_path().exists());
    let transformed = CsvTarget::<DerivedPurchase>::new(config.transformed_path()).read_all()?;
    assert_eq!(transformed.len(), 5);

    let rows = pipeline.store().fetch_all()?;
    assert_eq!(pipeline.store().count()?, 5);
    let categories: Vec<PurchaseCategory> = rows.iter().map(|r| r.purchase_category).collect();
    assert_eq!(
        categories,
        vec![
            PurchaseCategory::Medium,
            PurchaseCategory::Medium,
            PurchaseCategory::Low,
            PurchaseCategory::High,
            PurchaseCategory::Medium,
        ]
    );

    let first = &rows[0];
    assert_eq!(first.customer_name, "John Doe");
    assert_eq!(first.tax_amount, dec("15.05"));
    assert_eq!(first.total_amount, dec("165.55"));
    assert_eq!((first.month, first.year), (1, 2024));
    Ok(())
}

#[tokio::test]
async fn test_rerun_replaces_rather_than_appends() -> Result<()> {
    let dir = tempdir()?;
    let pipeline = EtlPipeline::with_sample_data(config_in(dir.path()))?;

    let first = pipeline.run().await;
    assert!(first.is_validated());
    let rows_after_first = pipeline.store().fetch_all()?;

    let second = pipeline.run().await;
    assert!(second.is_validated());
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(pipeline.store().count()?, 5);
    assert_eq!(pipeline.store().fetch_all()?, rows_after_first);
    Ok(())
}

#[tokio::test]
async fn test_csv_source_counts_are_preserved() -> Result<()> {
    let dir = tempdir()?;
    let source_path = dir.path().join("input.csv");
    std::fs::write(
        &source_path,
        "customer_id,customer_name,purchase_amount,purchase_date,region\n\
         10,Dana Lee,200.00,2023-12-31,South\n\
         11,Eli Park,200.01,2024-02-29,East\n\
         12,Fay Moss,100.00,2024-03-15,West\n\
         13,Gus Hall,100.01,2024-07-04,North\n",
    )?;

    let pipeline = EtlPipeline::new(
        config_in(&dir.path().join("data")),
        Arc::new(CsvFileSource::new(&source_path)),
    )?;
    let run = pipeline.run().await;
    assert!(run.is_validated(), "{:?}", run.failure_summary());
    assert_eq!(run.stage(LOAD_STAGE).unwrap().records, Some(4));

    let categories: Vec<_> = pipeline
        .store()
        .fetch_all()?
        .into_iter()
        .map(|r| (r.customer_id, r.purchase_category))
        .collect();
    assert_eq!(
        categories,
        vec![
            (10, PurchaseCategory::Medium),
            (11, PurchaseCategory::High),
            (12, PurchaseCategory::Low),
            (13, PurchaseCategory::Medium),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_bad_date_fails_transform_and_skips_downstream() -> Result<()> {
    let dir = tempdir()?;
    let source_path = dir.path().join("input.csv");
    std::fs::write(
        &source_path,
        "customer_id,customer_name,purchase_amount,purchase_date,region\n\
         1,John Doe,150.50,2024-01-01,North\n\
         2,Jane Smith,200.00,01/02/2024,South\n",
    )?;
    let config = config_in(&dir.path().join("data"));

    let pipeline = EtlPipeline::new(config.clone(), Arc::new(CsvFileSource::new(&source_path)))?;
    let run = pipeline.run().await;

    assert_eq!(run.state, RunState::Failed);
    assert_eq!(run.stage(EXTRACT_STAGE).unwrap().status, StageStatus::Succeeded);
    let transform = run.stage(TRANSFORM_STAGE).unwrap();
    assert_eq!(transform.status, StageStatus::Failed);
    assert!(transform.error.as_deref().unwrap().contains("01/02/2024"));
    assert_eq!(run.stage(LOAD_STAGE).unwrap().status, StageStatus::Skipped);
    assert_eq!(run.stage(VALIDATE_STAGE).unwrap().status, StageStatus::Skipped);

    assert!(run.metadata.contains_key(EXTRACTED_COUNT_KEY));
    assert!(!run.metadata.contains_key(TRANSFORMED_COUNT_KEY));
    assert!(!config.transformed_path().exists());
    assert!(!config.database_path().exists());
    Ok(())
}

#[tokio::test]
async fn test_empty_source_leaves_headed_files() -> Result<()> {
    let dir = tempdir()?;
    let source_path = dir.path().join("input.csv");
    std::fs::write(
        &source_path,
        "customer_id,customer_name,purchase_amount,purchase_date,region\n",
    )?;
    let config = config_in(&dir.path().join("data"));

    let pipeline = EtlPipeline::new(config.clone(), Arc::new(CsvFileSource::new(&source_path)))?;
    let run = pipeline.run().await;
    assert!(run.is_validated(), "{:?}", run.failure_summary());
    assert_eq!(run.metadata[LOADED_COUNT_KEY].value, serde_json::json!(0));

    let transformed = std::fs::read_to_string(config.transformed_path())?;
    assert!(transformed.starts_with("customer_id,customer_name,purchase_amount"));
    assert!(transformed.trim_end().ends_with("purchase_category"));
    assert_eq!(pipeline.store().count()?, 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_source_file_fails_extract() -> Result<()> {
    let dir = tempdir()?;
    let pipeline = EtlPipeline::new(
        config_in(dir.path()),
        Arc::new(CsvFileSource::new(dir.path().join("nope.csv"))),
    )?;
    let run = pipeline.run().await;

    assert!(!run.is_validated());
    assert_eq!(run.failed_stages().len(), 1);
    assert_eq!(run.failed_stages()[0].stage_id, EXTRACT_STAGE);
    assert!(run.metadata.is_empty());
    Ok(())
}

#[test]
fn test_graph_layers_are_linear() -> Result<()> {
    let dir = tempdir()?;
    let pipeline = EtlPipeline::with_sample_data(config_in(dir.path()))?;
    assert_eq!(
        pipeline.graph().layers(),
        vec![
            vec![EXTRACT_STAGE],
            vec![TRANSFORM_STAGE],
            vec![LOAD_STAGE],
            vec![VALIDATE_STAGE],
        ]
    );
    assert_eq!(
        pipeline.graph().predecessors(VALIDATE_STAGE),
        Some(vec![LOAD_STAGE])
    );
    Ok(())
}
