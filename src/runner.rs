//! Executes a [`PipelineGraph`] layer by layer.
//!
//! Stages in one layer are spawned together; a stage runs only if every
//! predecessor succeeded, otherwise it is recorded as skipped. Retryable
//! failures are re-attempted per the [`RetryPolicy`]; anything else fails the
//! stage on the first attempt.

use crate::config::{PipelineConfig, RetryPolicy};
use crate::error::PipelineError;
use crate::graph::PipelineGraph;
use crate::metadata::{MetadataBus, MetadataEntry};
use crate::metrics;
use crate::stage::{Stage, StageContext};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub stage_id: String,
    pub status: StageStatus,
    pub attempts: u32,
    pub records: Option<u64>,
    pub message: String,
    pub error: Option<String>,
    pub retryable: Option<bool>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageReport {
    fn skipped(stage_id: &str, blocked_by: &[&str]) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            status: StageStatus::Skipped,
            attempts: 0,
            records: None,
            message: format!("skipped: upstream {} did not succeed", blocked_by.join(", ")),
            error: None,
            retryable: None,
            started_at: None,
            finished_at: None,
        }
    }

    fn failed(stage_id: &str, attempts: u32, err: &PipelineError, started_at: DateTime<Utc>) -> Self {
        Self {
            stage_id: stage_id.to_string(),
            status: StageStatus::Failed,
            attempts,
            records: None,
            message: format!("failed after {attempts} attempt(s)"),
            error: Some(err.to_string()),
            retryable: Some(err.is_retryable()),
            started_at: Some(started_at),
            finished_at: Some(Utc::now()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Every stage succeeded, including the final count check
    Validated,
    Failed,
}

/// One end-to-end execution of a graph
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub pipeline: String,
    pub retry: RetryPolicy,
    pub state: RunState,
    pub stages: Vec<StageReport>,
    /// What the run's metadata bus held when the run ended
    pub metadata: BTreeMap<String, MetadataEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PipelineRun {
    pub fn is_validated(&self) -> bool {
        self.state == RunState::Validated
    }

    pub fn stage(&self, stage_id: &str) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage_id == stage_id)
    }

    pub fn failed_stages(&self) -> Vec<&StageReport> {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Failed)
            .collect()
    }

    /// One line per failed stage, e.g. `load: Database error: ...`
    pub fn failure_summary(&self) -> Option<String> {
        let failed = self.failed_stages();
        if failed.is_empty() {
            return None;
        }
        Some(
            failed
                .iter()
                .map(|s| format!("{}: {}", s.stage_id, s.error.as_deref().unwrap_or("unknown error")))
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }
}

/// Runs graphs with a fixed retry policy
#[derive(Debug, Clone)]
pub struct Runner {
    pipeline: String,
    retry: RetryPolicy,
}

impl Runner {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            pipeline: crate::constants::PIPELINE_NAME.to_string(),
            retry,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            pipeline: config.name.clone(),
            retry: config.retry.clone(),
        }
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub async fn run(&self, graph: &PipelineGraph) -> PipelineRun {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let t0 = Instant::now();
        let bus = Arc::new(MetadataBus::new(run_id));
        info!(
            "🚀 Starting pipeline {} run {} ({} stages, max_retries={}, retry_delay={}s)",
            self.pipeline,
            run_id,
            graph.len(),
            self.retry.max_retries,
            self.retry.retry_delay_secs
        );

        let mut reports: Vec<Option<StageReport>> = vec![None; graph.len()];

        for layer in graph.layer_indices() {
            let mut handles = Vec::new();
            for &i in layer {
                let stage = graph.stage(i).clone();
                let blocked: Vec<&str> = graph
                    .predecessor_indices(i)
                    .iter()
                    .filter(|&&p| {
                        !matches!(&reports[p], Some(r) if r.status == StageStatus::Succeeded)
                    })
                    .map(|&p| graph.stage(p).stage_id())
                    .collect();

                if !blocked.is_empty() {
                    warn!("⏭️  Skipping stage {}: upstream {} did not succeed", stage.stage_id(), blocked.join(", "));
                    metrics::stage::skipped(stage.stage_id());
                    reports[i] = Some(StageReport::skipped(stage.stage_id(), &blocked));
                    continue;
                }

                let ctx = StageContext::new(bus.clone());
                let retry = self.retry.clone();
                handles.push((i, tokio::spawn(run_with_retry(stage, ctx, retry))));
            }

            for (i, handle) in handles {
                let report = match handle.await {
                    Ok(report) => report,
                    Err(join_err) => {
                        let stage_id = graph.stage(i).stage_id();
                        error!("❌ Stage {} task aborted: {}", stage_id, join_err);
                        bus.discard_stage(stage_id);
                        StageReport::failed(
                            stage_id,
                            1,
                            &PipelineError::Aborted(join_err.to_string()),
                            Utc::now(),
                        )
                    }
                };
                reports[i] = Some(report);
            }
        }

        // Every index belongs to exactly one layer, so every slot is filled
        let stages: Vec<StageReport> = graph
            .layer_indices()
            .iter()
            .flatten()
            .filter_map(|&i| reports[i].take())
            .collect();

        let state = if stages.iter().all(|s| s.status == StageStatus::Succeeded) {
            RunState::Validated
        } else {
            RunState::Failed
        };

        let run = PipelineRun {
            run_id,
            pipeline: self.pipeline.clone(),
            retry: self.retry.clone(),
            state,
            stages,
            metadata: bus.snapshot(),
            started_at,
            finished_at: Utc::now(),
        };

        let secs = t0.elapsed().as_secs_f64();
        metrics::run::finished(run.is_validated(), secs);
        match run.failure_summary() {
            None => info!("✅ Pipeline {} run {} validated in {:.2}s", run.pipeline, run_id, secs),
            Some(summary) => error!("❌ Pipeline {} run {} failed:\n{}", run.pipeline, run_id, summary),
        }
        run
    }
}

async fn run_with_retry(stage: Arc<dyn Stage>, ctx: StageContext, retry: RetryPolicy) -> StageReport {
    let stage_id = stage.stage_id().to_string();
    let started_at = Utc::now();
    let t0 = Instant::now();
    let max_attempts = retry.max_retries.saturating_add(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        metrics::stage::attempt(&stage_id);
        info!("▶️  Running stage {} (attempt {}/{})", stage_id, attempt, max_attempts);

        match stage.execute(&ctx).await {
            Ok(outcome) => {
                let secs = t0.elapsed().as_secs_f64();
                metrics::stage::duration(&stage_id, secs);
                if let Some(n) = outcome.records {
                    metrics::stage::records(&stage_id, n);
                }
                info!("✅ Stage {} succeeded: {}", stage_id, outcome.message);
                return StageReport {
                    stage_id,
                    status: StageStatus::Succeeded,
                    attempts: attempt,
                    records: outcome.records,
                    message: outcome.message,
                    error: None,
                    retryable: None,
                    started_at: Some(started_at),
                    finished_at: Some(Utc::now()),
                };
            }
            Err(e) => {
                let retryable = e.is_retryable();
                metrics::stage::failure(&stage_id, retryable);
                // Nothing a failed attempt published may outlive it
                ctx.bus.discard_stage(&stage_id);

                if retryable && attempt < max_attempts {
                    warn!(
                        "⚠️  Stage {} failed (attempt {}/{}): {}; retrying in {}s",
                        stage_id,
                        attempt,
                        max_attempts,
                        e,
                        retry.retry_delay_secs
                    );
                    tokio::time::sleep(retry.retry_delay()).await;
                    continue;
                }

                error!("❌ Stage {} failed permanently: {}", stage_id, e);
                metrics::stage::duration(&stage_id, t0.elapsed().as_secs_f64());
                return StageReport::failed(&stage_id, attempt, &e, started_at);
            }
        }
    }
}
