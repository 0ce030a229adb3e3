pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod graph;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod pipeline;
pub mod runner;
pub mod stage;
pub mod stages;
pub mod storage;
pub mod types;

pub use config::{PipelineConfig, RetryPolicy};
pub use error::{PipelineError, Result};
pub use graph::{PipelineGraph, PipelineGraphBuilder};
pub use metadata::MetadataBus;
pub use pipeline::{etl_graph, EtlPipeline, EtlTargets};
pub use runner::{PipelineRun, RunState, Runner, StageReport, StageStatus};
pub use stage::{Stage, StageContext, StageOutcome};
