//! Stage and run metrics.
//!
//! Recorded through the `metrics` facade; they are no-ops unless the host
//! process installs a recorder.

pub mod stage {
    pub fn attempt(stage_id: &str) {
        ::metrics::counter!("etl_stage_attempts_total", "stage" => stage_id.to_string()).increment(1);
    }

    pub fn failure(stage_id: &str, retryable: bool) {
        ::metrics::counter!(
            "etl_stage_failures_total",
            "stage" => stage_id.to_string(),
            "retryable" => retryable.to_string()
        )
        .increment(1);
    }

    pub fn skipped(stage_id: &str) {
        ::metrics::counter!("etl_stage_skipped_total", "stage" => stage_id.to_string()).increment(1);
    }

    pub fn records(stage_id: &str, count: u64) {
        ::metrics::histogram!("etl_stage_records", "stage" => stage_id.to_string()).record(count as f64);
    }

    pub fn duration(stage_id: &str, secs: f64) {
        ::metrics::histogram!("etl_stage_duration_seconds", "stage" => stage_id.to_string()).record(secs);
    }
}

pub mod run {
    pub fn finished(validated: bool, secs: f64) {
        let outcome = if validated { "validated" } else { "failed" };
        ::metrics::counter!("etl_runs_total", "outcome" => outcome).increment(1);
        ::metrics::histogram!("etl_run_duration_seconds").record(secs);
    }
}
