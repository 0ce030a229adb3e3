use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to parse {field} '{value}' in row {row}: {reason}")]
    Parse {
        row: usize,
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Metadata key '{key}' was never published (expected from stage '{stage}')")]
    MetadataMissing { stage: String, key: String },

    #[error("Metadata key '{key}' already published this run by stage '{owner}'; '{stage}' may not overwrite it")]
    MetadataAlreadyPublished {
        stage: String,
        key: String,
        owner: String,
    },

    #[error("Metadata key '{key}' holds {found}, expected a record count")]
    MetadataType { key: String, found: String },

    #[error(
        "Record counts don't match: extracted={extracted}, transformed={transformed}, loaded={loaded} (diverging: {})",
        .diverging.join(", ")
    )]
    CountMismatch {
        extracted: u64,
        transformed: u64,
        loaded: u64,
        diverging: Vec<String>,
    },

    #[error("Invalid pipeline graph: {0}")]
    Graph(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Stage task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    /// Whether re-running the failing stage could succeed.
    ///
    /// Storage, database and parse failures go back to the runner's retry
    /// policy. Metadata and count errors can't be fixed by re-running
    /// the stage that observed them.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PipelineError::Io(_)
                | PipelineError::Csv(_)
                | PipelineError::Database(_)
                | PipelineError::Parse { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_and_parse_errors_are_retryable() {
        let io = PipelineError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert!(io.is_retryable());

        let parse = PipelineError::Parse {
            row: 2,
            field: "purchase_date",
            value: "not-a-date".to_string(),
            reason: "input contains invalid characters".to_string(),
        };
        assert!(parse.is_retryable());
    }

    #[test]
    fn validation_errors_are_fatal() {
        let missing = PipelineError::MetadataMissing {
            stage: "load".to_string(),
            key: "loaded_count".to_string(),
        };
        assert!(!missing.is_retryable());

        let mismatch = PipelineError::CountMismatch {
            extracted: 5,
            transformed: 5,
            loaded: 4,
            diverging: vec!["load".to_string()],
        };
        assert!(!mismatch.is_retryable());
        let msg = mismatch.to_string();
        assert!(msg.contains("loaded=4"));
        assert!(msg.contains("diverging: load"));
    }
}
