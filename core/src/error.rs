use thiserror::Error;

/// Fatal pipeline errors.
///
/// Schema and rule violations are not errors: they are counted in the
/// `ExclusionReport` and the run continues.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: '{option}' {reason}")]
    Configuration { option: String, reason: String },

    #[error("Integrity failure in stage '{stage}' at {record}: {reason}")]
    Integrity {
        stage:  &'static str,
        record: String,
        reason: String,
    },

    #[error("Run '{run_id}' not found")]
    RunNotFound { run_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn configuration(option: impl Into<String>, reason: impl Into<String>) -> Self {
        PipelineError::Configuration {
            option: option.into(),
            reason: reason.into(),
        }
    }

    pub fn integrity(
        stage: &'static str,
        record: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        PipelineError::Integrity {
            stage,
            record: record.into(),
            reason: reason.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
