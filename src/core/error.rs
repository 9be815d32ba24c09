use thiserror::Error;

/// Errors raised while resolving or running a training job.
///
/// Argument errors are reported before the job store is touched. Every
/// other variant is recorded on the job as a `failed` status.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("Missing modelId or configuration.")]
    MissingArguments,

    #[error("filePath is required.")]
    MissingFilePath,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid modelId '{0}': expected a 24 character hex ObjectId")]
    InvalidModelId(String),

    #[error("Only .csv files are currently supported.")]
    UnsupportedFileType,

    #[error("Model type '{0}' is not implemented.")]
    UnsupportedModel(String),

    #[error("testSize must be strictly between 0 and 1, got {0}")]
    InvalidTestSize(f64),

    #[error("randomState must be between 0 and 2**32 - 1, got {0}")]
    InvalidRandomState(i64),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("estimator error: {0}")]
    Estimator(String),

    #[error("metric error: {0}")]
    Metric(String),
}

impl JobError {
    /// True for errors detected before any store access.
    pub fn is_argument_error(&self) -> bool {
        matches!(
            self,
            Self::MissingArguments
                | Self::MissingFilePath
                | Self::InvalidConfig(_)
                | Self::InvalidModelId(_)
        )
    }
}
