use mongodb::bson::oid::ObjectId;
use std::fmt;

use crate::core::error::JobError;

/// Identifier of a training job record (`_id` of the stored document).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobId(ObjectId);

impl JobId {
    pub fn parse(raw: &str) -> Result<Self, JobError> {
        ObjectId::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| JobError::InvalidModelId(raw.to_string()))
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Held-out scores of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub accuracy: f64,
    pub auc: f64,
}

/// A fully resolved training job, ready to run.
#[derive(Debug, Clone)]
pub struct TrainingRequest {
    pub job_id: JobId,
    pub model_type: String,
    pub file_path: String,
    pub test_size: f64,
    /// Checked against the seed range when the job runs, not when parsed.
    pub random_state: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_round_trips_hex() {
        let id = JobId::parse("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(id.to_string(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_job_id_rejects_garbage() {
        let err = JobId::parse("not-an-id").unwrap_err();
        assert!(matches!(err, JobError::InvalidModelId(_)));
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(JobStatus::Completed.as_str(), "completed");
        assert_eq!(JobStatus::Failed.as_str(), "failed");
    }
}
