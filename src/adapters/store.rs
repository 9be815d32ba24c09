use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, Binary, Document};

#[cfg(test)]
use mockall::automock;

use crate::core::job::{JobId, JobStatus, Metrics};

/// Persistence for the terminal state of a training job.
///
/// Implementations update fields of an existing record and never replace
/// it wholesale.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn mark_completed(&self, job_id: &JobId, metrics: &Metrics, model_data: Vec<u8>) -> Result<()>;

    async fn mark_failed(&self, job_id: &JobId, message: &str) -> Result<()>;

    /// Release the underlying connection; called once, after the job ends.
    async fn close(&self);
}

pub fn job_filter(job_id: &JobId) -> Document {
    doc! { "_id": job_id.object_id() }
}

pub fn completed_update(metrics: &Metrics, model_data: Vec<u8>) -> Document {
    let model_data = Binary { subtype: BinarySubtype::Generic, bytes: model_data };
    doc! {
        "$set": {
            "status": JobStatus::Completed.as_str(),
            "performance": {
                "accuracy": metrics.accuracy,
                "auc": metrics.auc,
            },
            "modelData": model_data,
        }
    }
}

pub fn failed_update(message: &str) -> Document {
    doc! {
        "$set": {
            "status": JobStatus::Failed.as_str(),
            "performance": { "error": message },
        }
    }
}
