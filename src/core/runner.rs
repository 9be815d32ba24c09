use anyhow::Error;
use indicatif::ProgressBar;
use log::{error, info};

use crate::adapters::output::StatusLine;
use crate::adapters::store::JobStore;
use crate::core::job::{JobId, TrainingRequest};
use crate::core::pipeline::train_and_evaluate;

/// Drives one training job to exactly one terminal state.
pub struct TrainingRunner<S: JobStore> {
    store: S,
    progress: ProgressBar,
}

impl<S: JobStore> TrainingRunner<S> {
    pub fn new(store: S) -> Self {
        Self { store, progress: ProgressBar::hidden() }
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Never fails: every error ends up as a `failed` record and an error line.
    pub async fn run(&self, request: &TrainingRequest) -> StatusLine {
        info!("Starting training job {} ({})", request.job_id, request.model_type);
        let report = match train_and_evaluate(request, &self.progress) {
            Ok(report) => report,
            Err(e) => return self.fail(&request.job_id, e).await,
        };
        self.progress.finish_and_clear();
        info!(
            "{} scored accuracy {:.4}, auc {:.4}",
            report.model_type, report.metrics.accuracy, report.metrics.auc
        );

        match self
            .store
            .mark_completed(&request.job_id, &report.metrics, report.model_data)
            .await
        {
            Ok(()) => StatusLine::success(request.job_id),
            Err(e) => self.fail(&request.job_id, e).await,
        }
    }

    async fn fail(&self, job_id: &JobId, err: Error) -> StatusLine {
        self.progress.abandon();
        let message = format!("{:#}", err);
        error!("Training job {} failed: {}", job_id, message);
        if let Err(store_err) = self.store.mark_failed(job_id, &message).await {
            error!("Failed to record failure for job {}: {:#}", job_id, store_err);
        }
        StatusLine::error(message)
    }
}
