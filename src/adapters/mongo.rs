use super::store::{completed_update, failed_update, job_filter, JobStore};
use crate::core::job::{JobId, Metrics};
use crate::utils::lib::{StoreSettings, DEFAULT_DATABASE};
use anyhow::{Context, Result};
use async_trait::async_trait;
use log::{info, debug, warn};
use mongodb::bson::Document;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

const APP_NAME: &str = "model-trainer";

/// Job records kept in a MongoDB collection.
pub struct MongoJobStore {
    client: Client,
    collection: Collection<Document>,
}

impl MongoJobStore {
    /// Builds the client; the driver connects lazily on the first update.
    pub async fn connect(settings: &StoreSettings) -> Result<Self> {
        let mut options = ClientOptions::parse(&settings.uri)
            .await
            .context("Failed to parse MongoDB connection string")?;
        options.app_name = Some(APP_NAME.to_string());

        let database = settings
            .database
            .clone()
            .or_else(|| options.default_database.clone())
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let client = Client::with_options(options).context("Failed to create MongoDB client")?;
        let collection = client.database(&database).collection::<Document>(&settings.collection);
        info!("Using job store {}.{}", database, settings.collection);
        Ok(Self { client, collection })
    }

    async fn set_fields(&self, job_id: &JobId, update: Document) -> Result<()> {
        let result = self
            .collection
            .update_one(job_filter(job_id), update, None)
            .await
            .with_context(|| format!("Failed to update training job {}", job_id))?;
        if result.matched_count == 0 {
            warn!("No training job record matched id {}", job_id);
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MongoJobStore {
    async fn mark_completed(&self, job_id: &JobId, metrics: &Metrics, model_data: Vec<u8>) -> Result<()> {
        debug!("Storing {} bytes of model data for job {}", model_data.len(), job_id);
        self.set_fields(job_id, completed_update(metrics, model_data)).await?;
        info!("Training job {} marked completed", job_id);
        Ok(())
    }

    async fn mark_failed(&self, job_id: &JobId, message: &str) -> Result<()> {
        self.set_fields(job_id, failed_update(message)).await?;
        info!("Training job {} marked failed", job_id);
        Ok(())
    }

    async fn close(&self) {
        debug!("Closing MongoDB client");
        self.client.clone().shutdown().await;
    }
}
