use anyhow::{Context, Result};
use indicatif::ProgressBar;
use log::info;
use ndarray::Axis;

use crate::adapters::input::CsvInputAdapter;
use crate::core::error::JobError;
use crate::core::job::{Metrics, TrainingRequest};
use crate::core::metrics::{accuracy_score, roc_auc_score};
use crate::core::preprocess::{ensure_two_classes, train_test_split, EncodedDataset};
use crate::estimators::{Classifier, ModelArtifact, ModelType};

/// Progress ticks: load, encode, split, fit, evaluate, serialize.
pub const PIPELINE_STEPS: u64 = 6;

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model_type: ModelType,
    pub metrics: Metrics,
    pub model_data: Vec<u8>,
}

/// Run every step of a job up to, but not including, persistence.
///
/// The first failing step aborts the rest.
pub fn train_and_evaluate(request: &TrainingRequest, progress: &ProgressBar) -> Result<TrainingReport> {
    let input = CsvInputAdapter::new(request.file_path.clone());
    input.validate()?;
    let model_type: ModelType = request.model_type.parse()?;
    if !(request.test_size > 0.0 && request.test_size < 1.0) {
        return Err(JobError::InvalidTestSize(request.test_size).into());
    }
    let seed = seed_from(request.random_state)?;

    progress.set_message("loading");
    let table = input.load()?;
    progress.inc(1);

    progress.set_message("encoding");
    let dataset = EncodedDataset::from_table(&table)?;
    info!(
        "Encoded {} rows into {} features",
        dataset.features.nrows(),
        dataset.feature_names.len()
    );
    progress.inc(1);

    progress.set_message("splitting");
    let (train_rows, test_rows) =
        train_test_split(dataset.features.nrows(), request.test_size, seed)?;
    let x_train = dataset.features.select(Axis(0), &train_rows);
    let y_train = dataset.labels.select(Axis(0), &train_rows);
    let x_test = dataset.features.select(Axis(0), &test_rows);
    let y_test = dataset.labels.select(Axis(0), &test_rows);
    ensure_two_classes(&y_train)?;
    progress.inc(1);

    progress.set_message("fitting");
    info!("Fitting {} on {} rows", model_type, x_train.nrows());
    let model = model_type.fit(&x_train, &y_train, seed)?;
    progress.inc(1);

    progress.set_message("evaluating");
    let proba = model.predict_proba(x_test.view());
    let predicted = model.predict(x_test.view());
    let metrics = Metrics {
        accuracy: accuracy_score(&y_test, &predicted),
        auc: roc_auc_score(&y_test, &proba)?,
    };
    info!("Held-out accuracy {:.4}, auc {:.4}", metrics.accuracy, metrics.auc);
    progress.inc(1);

    progress.set_message("serializing");
    let artifact = ModelArtifact {
        model_type,
        feature_names: dataset.feature_names,
        encoder: dataset.encoder,
        labels: dataset.label_encoder,
        model,
    };
    let model_data = artifact
        .to_bytes()
        .with_context(|| format!("Failed to serialize {} model", model_type))?;
    progress.inc(1);

    Ok(TrainingReport { model_type, metrics, model_data })
}

/// Seeds are limited to the 32-bit unsigned range.
fn seed_from(random_state: i64) -> Result<u64, JobError> {
    u32::try_from(random_state)
        .map(u64::from)
        .map_err(|_| JobError::InvalidRandomState(random_state))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use std::io::Write;

    /// Two numeric columns, one categorical column and a yes/no label that
    /// depends on all three, with a few flipped rows.
    pub fn write_dataset(rows: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "age,score,region,outcome").unwrap();
        let regions = ["north", "south", "east"];
        for i in 0..rows {
            let age = 20 + (i * 37) % 50;
            let score = ((i * 13) % 17) as f64 / 4.0;
            let region = regions[i % 3];
            let mut positive = age as f64 / 10.0 + score + if region == "north" { 2.0 } else { 0.0 } > 7.5;
            if i % 11 == 0 {
                positive = !positive;
            }
            writeln!(file, "{},{},{},{}", age, score, region, if positive { "yes" } else { "no" }).unwrap();
        }
        file.flush().unwrap();
        file
    }
}
