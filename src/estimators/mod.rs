//! The fixed set of estimators a training job can select by name.

pub mod boosting;
pub mod forest;
pub mod logistic;
pub mod svm;
pub mod tree;

use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView2};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::error::JobError;
use crate::core::preprocess::{LabelEncoder, OneHotEncoder};
use boosting::GradientBoostingClassifier;
use forest::RandomForestClassifier;
use logistic::LogisticRegression;
use svm::SupportVectorClassifier;
use tree::DecisionTreeClassifier;

/// A fitted binary classifier over 0/1-encoded labels.
pub trait Classifier {
    /// Probability of class 1 for every row of `x`.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64>;

    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.predict_proba(x).mapv(|p| if p > 0.5 { 1.0 } else { 0.0 })
    }
}

pub(crate) fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelType {
    LogisticRegression,
    DecisionTree,
    RandomForest,
    GradientBoosting,
    #[serde(rename = "SVM")]
    Svm,
}

pub static MODEL_REGISTRY: Lazy<BTreeMap<&'static str, ModelType>> = Lazy::new(|| {
    BTreeMap::from([
        ("LogisticRegression", ModelType::LogisticRegression),
        ("DecisionTree", ModelType::DecisionTree),
        ("RandomForest", ModelType::RandomForest),
        ("GradientBoosting", ModelType::GradientBoosting),
        ("SVM", ModelType::Svm),
    ])
});

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LogisticRegression => "LogisticRegression",
            Self::DecisionTree => "DecisionTree",
            Self::RandomForest => "RandomForest",
            Self::GradientBoosting => "GradientBoosting",
            Self::Svm => "SVM",
        }
    }

    /// Fit the estimator this name stands for; `random_state` seeds every
    /// random choice it makes.
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>, random_state: u64) -> Result<TrainedModel, JobError> {
        let model = match self {
            Self::LogisticRegression => TrainedModel::LogisticRegression(LogisticRegression::fit(x, y)?),
            Self::DecisionTree => TrainedModel::DecisionTree(DecisionTreeClassifier::fit(x, y, random_state)),
            Self::RandomForest => TrainedModel::RandomForest(RandomForestClassifier::fit(x, y, random_state)),
            Self::GradientBoosting => {
                TrainedModel::GradientBoosting(GradientBoostingClassifier::fit(x, y, random_state))
            }
            Self::Svm => TrainedModel::Svm(SupportVectorClassifier::fit(x, y, random_state)),
        };
        Ok(model)
    }
}

impl FromStr for ModelType {
    type Err = JobError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        MODEL_REGISTRY
            .get(name)
            .copied()
            .ok_or_else(|| JobError::UnsupportedModel(name.to_string()))
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TrainedModel {
    LogisticRegression(LogisticRegression),
    DecisionTree(DecisionTreeClassifier),
    RandomForest(RandomForestClassifier),
    GradientBoosting(GradientBoostingClassifier),
    Svm(SupportVectorClassifier),
}

impl TrainedModel {
    fn as_classifier(&self) -> &dyn Classifier {
        match self {
            Self::LogisticRegression(m) => m,
            Self::DecisionTree(m) => m,
            Self::RandomForest(m) => m,
            Self::GradientBoosting(m) => m,
            Self::Svm(m) => m,
        }
    }
}

impl Classifier for TrainedModel {
    fn predict_proba(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.as_classifier().predict_proba(x)
    }

    fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        self.as_classifier().predict(x)
    }
}

/// Everything needed to score new rows, stored as the job's `modelData`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: ModelType,
    pub feature_names: Vec<String>,
    pub encoder: OneHotEncoder,
    pub labels: LabelEncoder,
    pub model: TrainedModel,
}

impl ModelArtifact {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).context("Failed to serialize fitted model")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).context("Failed to deserialize model artifact")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_registry_knows_exactly_five_names() {
        assert_eq!(MODEL_REGISTRY.len(), 5);
        for name in ["LogisticRegression", "DecisionTree", "RandomForest", "GradientBoosting", "SVM"] {
            let model_type: ModelType = name.parse().unwrap();
            assert_eq!(model_type.as_str(), name);
        }
    }

    #[test]
    fn test_unknown_model_is_not_implemented() {
        let err = "NeuralNet".parse::<ModelType>().unwrap_err();
        assert_eq!(err.to_string(), "Model type 'NeuralNet' is not implemented.");
        assert!("svm".parse::<ModelType>().is_err());
    }

    #[test]
    fn test_artifact_round_trip_preserves_predictions() {
        let x = array![[0.0], [1.0], [5.0], [6.0]];
        let y = array![0.0, 0.0, 1.0, 1.0];
        let model = ModelType::DecisionTree.fit(&x, &y, 1).unwrap();
        let artifact = ModelArtifact {
            model_type: ModelType::DecisionTree,
            feature_names: vec!["x".to_string()],
            encoder: OneHotEncoder::default(),
            labels: LabelEncoder { classes: vec!["no".to_string(), "yes".to_string()] },
            model,
        };
        let restored = ModelArtifact::from_bytes(&artifact.to_bytes().unwrap()).unwrap();
        assert_eq!(restored.model_type, ModelType::DecisionTree);
        assert_eq!(restored.model.predict_proba(x.view()), artifact.model.predict_proba(x.view()));
    }

    #[test]
    fn test_sigmoid_is_symmetric_and_bounded() {
        assert_eq!(sigmoid(0.0), 0.5);
        assert!((sigmoid(3.0) + sigmoid(-3.0) - 1.0).abs() < 1e-15);
        assert_eq!(sigmoid(-1000.0), 0.0);
        assert_eq!(sigmoid(1000.0), 1.0);
    }
}
