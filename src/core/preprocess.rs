use log::debug;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::error::JobError;

/// Column-wise view of a loaded CSV file.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub columns: Vec<RawColumn>,
}

#[derive(Debug, Clone)]
pub struct RawColumn {
    pub name: String,
    pub values: ColumnValues,
}

#[derive(Debug, Clone)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Categorical(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Categorical(_) => "categorical",
        }
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Categorical(v) => v.len(),
        }
    }
}

impl RawTable {
    pub fn n_rows(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedColumn {
    pub name: String,
    pub categories: Vec<String>,
}

/// One-hot encoder over the categorical feature columns.
///
/// Categories are sorted; a value never seen during `fit` encodes to all
/// zeros instead of failing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    columns: Vec<EncodedColumn>,
}

impl OneHotEncoder {
    pub fn fit(columns: &[(&str, &[String])]) -> Self {
        let columns = columns
            .iter()
            .map(|(name, values)| EncodedColumn {
                name: name.to_string(),
                categories: values.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect(),
            })
            .collect();
        Self { columns }
    }

    pub fn feature_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .flat_map(|c| c.categories.iter().map(move |cat| format!("{}_{}", c.name, cat)))
            .collect()
    }

    pub fn n_outputs(&self) -> usize {
        self.columns.iter().map(|c| c.categories.len()).sum()
    }

    /// Indicator values for one row; `row[i]` belongs to the i-th fitted column.
    pub fn transform_row(&self, row: &[&str]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_outputs()];
        let mut offset = 0;
        for (column, value) in self.columns.iter().zip(row) {
            if let Ok(idx) = column.categories.binary_search_by(|c| c.as_str().cmp(value)) {
                out[offset + idx] = 1.0;
            }
            offset += column.categories.len();
        }
        out
    }
}

/// Maps the two label values onto 0.0 and 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    pub classes: Vec<String>,
}

impl LabelEncoder {
    fn fit(column: &RawColumn) -> Result<(Self, Array1<f64>), JobError> {
        let missing = |name: &str| JobError::Dataset(format!("label column '{}' has missing values", name));
        let (classes, keys): (Vec<String>, Vec<String>) = match &column.values {
            ColumnValues::Numeric(values) => {
                // NaN labels would otherwise form their own class
                let values: Vec<f64> = values
                    .iter()
                    .map(|v| v.filter(|v| v.is_finite()).ok_or_else(|| missing(&column.name)))
                    .collect::<Result<_, _>>()?;
                let mut distinct = values.clone();
                distinct.sort_by(f64::total_cmp);
                distinct.dedup();
                (
                    distinct.iter().map(|v| v.to_string()).collect(),
                    values.iter().map(|v| v.to_string()).collect(),
                )
            }
            ColumnValues::Categorical(values) => {
                let values: Vec<String> = values
                    .iter()
                    .map(|v| v.clone().ok_or_else(|| missing(&column.name)))
                    .collect::<Result<_, _>>()?;
                let distinct: BTreeSet<String> = values.iter().cloned().collect();
                (distinct.into_iter().collect(), values)
            }
        };
        if classes.len() != 2 {
            return Err(JobError::Dataset(format!(
                "label column '{}' must hold exactly two classes, found {}",
                column.name,
                classes.len()
            )));
        }
        let labels = keys.iter().map(|k| if *k == classes[1] { 1.0 } else { 0.0 }).collect();
        Ok((Self { classes }, labels))
    }
}

/// Numeric design matrix plus the encoders that produced it.
#[derive(Debug, Clone)]
pub struct EncodedDataset {
    pub features: Array2<f64>,
    pub labels: Array1<f64>,
    pub feature_names: Vec<String>,
    pub encoder: OneHotEncoder,
    pub label_encoder: LabelEncoder,
}

impl EncodedDataset {
    /// The last column is the label; numeric features keep their order
    /// and precede the one-hot indicators.
    pub fn from_table(table: &RawTable) -> Result<Self, JobError> {
        let Some((label, features)) = table.columns.split_last() else {
            return Err(JobError::Dataset("dataset has no columns".to_string()));
        };
        if features.is_empty() {
            return Err(JobError::Dataset(
                "dataset needs at least one feature column before the label".to_string(),
            ));
        }
        let n_rows = table.n_rows();
        if n_rows == 0 {
            return Err(JobError::Dataset("dataset has no rows".to_string()));
        }
        debug!("Using last column {:?} as the label", label.name);

        let mut numeric: Vec<(&str, Vec<f64>)> = Vec::new();
        let mut categorical: Vec<(&str, Vec<String>)> = Vec::new();
        for column in features {
            let missing = || JobError::Dataset(format!("column '{}' has missing or non-finite values", column.name));
            match &column.values {
                ColumnValues::Numeric(values) => {
                    let values: Vec<f64> = values
                        .iter()
                        .map(|v| v.filter(|v| v.is_finite()).ok_or_else(missing))
                        .collect::<Result<_, _>>()?;
                    numeric.push((column.name.as_str(), values));
                }
                ColumnValues::Categorical(values) => {
                    debug!("Treating {:?} as categorical", column.name);
                    let values: Vec<String> =
                        values.iter().map(|v| v.clone().ok_or_else(missing)).collect::<Result<_, _>>()?;
                    categorical.push((column.name.as_str(), values));
                }
            }
        }

        let fit_input: Vec<(&str, &[String])> =
            categorical.iter().map(|(name, values)| (*name, values.as_slice())).collect();
        let encoder = OneHotEncoder::fit(&fit_input);

        let mut feature_names: Vec<String> = numeric.iter().map(|(name, _)| name.to_string()).collect();
        feature_names.extend(encoder.feature_names());

        let width = feature_names.len();
        let mut data = Vec::with_capacity(n_rows * width);
        for row in 0..n_rows {
            data.extend(numeric.iter().map(|(_, values)| values[row]));
            let categories: Vec<&str> = categorical.iter().map(|(_, values)| values[row].as_str()).collect();
            data.extend(encoder.transform_row(&categories));
        }
        let features = Array2::from_shape_vec((n_rows, width), data)
            .map_err(|e| JobError::Dataset(format!("ragged feature matrix: {e}")))?;

        let (label_encoder, labels) = LabelEncoder::fit(label)?;
        Ok(Self { features, labels, feature_names, encoder, label_encoder })
    }
}

/// Seeded row split: `ceil(test_size * n)` rows go to the test partition.
///
/// Returns `(train_rows, test_rows)`.
pub fn train_test_split(
    n_rows: usize,
    test_size: f64,
    random_state: u64,
) -> Result<(Vec<usize>, Vec<usize>), JobError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(JobError::InvalidTestSize(test_size));
    }
    let n_test = (test_size * n_rows as f64).ceil() as usize;
    let n_train = n_rows.saturating_sub(n_test);
    if n_train == 0 || n_test == 0 {
        return Err(JobError::Dataset(format!(
            "with {} rows and testSize={}, the train set would have {} rows and the test set {}",
            n_rows, test_size, n_train, n_test
        )));
    }

    let mut order: Vec<usize> = (0..n_rows).collect();
    let mut rng = StdRng::seed_from_u64(random_state);
    order.shuffle(&mut rng);
    let train = order.split_off(n_test);
    Ok((train, order))
}

/// Both classes must be present for any estimator to fit.
pub fn ensure_two_classes(labels: &Array1<f64>) -> Result<(), JobError> {
    let positives = labels.iter().filter(|&&y| y > 0.5).count();
    if positives == 0 || positives == labels.len() {
        return Err(JobError::Dataset(
            "the training split contains a single class; use more rows or another randomState".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(name: &str, values: &[f64]) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            values: ColumnValues::Numeric(values.iter().copied().map(Some).collect()),
        }
    }

    fn text(name: &str, values: &[&str]) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            values: ColumnValues::Categorical(values.iter().map(|v| Some(v.to_string())).collect()),
        }
    }

    #[test]
    fn test_one_hot_layout_and_names() {
        let table = RawTable {
            columns: vec![
                text("color", &["red", "blue", "red"]),
                numeric("age", &[30.0, 40.0, 50.0]),
                text("label", &["no", "yes", "no"]),
            ],
        };
        let dataset = EncodedDataset::from_table(&table).unwrap();
        assert_eq!(dataset.feature_names, vec!["age", "color_blue", "color_red"]);
        assert_eq!(dataset.features.row(0).to_vec(), vec![30.0, 0.0, 1.0]);
        assert_eq!(dataset.features.row(1).to_vec(), vec![40.0, 1.0, 0.0]);
        assert_eq!(dataset.labels.to_vec(), vec![0.0, 1.0, 0.0]);
        assert_eq!(dataset.label_encoder.classes, vec!["no", "yes"]);
    }

    #[test]
    fn test_unknown_category_encodes_to_zeros() {
        let values = vec!["a".to_string(), "b".to_string()];
        let encoder = OneHotEncoder::fit(&[("c", values.as_slice())]);
        assert_eq!(encoder.transform_row(&["b"]), vec![0.0, 1.0]);
        assert_eq!(encoder.transform_row(&["zzz"]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_numeric_labels_sort_by_value() {
        let table = RawTable {
            columns: vec![numeric("x", &[1.0, 2.0, 3.0]), numeric("y", &[10.0, 9.0, 10.0])],
        };
        let dataset = EncodedDataset::from_table(&table).unwrap();
        assert_eq!(dataset.label_encoder.classes, vec!["9", "10"]);
        assert_eq!(dataset.labels.to_vec(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_rejects_non_binary_label_and_missing_values() {
        let table = RawTable {
            columns: vec![numeric("x", &[1.0, 2.0, 3.0]), text("y", &["a", "b", "c"])],
        };
        assert!(EncodedDataset::from_table(&table).is_err());

        let table = RawTable {
            columns: vec![
                RawColumn { name: "x".to_string(), values: ColumnValues::Numeric(vec![Some(1.0), None]) },
                text("y", &["a", "b"]),
            ],
        };
        let err = EncodedDataset::from_table(&table).unwrap_err();
        assert!(err.to_string().contains("'x'"));
    }

    #[test]
    fn test_rejects_non_finite_values() {
        for bad in [f64::NAN, f64::INFINITY] {
            let table = RawTable {
                columns: vec![
                    RawColumn { name: "bmi".to_string(), values: ColumnValues::Numeric(vec![Some(1.0), Some(bad)]) },
                    text("y", &["a", "b"]),
                ],
            };
            let err = EncodedDataset::from_table(&table).unwrap_err();
            assert!(err.to_string().contains("'bmi'"));
        }

        let table = RawTable {
            columns: vec![numeric("x", &[1.0, 2.0, 3.0]), numeric("y", &[0.0, f64::NAN, 1.0])],
        };
        assert!(EncodedDataset::from_table(&table).unwrap_err().to_string().contains("label column 'y'"));
    }

    #[test]
    fn test_split_sizes_and_determinism() {
        let (train, test) = train_test_split(10, 0.25, 1).unwrap();
        assert_eq!(test.len(), 3);
        assert_eq!(train.len(), 7);
        let mut all: Vec<usize> = train.iter().chain(test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(train_test_split(10, 0.25, 1).unwrap(), (train, test));
    }

    #[test]
    fn test_split_rejects_bad_sizes() {
        assert!(matches!(train_test_split(10, 0.0, 1), Err(JobError::InvalidTestSize(_))));
        assert!(matches!(train_test_split(10, 1.5, 1), Err(JobError::InvalidTestSize(_))));
        assert!(train_test_split(1, 0.5, 1).is_err());
    }

    #[test]
    fn test_single_class_training_split_rejected() {
        assert!(ensure_two_classes(&Array1::from(vec![1.0, 1.0])).is_err());
        assert!(ensure_two_classes(&Array1::from(vec![0.0, 1.0])).is_ok());
    }
}
