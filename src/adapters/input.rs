use polars::prelude::*;
use std::path::PathBuf;
use anyhow::{Context, Result};
use log::{info, debug};

use crate::core::error::JobError;
use crate::core::preprocess::{ColumnValues, RawColumn, RawTable};

/// Cells read as missing, matching the usual dataframe defaults.
pub const NULL_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

pub struct CsvInputAdapter {
    file_path: String,
}

impl CsvInputAdapter {
    pub fn new(file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        debug!("Creating new CsvInputAdapter for {:?}", file_path);
        Self { file_path }
    }

    /// Only `.csv` paths are accepted; the check runs before the file is opened.
    pub fn validate(&self) -> Result<(), JobError> {
        if self.file_path.ends_with(".csv") {
            Ok(())
        } else {
            Err(JobError::UnsupportedFileType)
        }
    }

    pub fn load(&self) -> Result<RawTable> {
        self.validate()?;
        info!("Reading dataset from {:?}", self.file_path);
        let frame = CsvReader::from_path(PathBuf::from(&self.file_path))
            .with_context(|| format!("Failed to open dataset: {}", self.file_path))?
            .has_header(true)
            .with_null_values(Some(NullValues::AllColumns(
                NULL_MARKERS.iter().map(|m| m.to_string()).collect(),
            )))
            .infer_schema(None)
            .finish()
            .with_context(|| format!("Failed to parse CSV: {}", self.file_path))?;
        info!("Loaded {} rows and {} columns", frame.height(), frame.width());
        frame_to_table(&frame)
    }
}

fn frame_to_table(frame: &DataFrame) -> Result<RawTable> {
    let mut columns = Vec::with_capacity(frame.width());
    for series in frame.get_columns() {
        let name = series.name().to_string();
        let dtype = series.dtype();
        let values = if dtype.is_numeric() || matches!(dtype, DataType::Boolean) {
            let cast = series
                .cast(&DataType::Float64)
                .with_context(|| format!("Failed to read column '{}' as numbers", name))?;
            ColumnValues::Numeric(cast.f64()?.into_iter().collect())
        } else {
            let cast = series
                .cast(&DataType::Utf8)
                .with_context(|| format!("Failed to read column '{}' as text", name))?;
            ColumnValues::Categorical(
                cast.utf8()?.into_iter().map(|v| v.map(str::to_string)).collect(),
            )
        };
        debug!("Column {:?} inferred as {} ({})", name, values.kind(), dtype);
        columns.push(RawColumn { name, values });
    }
    Ok(RawTable { columns })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_rejects_non_csv_extension() {
        let adapter = CsvInputAdapter::new("data.xlsx");
        let err = adapter.validate().unwrap_err();
        assert!(err.to_string().contains(".csv"));
        assert!(adapter.load().is_err());
    }

    #[test]
    fn test_load_infers_numeric_and_categorical_columns() {
        let file = write_csv("age,color,flag,label\n31,red,true,yes\n45,blue,false,no\n28,red,true,no\n");
        let table = CsvInputAdapter::new(file.path().to_string_lossy()).load().unwrap();

        assert_eq!(table.columns.len(), 4);
        assert_eq!(table.columns[0].name, "age");
        assert!(matches!(&table.columns[0].values, ColumnValues::Numeric(v) if v == &vec![Some(31.0), Some(45.0), Some(28.0)]));
        assert!(matches!(&table.columns[1].values, ColumnValues::Categorical(_)));
        assert!(matches!(&table.columns[2].values, ColumnValues::Numeric(v) if v[0] == Some(1.0)));
        assert!(matches!(&table.columns[3].values, ColumnValues::Categorical(v) if v[0].as_deref() == Some("yes")));
    }

    #[test]
    fn test_missing_markers_keep_numeric_columns_numeric() {
        let file = write_csv("age,bmi,outcome\n31,22.5,yes\n45,NA,no\n28,NaN,no\n50,n/a,yes\n39,,no\n");
        let table = CsvInputAdapter::new(file.path().to_string_lossy()).load().unwrap();
        match &table.columns[1].values {
            ColumnValues::Numeric(v) => assert_eq!(v, &vec![Some(22.5), None, None, None, None]),
            other => panic!("bmi read as {}", other.kind()),
        }
    }

    #[test]
    fn test_missing_label_is_read_as_null() {
        let file = write_csv("age,outcome\n31,yes\n45,NA\n28,no\n");
        let table = CsvInputAdapter::new(file.path().to_string_lossy()).load().unwrap();
        assert!(matches!(&table.columns[1].values, ColumnValues::Categorical(v) if v[1].is_none()));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let adapter = CsvInputAdapter::new("/definitely/not/here.csv");
        let err = adapter.load().unwrap_err();
        assert!(format!("{:#}", err).contains("not/here.csv"));
    }
}
