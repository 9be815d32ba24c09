use serde_json::Value;

use crate::core::error::JobError;
use crate::core::job::{JobId, TrainingRequest};

pub const DEFAULT_MODEL_TYPE: &str = "LogisticRegression";
pub const DEFAULT_TEST_SIZE: f64 = 0.2;
pub const DEFAULT_RANDOM_STATE: i64 = 42;

/// Resolve the two positional arguments into a runnable request.
///
/// Nothing here touches the job store: every error returned is an
/// argument error.
pub fn parse_job_request(
    model_id: Option<&str>,
    config: Option<&str>,
) -> Result<TrainingRequest, JobError> {
    let (Some(model_id), Some(config)) = (model_id, config) else {
        return Err(JobError::MissingArguments);
    };

    let config: Value = serde_json::from_str(config)
        .map_err(|e| JobError::InvalidConfig(format!("configuration is not valid JSON: {e}")))?;
    let config = config
        .as_object()
        .ok_or_else(|| JobError::InvalidConfig("configuration must be a JSON object".to_string()))?;

    let job_id = JobId::parse(model_id)?;

    let model_type = match config.get("modelType") {
        None | Some(Value::Null) => DEFAULT_MODEL_TYPE.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    };

    let file_path = match config.get("filePath") {
        None => return Err(JobError::MissingFilePath),
        Some(value) if is_falsy(value) => return Err(JobError::MissingFilePath),
        Some(Value::String(s)) => s.clone(),
        // any other value fails the extension check and is recorded on the job
        Some(other) => other.to_string(),
    };

    let parameters = config.get("parameters").and_then(Value::as_object);
    let test_size = match parameters.and_then(|p| p.get("testSize")) {
        None | Some(Value::Null) => DEFAULT_TEST_SIZE,
        Some(value) => number_from(value, "testSize")?,
    };
    let random_state = match parameters.and_then(|p| p.get("randomState")) {
        None | Some(Value::Null) => DEFAULT_RANDOM_STATE,
        Some(value) => seed_from(value)?,
    };

    Ok(TrainingRequest { job_id, model_type, file_path, test_size, random_state })
}

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn number_from(value: &Value, key: &str) -> Result<f64, JobError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| JobError::InvalidConfig(format!("parameters.{key} must be a number, got {value}")))
}

/// Any integer is accepted here; out-of-range seeds fail the job later.
fn seed_from(value: &Value) -> Result<i64, JobError> {
    let invalid = || JobError::InvalidConfig(format!("parameters.randomState must be an integer, got {value}"));
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(seed) => Ok(seed),
            None => n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64).ok_or_else(invalid),
        },
        Value::String(s) => s.trim().parse::<i64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}
