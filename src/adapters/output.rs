use anyhow::{Context, Result};
use serde::Serialize;
use std::io::Write;

/// The single JSON object a run reports on stdout.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StatusLine {
    Success {
        #[serde(rename = "modelId")]
        model_id: String,
    },
    Error {
        message: String,
    },
}

impl StatusLine {
    pub fn success(model_id: impl ToString) -> Self {
        Self::Success { model_id: model_id.to_string() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

pub fn emit_status_line<W: Write>(writer: &mut W, line: &StatusLine) -> Result<()> {
    let json = serde_json::to_string(line)
        .context("Failed to serialize status line")?;
    writeln!(writer, "{}", json)
        .context("Failed to write status line")?;
    writer.flush().context("Failed to flush status line")?;
    Ok(())
}
