//! Run configuration with sensible defaults.
//!
//! One immutable [`RunConfig`] is deserialized from a JSON file at startup
//! and threaded through the run; there is no module-global mutable state.
//! Every knob has a default except `source_path`. The API key may be left
//! out of the file and supplied via the `ANOTA_API_KEY` environment
//! variable instead; completion-style local endpoints need neither.

use crate::ApiProtocol;
use crate::context::{ContextScope, ContextSource};
use crate::engine::ValidationPolicy;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A half-open `[start, end)` row range over the records sheet.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct RowRange {
    pub start: usize,
    pub end: usize,
}

/// A half-open `[start, end)` range of code columns.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnRange {
    pub start: usize,
    pub end: usize,
}

impl ColumnRange {
    pub fn iter(&self) -> impl Iterator<Item = usize> {
        self.start..self.end
    }
}

/// Configuration for one annotation or summarization run.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Path of the workbook file holding the `Codes` and records sheets.
    pub source_path: PathBuf,
    /// LLM endpoint URL. Default: a local completion endpoint.
    #[serde(default = "default_endpoint")]
    pub api_endpoint: String,
    /// Static bearer credential for chat-style endpoints.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Wire protocol the endpoint speaks. Default: `"completion"`.
    #[serde(default)]
    pub api_protocol: ApiProtocol,
    /// Model identifier sent with every request. Default: `"llama3.3:70b"`.
    #[serde(default = "default_model")]
    pub model_name: String,
    /// Data rows to process. Default: every row after the header.
    #[serde(default)]
    pub row_range: Option<RowRange>,
    /// Columns whose headers name the codes to annotate. Default: `[6, 19)`.
    #[serde(default = "default_code_columns")]
    pub code_column_range: ColumnRange,
    /// Attempts per (row, code) unit before recording `"Error"`. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed delay between retry attempts, in seconds. Default: 5.
    #[serde(default = "default_backoff")]
    pub retry_backoff_seconds: f64,
    /// Optional fixed pause after each successfully processed row. Default: 0.
    #[serde(default)]
    pub row_pause_seconds: f64,
    /// Rolling-context capacity in records. Default: 3.
    #[serde(default = "default_window")]
    pub context_window_size: usize,
    /// One rolling window per run, or one per distinct title. Default: `"run"`.
    #[serde(default)]
    pub context_scope: ContextScope,
    /// Digest each row live, or read the stored summary column. Default: `"live"`.
    #[serde(default)]
    pub context_source: ContextSource,
    /// Word budget the digest request asks the model for. Default: 50.
    #[serde(default = "default_word_limit")]
    pub summary_word_limit: usize,
    /// Similarity a header must clear to resolve to a code key. Default: 0.7.
    #[serde(default = "default_cutoff")]
    pub fuzzy_match_cutoff: f64,
    /// Judgment validation policy. Default: `"first-char"`.
    #[serde(default)]
    pub validation: ValidationPolicy,
}

fn default_endpoint() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_model() -> String {
    "llama3.3:70b".to_string()
}

fn default_code_columns() -> ColumnRange {
    ColumnRange { start: 6, end: 19 }
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff() -> f64 {
    5.0
}

fn default_window() -> usize {
    3
}

fn default_word_limit() -> usize {
    50
}

fn default_cutoff() -> f64 {
    0.7
}

impl RunConfig {
    /// Load a config file, filling the API key from `ANOTA_API_KEY` when the
    /// file leaves it out.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file '{}': {e}", path.display()))?;
        let mut config: RunConfig = serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse config file '{}': {e}", path.display()))?;
        if config.api_key.is_none() {
            config.api_key = std::env::var("ANOTA_API_KEY").ok();
        }
        Ok(config)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs_f64(self.retry_backoff_seconds)
    }

    /// `None` when no pause between rows is configured.
    pub fn row_pause(&self) -> Option<Duration> {
        (self.row_pause_seconds > 0.0).then(|| Duration::from_secs_f64(self.row_pause_seconds))
    }
}
