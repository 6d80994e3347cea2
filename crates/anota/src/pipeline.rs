//! The sequential run loops: annotate and summarize.
//!
//! Strictly ordered (rows within a column, columns within a run) because
//! the context tracker is read-then-written across iterations and later
//! rows depend on earlier rows' accumulated state. The fault boundary is one
//! (row, code) unit: an exhausted retry budget records `"Error"` in that
//! cell and the loop advances; only a missing sheet aborts a run, and it
//! does so before any annotation begins.

use crate::codebook::{CodeBook, resolve_columns};
use crate::config::RunConfig;
use crate::context::{self, ContextSource, ContextTracker};
use crate::engine::{self, RetryPolicy};
use crate::sanitize::sanitize;
use crate::store::{CellValue, Sheet, Workbook};
use crate::{LlmClient, RESET_PROMPT, TextGenerator, prompt};
use chrono::{DateTime, Utc};
use std::ops::Range;
use tracing::{debug, info, warn};

/// Sheet holding the codebook: `[code_key, definition, example]`.
pub const CODES_SHEET: &str = "Codes";
/// Sheet holding the records and the code columns.
pub const RECORDS_SHEET: &str = "Codification";

/// Fixed record-field positions on the records sheet.
pub mod columns {
    pub const TITLE: usize = 0;
    pub const CATEGORY: usize = 1;
    pub const NAME: usize = 2;
    pub const DESCRIPTION: usize = 3;
    pub const EMBEDDED: usize = 4;
    pub const SUMMARY: usize = 5;
}

// ── Records ────────────────────────────────────────────────────────

/// One row of the records sheet, read in full before the row's prompt is
/// built. Never mutated; missing cells arrive stringified as `"nan"`.
#[derive(Debug, Clone)]
pub struct Record {
    pub title: String,
    pub category: String,
    pub name: String,
    pub description: String,
    pub embedded_description: String,
    pub prior_summary: String,
}

pub fn read_record(sheet: &Sheet, row: usize) -> Record {
    Record {
        title: sheet.value(row, columns::TITLE).to_string(),
        category: sheet.value(row, columns::CATEGORY).to_string(),
        name: sheet.value(row, columns::NAME).to_string(),
        description: sheet.value(row, columns::DESCRIPTION).to_string(),
        embedded_description: sheet.value(row, columns::EMBEDDED).to_string(),
        prior_summary: sheet.value(row, columns::SUMMARY).to_string(),
    }
}

// ── Run summary ────────────────────────────────────────────────────

/// What a run did, for the final log line.
#[derive(Debug)]
pub struct RunSummary {
    pub cells_written: usize,
    pub errors: usize,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
}

// ── Annotate ───────────────────────────────────────────────────────

/// Load the workbook named by the config, build the HTTP client, and run
/// the annotation loop against the live endpoint.
pub async fn annotate(config: &RunConfig) -> Result<RunSummary, String> {
    let mut workbook = Workbook::load(&config.source_path).map_err(|e| e.to_string())?;
    let client = LlmClient::new(config)?;
    annotate_with(config, &mut workbook, &client).await
}

/// The annotation loop proper, over any generator. Per column: resolve the
/// binding, send the reset pseudo-call, then walk the rows. Per row: digest
/// from strictly-prior rows, push the current row, build the prompt,
/// annotate, write the judgment through to disk.
pub async fn annotate_with(
    config: &RunConfig,
    workbook: &mut Workbook,
    generator: &dyn TextGenerator,
) -> Result<RunSummary, String> {
    let started = Utc::now();
    info!("annotation run started at {started}");

    // Structure checks come first: a missing sheet is a configuration
    // mismatch and aborts before any annotation.
    let codebook = CodeBook::from_sheet(workbook.sheet(CODES_SHEET).map_err(|e| e.to_string())?);
    let (bindings, rows) = {
        let records = workbook.sheet(RECORDS_SHEET).map_err(|e| e.to_string())?;
        let bindings = resolve_columns(
            records,
            &config.code_column_range,
            &codebook,
            config.fuzzy_match_cutoff,
        );
        (bindings, data_rows(config, records))
    };
    info!(
        "loaded {} codes, bound {} columns, rows {}..{}",
        codebook.len(),
        bindings.len(),
        rows.start,
        rows.end
    );

    let retry = RetryPolicy::new(config.max_retries, config.retry_backoff());
    let mut cells_written = 0;
    let mut errors = 0;

    for binding in &bindings {
        reset_backend(generator).await;
        info!(
            "processing code '{}' (column {}, header '{}')",
            binding.resolved, binding.column, binding.raw_header
        );
        debug!("definition: {}", codebook.definition(&binding.resolved));
        debug!("example: {}", codebook.example(&binding.resolved));

        let mut tracker = ContextTracker::new(config.context_scope, config.context_window_size);

        for row in rows.clone() {
            let record = read_record(workbook.sheet(RECORDS_SHEET).map_err(|e| e.to_string())?, row);

            let digest = match config.context_source {
                ContextSource::Live => {
                    let key = tracker.key_for(&record.title);
                    let digest =
                        context::summarize(generator, tracker.window(&key), config.summary_word_limit)
                            .await;
                    tracker.update(
                        &key,
                        sanitize(&record.description),
                        sanitize(&record.embedded_description),
                    );
                    digest
                }
                ContextSource::Column => record.prior_summary.clone(),
            };

            let text = prompt::record_text(
                &sanitize(&record.description),
                &sanitize(&record.embedded_description),
            );
            let full_prompt = prompt::build(
                &binding.resolved,
                codebook.definition(&binding.resolved),
                codebook.example(&binding.resolved),
                &digest,
                &text,
            );
            debug!("prompt for row {row}: {full_prompt}");

            let judgment = engine::annotate(generator, &full_prompt, &retry, config.validation).await;
            info!("row {row} - code '{}': {judgment}", binding.resolved);
            if judgment.is_error() {
                errors += 1;
            }

            let sheet = workbook.sheet_mut(RECORDS_SHEET).map_err(|e| e.to_string())?;
            sheet.set_value(row, binding.column, judgment.as_cell());
            workbook.save().map_err(|e| e.to_string())?;
            cells_written += 1;

            if let Some(pause) = config.row_pause() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    let finished = Utc::now();
    info!(
        "annotation run finished at {finished}: {cells_written} cells written, {errors} errors"
    );
    Ok(RunSummary {
        cells_written,
        errors,
        started,
        finished,
    })
}

// ── Summarize ──────────────────────────────────────────────────────

/// Load the workbook named by the config and fill the summary column
/// against the live endpoint.
pub async fn summarize(config: &RunConfig) -> Result<RunSummary, String> {
    let mut workbook = Workbook::load(&config.source_path).map_err(|e| e.to_string())?;
    let client = LlmClient::new(config)?;
    summarize_with(config, &mut workbook, &client).await
}

/// The summary-generation pass: one walk over the rows that writes each
/// row's strictly-prior digest into the summary column, so a later
/// annotation run with `context_source = "column"` reads exactly what a
/// live run would have computed.
pub async fn summarize_with(
    config: &RunConfig,
    workbook: &mut Workbook,
    generator: &dyn TextGenerator,
) -> Result<RunSummary, String> {
    let started = Utc::now();
    info!("summary run started at {started}");

    let rows = data_rows(
        config,
        workbook.sheet(RECORDS_SHEET).map_err(|e| e.to_string())?,
    );
    reset_backend(generator).await;

    let mut tracker = ContextTracker::new(config.context_scope, config.context_window_size);
    let mut cells_written = 0;
    let mut errors = 0;

    for row in rows {
        let record = read_record(workbook.sheet(RECORDS_SHEET).map_err(|e| e.to_string())?, row);
        let key = tracker.key_for(&record.title);
        let digest =
            context::summarize(generator, tracker.window(&key), config.summary_word_limit).await;
        tracker.update(
            &key,
            sanitize(&record.description),
            sanitize(&record.embedded_description),
        );

        info!("row {row} - summary: {digest}");
        if digest == context::SUMMARY_ERROR_SENTINEL {
            errors += 1;
        }

        let sheet = workbook.sheet_mut(RECORDS_SHEET).map_err(|e| e.to_string())?;
        sheet.set_value(row, columns::SUMMARY, CellValue::text(digest));
        workbook.save().map_err(|e| e.to_string())?;
        cells_written += 1;

        if let Some(pause) = config.row_pause() {
            tokio::time::sleep(pause).await;
        }
    }

    let finished = Utc::now();
    info!("summary run finished at {finished}: {cells_written} cells written, {errors} errors");
    Ok(RunSummary {
        cells_written,
        errors,
        started,
        finished,
    })
}

// ── Helpers ────────────────────────────────────────────────────────

/// The configured row range, or every data row after the header.
fn data_rows(config: &RunConfig, records: &Sheet) -> Range<usize> {
    match config.row_range {
        Some(range) => range.start..range.end,
        None => 1..records.row_count(),
    }
}

/// The reset/forget pseudo-call. A backend that cannot be reset still gets
/// a fresh prompt per cell, so failure is logged and swallowed.
async fn reset_backend(generator: &dyn TextGenerator) {
    if let Err(err) = generator.generate(RESET_PROMPT).await {
        warn!("context reset call failed: {err}");
    }
}
