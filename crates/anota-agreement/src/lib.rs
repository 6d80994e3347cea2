//! Human/model agreement statistics over annotated workbooks.
//!
//! Compares a human-rated sheet against a model-rated sheet, column by
//! column: every compared cell on the model sheet is colored green on
//! agreement and red on disagreement, and each column gains aggregate rows
//! below the data holding Cohen's kappa, its qualitative band, and the
//! matched/mismatched counts.
//!
//! Normalization rules: a missing human label counts as 0; a row whose
//! model label is missing is excluded from the kappa statistic but still
//! counted (and colored) as a mismatch.

pub mod kappa;

use anota::config::{ColumnRange, RowRange};
use anota::store::{CellValue, Sheet, Workbook};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Agreement fill: matched cells.
pub const GREEN_FILL: &str = "ceffce";
/// Agreement fill: mismatched cells.
pub const RED_FILL: &str = "fd9f9f";

// ── Configuration ──────────────────────────────────────────────────

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct AgreementConfig {
    /// Path of the workbook holding both rating sheets.
    pub source_path: PathBuf,
    /// Sheet with the human ratings. Default: `"Human"`.
    #[serde(default = "default_human_sheet")]
    pub human_sheet: String,
    /// Sheet with the model ratings; receives the fills and the aggregate
    /// rows. Default: `"Codification"`.
    #[serde(default = "default_model_sheet")]
    pub model_sheet: String,
    /// Data rows to compare. Default: every row after the header.
    #[serde(default)]
    pub row_range: Option<RowRange>,
    /// Code columns to compare. Default: `[6, 19)`.
    #[serde(default = "default_code_columns")]
    pub code_column_range: ColumnRange,
    /// Row the aggregate block starts at. Default: one blank row below the
    /// compared range.
    #[serde(default)]
    pub stats_row: Option<usize>,
}

fn default_human_sheet() -> String {
    "Human".to_string()
}

fn default_model_sheet() -> String {
    "Codification".to_string()
}

fn default_code_columns() -> ColumnRange {
    ColumnRange { start: 6, end: 19 }
}

impl AgreementConfig {
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read config file '{}': {e}", path.display()))?;
        serde_json::from_str(&content)
            .map_err(|e| format!("failed to parse config file '{}': {e}", path.display()))
    }
}

// ── Comparison ─────────────────────────────────────────────────────

/// Aggregates for one compared column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReport {
    pub column: usize,
    pub kappa: Option<f64>,
    pub matched: usize,
    pub mismatched: usize,
}

/// Per-row verdicts and the kappa rating pairs for one column.
fn compare_column(
    human: &Sheet,
    model: &Sheet,
    rows: std::ops::Range<usize>,
    column: usize,
) -> (Vec<(usize, bool)>, Vec<(f64, f64)>) {
    let mut verdicts = Vec::new();
    let mut pairs = Vec::new();
    for row in rows {
        // Missing human labels normalize to 0.
        let human_value = human.value(row, column).as_number().unwrap_or(0.0);
        let model_value = model.value(row, column).as_number();

        verdicts.push((row, model_value == Some(human_value)));
        if let Some(model_value) = model_value {
            pairs.push((human_value, model_value));
        }
    }
    (verdicts, pairs)
}

/// Compare every configured column, color the model sheet, write the
/// aggregate rows, and save after each column.
pub fn run(config: &AgreementConfig) -> Result<Vec<ColumnReport>, String> {
    let mut workbook = Workbook::load(&config.source_path).map_err(|e| e.to_string())?;

    let rows = {
        let model = workbook.sheet(&config.model_sheet).map_err(|e| e.to_string())?;
        workbook.sheet(&config.human_sheet).map_err(|e| e.to_string())?;
        match config.row_range {
            Some(range) => range.start..range.end,
            None => 1..model.row_count(),
        }
    };
    let stats_row = config.stats_row.unwrap_or(rows.end + 1);

    let mut reports = Vec::new();
    for column in config.code_column_range.iter() {
        let (verdicts, pairs) = {
            let human = workbook.sheet(&config.human_sheet).map_err(|e| e.to_string())?;
            let model = workbook.sheet(&config.model_sheet).map_err(|e| e.to_string())?;
            compare_column(human, model, rows.clone(), column)
        };

        let kappa = kappa::cohen_kappa(&pairs);
        let matched = verdicts.iter().filter(|(_, agree)| *agree).count();
        let mismatched = verdicts.len() - matched;
        info!(
            "column {column}: kappa={}, {matched} matched, {mismatched} mismatched",
            kappa.map_or("nan".to_string(), |k| k.to_string())
        );

        let sheet = workbook.sheet_mut(&config.model_sheet).map_err(|e| e.to_string())?;
        for (row, agree) in &verdicts {
            sheet.set_fill(*row, column, if *agree { GREEN_FILL } else { RED_FILL });
        }
        sheet.set_value(
            stats_row,
            column,
            CellValue::text(kappa.map_or("nan".to_string(), |k| k.to_string())),
        );
        sheet.set_value(
            stats_row + 1,
            column,
            CellValue::text(kappa::interpretation(kappa)),
        );
        sheet.set_value(stats_row + 3, column, CellValue::Number(matched as f64));
        sheet.set_value(stats_row + 4, column, CellValue::Number(mismatched as f64));
        workbook.save().map_err(|e| e.to_string())?;

        reports.push(ColumnReport {
            column,
            kappa,
            matched,
            mismatched,
        });
    }

    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(path: &Path) -> AgreementConfig {
        let mut workbook = Workbook::new(path);
        let human = workbook.add_sheet("Human");
        human.set_value(0, 6, CellValue::text("engagement"));
        human.set_value(1, 6, CellValue::Number(1.0));
        human.set_value(2, 6, CellValue::Number(0.0));
        human.set_value(3, 6, CellValue::Number(1.0));
        human.set_value(4, 6, CellValue::Number(1.0));

        let model = workbook.add_sheet("Codification");
        model.set_value(0, 6, CellValue::text("engagement"));
        model.set_value(1, 6, CellValue::text("1"));
        model.set_value(2, 6, CellValue::text("0"));
        model.set_value(3, 6, CellValue::text("0"));
        model.set_value(4, 6, CellValue::text("1"));
        workbook.save().unwrap();

        serde_json::from_value(serde_json::json!({
            "source_path": path,
            "row_range": {"start": 1, "end": 5},
            "code_column_range": {"start": 6, "end": 7},
        }))
        .unwrap()
    }

    #[test]
    fn reference_column_reports_moderate_agreement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.workbook.json");
        let config = fixture(&path);

        let reports = run(&config).unwrap();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert!((report.kappa.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(report.matched, 3);
        assert_eq!(report.mismatched, 1);

        let on_disk = Workbook::load(&path).unwrap();
        let sheet = on_disk.sheet("Codification").unwrap();
        assert_eq!(sheet.fill(1, 6), Some(GREEN_FILL));
        assert_eq!(sheet.fill(3, 6), Some(RED_FILL));
        // Aggregate block: one blank row below the data.
        assert_eq!(sheet.value(6, 6).to_string(), "0.5");
        assert_eq!(sheet.value(7, 6), &CellValue::text("Moderate agreement"));
        assert_eq!(sheet.value(9, 6), &CellValue::Number(3.0));
        assert_eq!(sheet.value(10, 6), &CellValue::Number(1.0));
    }

    #[test]
    fn missing_human_label_counts_as_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.workbook.json");
        let config = fixture(&path);

        // Blank out a human 0; the model's 0 should still match it.
        let mut workbook = Workbook::load(&path).unwrap();
        workbook
            .sheet_mut("Human")
            .unwrap()
            .set_value(2, 6, CellValue::Empty);
        workbook.save().unwrap();

        let reports = run(&config).unwrap();
        assert_eq!(reports[0].matched, 3);
    }

    #[test]
    fn missing_model_label_is_a_mismatch_excluded_from_kappa() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.workbook.json");
        let config = fixture(&path);

        let mut workbook = Workbook::load(&path).unwrap();
        workbook
            .sheet_mut("Codification")
            .unwrap()
            .set_value(3, 6, CellValue::text("Error"));
        workbook.save().unwrap();

        let reports = run(&config).unwrap();
        let report = &reports[0];
        assert_eq!(report.mismatched, 1, "the Error cell stays a mismatch");
        // Remaining pairs agree perfectly on mixed labels: kappa = 1.
        assert!((report.kappa.unwrap() - 1.0).abs() < 1e-9);

        let on_disk = Workbook::load(&path).unwrap();
        let sheet = on_disk.sheet("Codification").unwrap();
        assert_eq!(sheet.fill(3, 6), Some(RED_FILL));
    }

    #[test]
    fn missing_sheet_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("comparison.workbook.json");
        let mut workbook = Workbook::new(&path);
        workbook.add_sheet("Codification");
        workbook.save().unwrap();

        let config: AgreementConfig = serde_json::from_value(serde_json::json!({
            "source_path": path,
        }))
        .unwrap();
        let err = run(&config).unwrap_err();
        assert!(err.contains("Human"));
    }
}
