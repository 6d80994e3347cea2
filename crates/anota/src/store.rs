//! Row/column-addressable workbook with write-through persistence.
//!
//! The store is a set of named sheets of cells, loaded from and saved to a
//! single JSON workbook file. Saving rewrites the whole file through a
//! temp-file-then-rename, and the pipeline saves after every individual cell
//! write, so a crash mid-run loses at most the in-flight judgment.
//! Addressing is zero-based for both reads and writes: the judgment for the
//! record read at (row, col) is written back to (row, col).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// ── Errors ─────────────────────────────────────────────────────────

/// Store failures. `MissingSheet` signals a configuration mismatch and is
/// checked before any annotation begins; it is never a per-cell condition.
#[derive(Debug)]
pub enum StoreError {
    Io(String),
    Parse(String),
    MissingSheet(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "workbook I/O error: {msg}"),
            Self::Parse(msg) => write!(f, "workbook parse error: {msg}"),
            Self::MissingSheet(name) => write!(f, "sheet '{name}' not found in the workbook"),
        }
    }
}

impl std::error::Error for StoreError {}

// ── Cells ──────────────────────────────────────────────────────────

/// One cell's content. `Empty` stringifies as `"nan"` so missing fields
/// degrade prompts visibly instead of erroring.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Empty,
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(t) => t.trim().is_empty(),
            Self::Number(_) => false,
        }
    }

    /// Numeric coercion: numbers pass through, numeric-looking text parses,
    /// anything else (including `Empty`) is `None`.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(t) => t.trim().parse().ok(),
            Self::Empty => None,
        }
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "nan"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(t) => write!(f, "{t}"),
        }
    }
}

/// A cell: its value plus an optional background fill (RGB hex, no `#`),
/// used by the agreement tool to flag matches and mismatches.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
}

static EMPTY: CellValue = CellValue::Empty;

// ── Sheets ─────────────────────────────────────────────────────────

/// A named grid of cells. Rows are dense and grow on write.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Sheet {
    pub name: String,
    rows: Vec<Vec<Cell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Read a cell value; anything outside the stored grid reads as `Empty`.
    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map_or(&EMPTY, |c| &c.value)
    }

    pub fn fill(&self, row: usize, col: usize) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .and_then(|c| c.fill.as_deref())
    }

    pub fn set_value(&mut self, row: usize, col: usize, value: CellValue) {
        self.cell_mut(row, col).value = value;
    }

    pub fn set_fill(&mut self, row: usize, col: usize, color: impl Into<String>) {
        self.cell_mut(row, col).fill = Some(color.into());
    }

    fn cell_mut(&mut self, row: usize, col: usize) -> &mut Cell {
        if self.rows.len() <= row {
            self.rows.resize_with(row + 1, Vec::new);
        }
        let cells = &mut self.rows[row];
        if cells.len() <= col {
            cells.resize_with(col + 1, Cell::default);
        }
        &mut cells[col]
    }
}

// ── Workbook ───────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Debug)]
struct WorkbookFile {
    sheets: Vec<Sheet>,
}

/// The persistent cell store: named sheets bound to one file on disk.
#[derive(Debug)]
pub struct Workbook {
    path: PathBuf,
    sheets: Vec<Sheet>,
}

impl Workbook {
    /// An empty workbook bound to `path`. Nothing is written until `save`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheets: Vec::new(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Io(format!("failed to read '{}': {e}", path.display())))?;
        let file: WorkbookFile = serde_json::from_str(&content)
            .map_err(|e| StoreError::Parse(format!("'{}': {e}", path.display())))?;
        Ok(Self {
            path: path.to_path_buf(),
            sheets: file.sheets,
        })
    }

    pub fn sheet(&self, name: &str) -> Result<&Sheet, StoreError> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::MissingSheet(name.to_string()))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Result<&mut Sheet, StoreError> {
        self.sheets
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| StoreError::MissingSheet(name.to_string()))
    }

    /// Add an empty sheet and return it. Replaces nothing; callers use it
    /// when building fixtures or fresh workbooks.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> &mut Sheet {
        self.sheets.push(Sheet::new(name));
        self.sheets.last_mut().unwrap()
    }

    /// Flush the whole workbook durably. The pipeline calls this after every
    /// cell write (write-through); batching would trade crash-safety for
    /// throughput and is deliberately not offered.
    pub fn save(&self) -> Result<(), StoreError> {
        let file = WorkbookFile {
            sheets: self.sheets.clone(),
        };
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| StoreError::Io(format!("failed to serialize workbook: {e}")))?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json).map_err(|e| {
            StoreError::Io(format!("failed to write '{}': {e}", tmp_path.display()))
        })?;
        std::fs::rename(&tmp_path, &self.path).map_err(|e| {
            StoreError::Io(format!("failed to replace '{}': {e}", self.path.display()))
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_cell_stringifies_as_nan() {
        let sheet = Sheet::new("Codification");
        assert_eq!(sheet.value(10, 10).to_string(), "nan");
        assert!(sheet.value(10, 10).is_empty());
    }

    #[test]
    fn set_value_grows_the_grid() {
        let mut sheet = Sheet::new("Codification");
        sheet.set_value(2, 3, CellValue::text("1"));
        assert_eq!(sheet.row_count(), 3);
        assert_eq!(sheet.value(2, 3), &CellValue::text("1"));
        assert_eq!(sheet.value(0, 0), &CellValue::Empty);
    }

    #[test]
    fn numeric_coercion_matches_the_agreement_rules() {
        assert_eq!(CellValue::Number(1.0).as_number(), Some(1.0));
        assert_eq!(CellValue::text(" 0 ").as_number(), Some(0.0));
        assert_eq!(CellValue::text("Error").as_number(), None);
        assert_eq!(CellValue::Empty.as_number(), None);
    }

    #[test]
    fn cell_values_round_trip_untagged() {
        let json = r#"[null, 1.5, "yes"]"#;
        let values: Vec<CellValue> = serde_json::from_str(json).unwrap();
        assert_eq!(
            values,
            vec![
                CellValue::Empty,
                CellValue::Number(1.5),
                CellValue::text("yes")
            ]
        );
        let back = serde_json::to_string(&values).unwrap();
        assert_eq!(back, r#"[null,1.5,"yes"]"#);
    }

    #[test]
    fn save_and_reload_preserve_cells_and_fills() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.workbook.json");

        let mut workbook = Workbook::new(&path);
        let sheet = workbook.add_sheet("Codification");
        sheet.set_value(1, 6, CellValue::text("1"));
        sheet.set_fill(1, 6, "ceffce");
        workbook.save().unwrap();

        let reloaded = Workbook::load(&path).unwrap();
        let sheet = reloaded.sheet("Codification").unwrap();
        assert_eq!(sheet.value(1, 6), &CellValue::text("1"));
        assert_eq!(sheet.fill(1, 6), Some("ceffce"));
    }

    #[test]
    fn write_through_persists_every_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.workbook.json");

        let mut workbook = Workbook::new(&path);
        workbook.add_sheet("Codification");
        for row in 1..4 {
            workbook
                .sheet_mut("Codification")
                .unwrap()
                .set_value(row, 6, CellValue::text("0"));
            workbook.save().unwrap();

            // Every save is observable on disk, not just the last one.
            let on_disk = Workbook::load(&path).unwrap();
            let sheet = on_disk.sheet("Codification").unwrap();
            assert_eq!(sheet.value(row, 6), &CellValue::text("0"));
        }
    }

    #[test]
    fn missing_sheet_is_a_structure_error() {
        let workbook = Workbook::new("never-saved.workbook.json");
        let err = workbook.sheet("Codes").unwrap_err();
        assert!(matches!(err, StoreError::MissingSheet(_)));
        assert!(err.to_string().contains("Codes"));
    }
}
