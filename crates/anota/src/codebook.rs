//! The codebook and fuzzy header-to-code resolution.
//!
//! Spreadsheet headers are typed by humans and drift from the canonical code
//! keys ("engagment" for "engagement"), so each raw header is matched to the
//! closest key by normalized edit-distance similarity. Resolution is
//! deliberately lossy: a header no key clears the cutoff for is kept
//! verbatim, and its later definition/example lookups return placeholders
//! instead of erroring. A false match degrades prompt quality, never the
//! pipeline.

use crate::config::ColumnRange;
use crate::store::Sheet;
use std::collections::HashMap;

pub const NO_DEFINITION: &str = "No definition available";
pub const NO_EXAMPLE: &str = "No example available";

// ── Code definitions ───────────────────────────────────────────────

/// One named construct: its canonical lowercased key, definition, example.
#[derive(Debug, Clone)]
pub struct CodeDefinition {
    pub name: String,
    pub definition: String,
    pub example: String,
}

/// All known codes, loaded once from the `Codes` sheet and immutable for
/// the run. Keys are unique and lowercased.
#[derive(Debug)]
pub struct CodeBook {
    codes: HashMap<String, CodeDefinition>,
}

impl CodeBook {
    /// Read the codebook from a `[code_key, definition, example]` sheet:
    /// header at row 0, data from row 1. Rows with a blank key are skipped;
    /// blank definitions and examples become placeholders.
    pub fn from_sheet(sheet: &Sheet) -> Self {
        let mut codes = HashMap::new();
        for row in 1..sheet.row_count() {
            let key_cell = sheet.value(row, 0);
            if key_cell.is_empty() {
                continue;
            }
            let name = key_cell.to_string().trim().to_lowercase();
            let definition = non_empty_or(sheet.value(row, 1), NO_DEFINITION);
            let example = non_empty_or(sheet.value(row, 2), NO_EXAMPLE);
            codes.insert(
                name.clone(),
                CodeDefinition {
                    name,
                    definition,
                    example,
                },
            );
        }
        Self { codes }
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// The definition for a resolved name, or the placeholder for names that
    /// never resolved to a real key.
    pub fn definition(&self, name: &str) -> &str {
        self.codes
            .get(name)
            .map_or(NO_DEFINITION, |c| c.definition.as_str())
    }

    pub fn example(&self, name: &str) -> &str {
        self.codes
            .get(name)
            .map_or(NO_EXAMPLE, |c| c.example.as_str())
    }

    /// The closest canonical key to `raw`, if any clears the cutoff.
    pub fn resolve(&self, raw: &str, cutoff: f64) -> Option<String> {
        best_match(raw, self.codes.keys().map(|k| k.as_str()), cutoff).map(|k| k.to_string())
    }
}

fn non_empty_or(value: &crate::store::CellValue, placeholder: &str) -> String {
    if value.is_empty() {
        placeholder.to_string()
    } else {
        value.to_string().trim().to_string()
    }
}

// ── Similarity ─────────────────────────────────────────────────────

/// Normalized edit-distance similarity in `[0, 1]`: 1.0 for identical
/// strings, 0.0 for strings sharing nothing at the same length.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Classic two-row edit-distance table over characters.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr[j + 1] = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// The single best-scoring candidate at or above `cutoff`, if any.
pub fn best_match<'a>(
    needle: &str,
    candidates: impl Iterator<Item = &'a str>,
    cutoff: f64,
) -> Option<&'a str> {
    candidates
        .map(|c| (c, similarity(needle, c)))
        .filter(|(_, score)| *score >= cutoff)
        .max_by(|(_, x), (_, y)| x.total_cmp(y))
        .map(|(c, _)| c)
}

// ── Column resolution ──────────────────────────────────────────────

/// Maps one physical code column to its canonical code name. Produced once
/// per column before any annotation and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnBinding {
    pub column: usize,
    pub raw_header: String,
    pub resolved: String,
}

/// Bind every header cell in `range` (read from the sheet's row 0) to its
/// closest code key, keeping unmatched headers verbatim.
pub fn resolve_columns(
    sheet: &Sheet,
    range: &ColumnRange,
    codebook: &CodeBook,
    cutoff: f64,
) -> Vec<ColumnBinding> {
    range
        .iter()
        .map(|column| {
            let raw_header = sheet.value(0, column).to_string().trim().to_lowercase();
            let resolved = codebook
                .resolve(&raw_header, cutoff)
                .unwrap_or_else(|| raw_header.clone());
            ColumnBinding {
                column,
                raw_header,
                resolved,
            }
        })
        .collect()
}
