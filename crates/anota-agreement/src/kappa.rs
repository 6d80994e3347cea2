//! Cohen's kappa and its banded interpretation.
//!
//! Chance-corrected agreement between two raters over the same items:
//! `kappa = (po - pe) / (1 - pe)`, where `po` is the observed agreement
//! fraction and `pe` the agreement expected from each rater's label
//! marginals. Undefined (no pairs, or `pe = 1` because both raters are
//! constant) reports as "not enough data" rather than a number.

use std::collections::HashMap;

/// Interpretation bands (Landis & Koch thresholds).
pub const BANDS: [(f64, &str); 4] = [
    (0.20, "Slight agreement"),
    (0.40, "Fair agreement"),
    (0.60, "Moderate agreement"),
    (0.80, "Substantial agreement"),
];

pub const NOT_ENOUGH_DATA: &str = "Not enough data or insufficient unique labels";

/// Cohen's kappa over `(human, model)` rating pairs, or `None` when the
/// statistic is undefined.
pub fn cohen_kappa(pairs: &[(f64, f64)]) -> Option<f64> {
    if pairs.is_empty() {
        return None;
    }

    let n = pairs.len() as f64;
    let observed = pairs.iter().filter(|(a, b)| a == b).count() as f64 / n;

    let mut human_counts: HashMap<u64, f64> = HashMap::new();
    let mut model_counts: HashMap<u64, f64> = HashMap::new();
    for (human, model) in pairs {
        *human_counts.entry(human.to_bits()).or_default() += 1.0;
        *model_counts.entry(model.to_bits()).or_default() += 1.0;
    }

    let expected: f64 = human_counts
        .iter()
        .map(|(label, count)| count / n * model_counts.get(label).copied().unwrap_or(0.0) / n)
        .sum();

    let denominator = 1.0 - expected;
    if denominator.abs() < f64::EPSILON {
        return None;
    }
    Some((observed - expected) / denominator)
}

/// The qualitative band for a kappa value.
pub fn interpretation(kappa: Option<f64>) -> &'static str {
    let Some(kappa) = kappa else {
        return NOT_ENOUGH_DATA;
    };
    if kappa < 0.0 {
        return "Less than chance agreement";
    }
    for (threshold, label) in BANDS {
        if kappa <= threshold {
            return label;
        }
    }
    "Almost perfect agreement"
}
