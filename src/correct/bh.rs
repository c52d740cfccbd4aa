//! Benjamini-Hochberg false discovery rate correction.

use crate::error::{CommunityError, Result};
use serde::{Deserialize, Serialize};

/// One BH-corrected family: IDs, raw p-values and q-values in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BhCorrected {
    pub taxon_ids: Vec<String>,
    pub p_values: Vec<f64>,
    pub q_values: Vec<f64>,
}

impl BhCorrected {
    pub fn len(&self) -> usize {
        self.q_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q_values.is_empty()
    }

    /// `(taxon_id, p, q)` triples in input order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64, f64)> {
        self.taxon_ids
            .iter()
            .zip(&self.p_values)
            .zip(&self.q_values)
            .map(|((id, &p), &q)| (id.as_str(), p, q))
    }
}

/// Benjamini-Hochberg adjusted p-values, in input order.
///
/// For p-values sorted ascending, q[i] = min(p[i] * m / rank[i], q[i+1]),
/// computed from the largest rank down and clipped to [0, 1].
///
/// # Errors
/// Rejects NaN and values outside [0, 1].
pub fn adjust(p_values: &[f64]) -> Result<Vec<f64>> {
    if let Some(bad) = p_values.iter().find(|p| !(0.0..=1.0).contains(*p)) {
        return Err(CommunityError::InvalidParameter(format!(
            "p-values must lie in [0, 1], got {}",
            bad
        )));
    }

    let n = p_values.len();
    if n == 0 {
        return Ok(Vec::new());
    }

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));

    let mut q_sorted = vec![0.0; n];
    let n_f64 = n as f64;

    // Start from largest p-value
    q_sorted[n - 1] = p_values[indices[n - 1]].min(1.0);

    for i in (0..n - 1).rev() {
        let rank = i + 1;
        let adjusted = p_values[indices[i]] * n_f64 / rank as f64;
        q_sorted[i] = adjusted.min(q_sorted[i + 1]).min(1.0);
    }

    let mut q_values = vec![0.0; n];
    for (i, &orig_idx) in indices.iter().enumerate() {
        q_values[orig_idx] = q_sorted[i];
    }
    Ok(q_values)
}

/// BH-correct one family, keeping taxon IDs alongside.
///
/// # Errors
/// Fails when `p_values` and `taxon_ids` differ in length, or as [`adjust`].
pub fn correct_bh(p_values: &[f64], taxon_ids: &[String]) -> Result<BhCorrected> {
    if p_values.len() != taxon_ids.len() {
        return Err(CommunityError::DimensionMismatch {
            expected: p_values.len(),
            actual: taxon_ids.len(),
        });
    }

    let q_values = adjust(p_values)?;

    Ok(BhCorrected {
        taxon_ids: taxon_ids.to_vec(),
        p_values: p_values.to_vec(),
        q_values,
    })
}
