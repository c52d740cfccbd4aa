//! Principal coordinates analysis (classical multidimensional scaling).
//!
//! 1. Square the distances: A = D²
//! 2. Gower double-centering: B = -0.5 (A - row means - col means + grand mean)
//! 3. Symmetric eigendecomposition of B, eigenvalues sorted descending
//! 4. Coordinates: X[i, k] = v_k[i] · √λ_k for positive λ_k

use super::beta::DistanceMatrix;
use crate::error::{CommunityError, Result};
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// PCoA ordination result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcoaResult {
    pub sample_ids: Vec<String>,
    /// Coordinates `[sample][axis]`.
    pub coordinates: Vec<Vec<f64>>,
    /// Eigenvalues of the retained axes, descending.
    pub eigenvalues: Vec<f64>,
    /// Share of positive-eigenvalue variance carried by each retained axis.
    pub proportion_explained: Vec<f64>,
}

/// Run PCoA, keeping at most `n_axes` axes (and at most n - 1).
pub fn pcoa(distances: &DistanceMatrix, n_axes: usize) -> Result<PcoaResult> {
    let n = distances.n_samples();
    if n < 2 {
        return Err(CommunityError::Precondition(
            "PCoA requires at least 2 samples".to_string(),
        ));
    }
    if n_axes == 0 {
        return Err(CommunityError::InvalidParameter(
            "PCoA needs at least one axis".to_string(),
        ));
    }
    let k = n_axes.min(n - 1);

    let d_sq = distances.data().map(|d| d * d);
    let row_means: Vec<f64> = (0..n).map(|i| d_sq.row(i).sum() / n as f64).collect();
    let grand_mean = row_means.iter().sum::<f64>() / n as f64;

    let centered = DMatrix::from_fn(n, n, |i, j| {
        -0.5 * (d_sq[(i, j)] - row_means[i] - row_means[j] + grand_mean)
    });

    let eigen = SymmetricEigen::new(centered);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let positive_sum: f64 = eigen.eigenvalues.iter().filter(|&&v| v > 0.0).sum();

    let eigenvalues: Vec<f64> = order[..k].iter().map(|&i| eigen.eigenvalues[i]).collect();
    let proportion_explained = eigenvalues
        .iter()
        .map(|&v| if positive_sum > 0.0 { v.max(0.0) / positive_sum } else { 0.0 })
        .collect();

    let mut coordinates = vec![vec![0.0; k]; n];
    for (axis, &col) in order[..k].iter().enumerate() {
        let scale = eigen.eigenvalues[col].max(0.0).sqrt();
        for (sample, row) in coordinates.iter_mut().enumerate() {
            row[axis] = eigen.eigenvectors[(sample, col)] * scale;
        }
    }

    Ok(PcoaResult {
        sample_ids: distances.sample_ids().to_vec(),
        coordinates,
        eigenvalues,
        proportion_explained,
    })
}
