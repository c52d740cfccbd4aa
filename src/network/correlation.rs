//! Pairwise Spearman correlation among taxa.
//!
//! Each taxon's relative abundances are ranked once (average ranks for
//! ties); the coefficient is the Pearson correlation of the rank vectors.
//! Significance uses t = r·√((n−2)/(1−r²)) against Student's t with n − 2
//! degrees of freedom. A perfect correlation (|r| = 1) gets p = 0, and a
//! taxon with zero variance gets NaN for both coefficient and p-value.

use crate::data::CountMatrix;
use crate::error::{CommunityError, Result};
use crate::test::rank_average;
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// |r| within this distance of 1 is treated as a perfect correlation.
const PERFECT_EPS: f64 = 1e-12;

/// One unordered taxon pair from the upper triangle (`index_a < index_b`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationEdge {
    pub taxon_a: String,
    pub taxon_b: String,
    pub index_a: usize,
    pub index_b: usize,
    pub coefficient: f64,
    pub p_value: f64,
}

/// Symmetric coefficient and p-value matrices over a taxon set.
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    taxon_ids: Vec<String>,
    n_samples: usize,
    r: DMatrix<f64>,
    p: DMatrix<f64>,
}

impl CorrelationMatrix {
    pub fn n_taxa(&self) -> usize {
        self.taxon_ids.len()
    }

    /// Number of samples the correlations were computed over.
    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    pub fn coefficient(&self, i: usize, j: usize) -> f64 {
        self.r[(i, j)]
    }

    pub fn p_value(&self, i: usize, j: usize) -> f64 {
        self.p[(i, j)]
    }

    /// Coefficient matrix R (T × T).
    pub fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    /// P-value matrix (T × T).
    pub fn p(&self) -> &DMatrix<f64> {
        &self.p
    }

    /// Flatten to the upper triangle: exactly T(T−1)/2 pairs, no diagonal.
    pub fn edges(&self) -> Vec<CorrelationEdge> {
        let t = self.n_taxa();
        let mut edges = Vec::with_capacity(t * t.saturating_sub(1) / 2);
        for i in 0..t {
            for j in (i + 1)..t {
                edges.push(CorrelationEdge {
                    taxon_a: self.taxon_ids[i].clone(),
                    taxon_b: self.taxon_ids[j].clone(),
                    index_a: i,
                    index_b: j,
                    coefficient: self.r[(i, j)],
                    p_value: self.p[(i, j)],
                });
            }
        }
        edges
    }

    /// Write the flattened pair list as TSV.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "taxon_a\ttaxon_b\tcoefficient\tp_value")?;
        for e in self.edges() {
            writeln!(
                writer,
                "{}\t{}\t{:.6}\t{:.3e}",
                e.taxon_a, e.taxon_b, e.coefficient, e.p_value
            )?;
        }
        Ok(())
    }
}

/// Spearman rank correlation of two equal-length series.
///
/// Returns NaN when either series has zero variance.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<f64> {
    if x.len() != y.len() {
        return Err(CommunityError::DimensionMismatch {
            expected: x.len(),
            actual: y.len(),
        });
    }
    let (rx, _) = rank_average(x);
    let (ry, _) = rank_average(y);
    Ok(pearson(&rx, &ry))
}

/// Two-sided p-value for a correlation coefficient over `n` observations.
pub fn correlation_p_value(r: f64, n: usize) -> f64 {
    if r.is_nan() {
        return f64::NAN;
    }
    if 1.0 - r.abs() <= PERFECT_EPS {
        return 0.0;
    }
    if n < 3 {
        return f64::NAN;
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => f64::NAN,
    }
}

/// Spearman R and P matrices among all taxa of `counts`.
///
/// Correlations are computed on per-sample relative abundances.
pub fn spearman_matrix(counts: &CountMatrix) -> Result<CorrelationMatrix> {
    let t = counts.n_taxa();
    let n = counts.n_samples();
    if t < 2 {
        return Err(CommunityError::DegenerateFilter(format!(
            "correlation needs at least 2 taxa, found {}",
            t
        )));
    }
    if n < 2 {
        return Err(CommunityError::Precondition(format!(
            "correlation needs at least 2 samples, found {}",
            n
        )));
    }

    let rel = counts.relative_abundance();
    let ranks: Vec<Vec<f64>> = (0..t)
        .into_par_iter()
        .map(|i| {
            let row: Vec<f64> = rel.row(i).iter().copied().collect();
            rank_average(&row).0
        })
        .collect();

    let upper: Vec<Vec<(f64, f64)>> = (0..t)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..t)
                .map(|j| {
                    let r = pearson(&ranks[i], &ranks[j]);
                    (r, correlation_p_value(r, n))
                })
                .collect()
        })
        .collect();

    let mut r = DMatrix::from_element(t, t, f64::NAN);
    let mut p = DMatrix::from_element(t, t, f64::NAN);
    for (i, row) in upper.iter().enumerate() {
        for (offset, &(rij, pij)) in row.iter().enumerate() {
            let j = i + 1 + offset;
            r[(i, j)] = rij;
            r[(j, i)] = rij;
            p[(i, j)] = pij;
            p[(j, i)] = pij;
        }
        if has_variance(&ranks[i]) {
            r[(i, i)] = 1.0;
            p[(i, i)] = 0.0;
        }
    }

    tracing::debug!(n_taxa = t, n_samples = n, "computed Spearman matrix");

    Ok(CorrelationMatrix {
        taxon_ids: counts.taxon_ids().to_vec(),
        n_samples: n,
        r,
        p,
    })
}

fn has_variance(values: &[f64]) -> bool {
    values.windows(2).any(|w| w[0] != w[1])
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len() as f64;
    if n == 0.0 {
        return f64::NAN;
    }
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let denom = (var_x * var_y).sqrt();
    if denom == 0.0 {
        return f64::NAN;
    }
    (cov / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn counts(rows: &[Vec<u64>]) -> CountMatrix {
        let n_taxa = rows[0].len();
        let taxa = (1..=n_taxa).map(|i| format!("t{}", i)).collect();
        let samples = (1..=rows.len()).map(|i| format!("S{}", i)).collect();
        CountMatrix::from_sample_rows(rows, taxa, samples).unwrap()
    }

    #[test]
    fn test_spearman_monotonic() {
        let x = [1.0, 2.0, 3.0, 4.0, 5.0];
        let y = [1.0, 8.0, 27.0, 64.0, 125.0];
        assert_relative_eq!(spearman(&x, &y).unwrap(), 1.0, epsilon = 1e-12);
        let rev = [5.0, 4.0, 3.0, 2.0, 1.0];
        assert_relative_eq!(spearman(&x, &rev).unwrap(), -1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_spearman_constant_is_nan() {
        assert!(spearman(&[1.0, 2.0, 3.0], &[4.0, 4.0, 4.0]).unwrap().is_nan());
    }

    #[test]
    fn test_p_value_rules() {
        assert_eq!(correlation_p_value(1.0, 2), 0.0);
        assert_eq!(correlation_p_value(-1.0, 10), 0.0);
        assert!(correlation_p_value(f64::NAN, 10).is_nan());
        assert_relative_eq!(correlation_p_value(0.0, 10), 1.0, epsilon = 1e-12);
        // r = 0.5, n = 12: t = 0.5 * sqrt(10 / 0.75) = 1.8257, p ≈ 0.0980
        assert_relative_eq!(correlation_p_value(0.5, 12), 0.0980, epsilon = 1e-3);
    }

    #[test]
    fn test_matrix_symmetric() {
        let m = counts(&[
            vec![10, 5, 1, 7],
            vec![20, 4, 2, 7],
            vec![30, 3, 9, 7],
            vec![40, 2, 4, 7],
            vec![50, 1, 3, 7],
        ]);
        let corr = spearman_matrix(&m).unwrap();
        assert_eq!(corr.n_taxa(), 4);
        for i in 0..4 {
            for j in 0..4 {
                let (a, b) = (corr.coefficient(i, j), corr.coefficient(j, i));
                assert!(a == b || (a.is_nan() && b.is_nan()));
            }
        }
    }

    #[test]
    fn test_edge_count_is_upper_triangle() {
        for t in 2..7 {
            let rows: Vec<Vec<u64>> = (0..5)
                .map(|s| (0..t).map(|k| ((s * 7 + k * 3) % 11 + 1) as u64).collect())
                .collect();
            let corr = spearman_matrix(&counts(&rows)).unwrap();
            let edges = corr.edges();
            assert_eq!(edges.len(), t * (t - 1) / 2);
            assert!(edges.iter().all(|e| e.index_a < e.index_b));
        }
    }

    #[test]
    fn test_single_taxon_is_degenerate() {
        let m = counts(&[vec![1], vec![2]]);
        let err = spearman_matrix(&m).unwrap_err();
        assert!(matches!(err, CommunityError::DegenerateFilter(_)));
    }
}
