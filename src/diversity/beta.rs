//! Between-sample (beta) diversity.

use crate::data::CountMatrix;
use crate::error::{CommunityError, Result};
use nalgebra::DMatrix;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A symmetric sample × sample distance matrix with a zero diagonal.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceMatrix {
    sample_ids: Vec<String>,
    data: DMatrix<f64>,
}

impl DistanceMatrix {
    /// Wrap a square matrix, checking symmetry, a zero diagonal and
    /// non-negative finite entries.
    pub fn new(sample_ids: Vec<String>, data: DMatrix<f64>) -> Result<Self> {
        let n = sample_ids.len();
        if data.nrows() != n || data.ncols() != n {
            return Err(CommunityError::DimensionMismatch {
                expected: n,
                actual: data.nrows().max(data.ncols()),
            });
        }
        for i in 0..n {
            if data[(i, i)].abs() > 1e-12 {
                return Err(CommunityError::InvalidParameter(format!(
                    "distance matrix diagonal must be zero (sample '{}')",
                    sample_ids[i]
                )));
            }
            for j in (i + 1)..n {
                let d = data[(i, j)];
                if !d.is_finite() || d < 0.0 {
                    return Err(CommunityError::Numerical(format!(
                        "invalid distance {} between '{}' and '{}'",
                        d, sample_ids[i], sample_ids[j]
                    )));
                }
                if (d - data[(j, i)]).abs() > 1e-12 {
                    return Err(CommunityError::InvalidParameter(format!(
                        "distance matrix is not symmetric at ('{}', '{}')",
                        sample_ids[i], sample_ids[j]
                    )));
                }
            }
        }
        Ok(Self { sample_ids, data })
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    #[inline]
    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[(i, j)]
    }

    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Upper-triangle distances in row order: (0,1), (0,2), ..., (1,2), ...
    pub fn condensed(&self) -> Vec<f64> {
        let n = self.n_samples();
        let mut out = Vec::with_capacity(n * n.saturating_sub(1) / 2);
        for i in 0..n {
            for j in (i + 1)..n {
                out.push(self.data[(i, j)]);
            }
        }
        out
    }

    /// Write as a square TSV with sample IDs as row and column headers.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write!(writer, "sample_id")?;
        for sid in &self.sample_ids {
            write!(writer, "\t{}", sid)?;
        }
        writeln!(writer)?;
        for (i, sid) in self.sample_ids.iter().enumerate() {
            write!(writer, "{}", sid)?;
            for j in 0..self.n_samples() {
                write!(writer, "\t{:.6}", self.data[(i, j)])?;
            }
            writeln!(writer)?;
        }
        Ok(())
    }
}

/// Bray-Curtis dissimilarity between two count profiles.
///
/// BC = Σ|a_i - b_i| / Σ(a_i + b_i), in `[0, 1]`.
///
/// # Errors
/// Fails on length mismatch or when both profiles are all zero.
pub fn bray_curtis(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(CommunityError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let (num, den) = a
        .iter()
        .zip(b)
        .fold((0.0, 0.0), |(num, den), (&x, &y)| (num + (x - y).abs(), den + x + y));
    if den <= 0.0 {
        return Err(CommunityError::Precondition(
            "Bray-Curtis is undefined for two empty samples".to_string(),
        ));
    }
    Ok(num / den)
}

/// Pairwise Bray-Curtis distances between all samples of a count matrix.
///
/// Computed on per-sample relative abundances, the same profiles SIMPER
/// decomposes, so the mean cross-group entry equals
/// [`SimperResult::overall_dissimilarity`](crate::discriminant::SimperResult).
pub fn bray_curtis_matrix(counts: &CountMatrix) -> Result<DistanceMatrix> {
    let n = counts.n_samples();
    if n < 2 {
        return Err(CommunityError::Precondition(
            "at least 2 samples are required for a distance matrix".to_string(),
        ));
    }
    let rel = counts.relative_abundance();
    let profiles: Vec<Vec<f64>> = (0..n).map(|c| rel.column(c).iter().copied().collect()).collect();

    let mut data = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in (i + 1)..n {
            let d = bray_curtis(&profiles[i], &profiles[j]).map_err(|e| match e {
                CommunityError::Precondition(_) => CommunityError::Precondition(format!(
                    "samples '{}' and '{}' are both empty",
                    counts.sample_ids()[i],
                    counts.sample_ids()[j]
                )),
                other => other,
            })?;
            data[(i, j)] = d;
            data[(j, i)] = d;
        }
    }
    DistanceMatrix::new(counts.sample_ids().to_vec(), data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn counts() -> CountMatrix {
        CountMatrix::from_sample_rows(
            &[vec![10, 0, 5], vec![10, 0, 5], vec![0, 20, 0], vec![5, 5, 5]],
            vec!["t1".into(), "t2".into(), "t3".into()],
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_bray_curtis_bounds() {
        assert_relative_eq!(bray_curtis(&[1.0, 2.0], &[1.0, 2.0]).unwrap(), 0.0);
        assert_relative_eq!(bray_curtis(&[3.0, 0.0], &[0.0, 3.0]).unwrap(), 1.0);
        // |10-5| + |0-5| + |5-5| = 10 over 30
        assert_relative_eq!(
            bray_curtis(&[10.0, 0.0, 5.0], &[5.0, 5.0, 5.0]).unwrap(),
            1.0 / 3.0,
            epsilon = 1e-12
        );
        assert!(bray_curtis(&[0.0], &[0.0]).is_err());
        assert!(bray_curtis(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_matrix_symmetric_zero_diagonal() {
        let dm = bray_curtis_matrix(&counts()).unwrap();
        assert_eq!(dm.n_samples(), 4);
        for i in 0..4 {
            assert_eq!(dm.get(i, i), 0.0);
            for j in 0..4 {
                assert_relative_eq!(dm.get(i, j), dm.get(j, i));
            }
        }
        assert_relative_eq!(dm.get(0, 1), 0.0);
        assert_relative_eq!(dm.get(0, 2), 1.0);
        assert_eq!(dm.condensed().len(), 6);
    }

    #[test]
    fn test_matrix_ignores_depth() {
        // s2 is s1 at ten times the depth
        let counts = CountMatrix::from_sample_rows(
            &[vec![10, 30], vec![100, 300], vec![40, 0]],
            vec!["t1".into(), "t2".into()],
            vec!["s1".into(), "s2".into(), "s3".into()],
        )
        .unwrap();
        let dm = bray_curtis_matrix(&counts).unwrap();
        assert_relative_eq!(dm.get(0, 1), 0.0, epsilon = 1e-12);
        // (|0.25 - 1| + |0.75 - 0|) / 2
        assert_relative_eq!(dm.get(0, 2), 0.75, epsilon = 1e-12);
        assert_relative_eq!(dm.get(1, 2), 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_asymmetric() {
        let mut data = DMatrix::zeros(2, 2);
        data[(0, 1)] = 0.3;
        data[(1, 0)] = 0.4;
        assert!(DistanceMatrix::new(vec!["a".into(), "b".into()], data).is_err());
    }
}
