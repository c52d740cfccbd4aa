//! Relative-abundance filtering of taxa.

use crate::data::CountMatrix;
use crate::error::{CommunityError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Keep taxa whose total count exceeds `threshold` of the grand total.
///
/// Taxon `j` is retained iff `sum(j) > total * threshold`. A threshold of
/// zero excludes nothing, including taxa that are absent everywhere. The
/// filter is idempotent: the grand total can only shrink, so every retained
/// taxon still clears the bar on a second pass.
///
/// # Errors
/// * [`CommunityError::EmptyData`] if the matrix has no taxa or no samples
/// * [`CommunityError::InvalidParameter`] if `threshold` is outside `[0, 1)`
/// * [`CommunityError::DegenerateFilter`] if no taxon survives
pub fn filter_relative_abundance(counts: &CountMatrix, threshold: f64) -> Result<CountMatrix> {
    if counts.is_empty() {
        return Err(CommunityError::EmptyData(
            "cannot filter an empty count matrix".to_string(),
        ));
    }
    if !threshold.is_finite() || !(0.0..1.0).contains(&threshold) {
        return Err(CommunityError::InvalidParameter(format!(
            "abundance threshold must be in [0, 1), got {}",
            threshold
        )));
    }
    if threshold == 0.0 {
        return Ok(counts.clone());
    }

    let total = counts.total() as f64;
    let cutoff = total * threshold;
    let row_sums = counts.row_sums();

    let keep_indices: Vec<usize> = (0..counts.n_taxa())
        .into_par_iter()
        .filter(|&row| row_sums[row] as f64 > cutoff)
        .collect();

    if keep_indices.is_empty() {
        return Err(CommunityError::DegenerateFilter(format!(
            "no taxa exceed {:.2e} of {} total reads",
            threshold, total
        )));
    }

    tracing::debug!(
        threshold,
        before = counts.n_taxa(),
        after = keep_indices.len(),
        "abundance filter applied"
    );

    counts.subset_taxa(&keep_indices)
}

/// Result of abundance filtering with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbundanceFilterResult {
    pub threshold: f64,
    /// Number of taxa before filtering.
    pub n_before: usize,
    /// Number of taxa after filtering.
    pub n_after: usize,
    /// Number of taxa removed.
    pub n_removed: usize,
    /// Proportion of taxa retained.
    pub retention_rate: f64,
    /// Proportion of total reads retained.
    pub reads_retained: f64,
}

impl std::fmt::Display for AbundanceFilterResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Abundance Filter Result (threshold {:.1e})", self.threshold)?;
        writeln!(f, "  Taxa before:    {}", self.n_before)?;
        writeln!(f, "  Taxa after:     {}", self.n_after)?;
        writeln!(f, "  Taxa removed:   {}", self.n_removed)?;
        writeln!(f, "  Taxa retention: {:.1}%", self.retention_rate * 100.0)?;
        writeln!(f, "  Reads retained: {:.1}%", self.reads_retained * 100.0)?;
        Ok(())
    }
}

/// Filter with statistics about what was filtered.
pub fn filter_relative_abundance_with_stats(
    counts: &CountMatrix,
    threshold: f64,
) -> Result<(CountMatrix, AbundanceFilterResult)> {
    let n_before = counts.n_taxa();
    let total_before = counts.total();

    let filtered = filter_relative_abundance(counts, threshold)?;

    let n_after = filtered.n_taxa();
    let total_after = filtered.total();

    let result = AbundanceFilterResult {
        threshold,
        n_before,
        n_after,
        n_removed: n_before - n_after,
        retention_rate: n_after as f64 / n_before as f64,
        reads_retained: if total_before > 0 {
            total_after as f64 / total_before as f64
        } else {
            0.0
        },
    };

    Ok((filtered, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sprs::TriMat;

    fn create_test_matrix() -> CountMatrix {
        // 5 taxa × 4 samples, 1000 reads total
        let mut tri_mat = TriMat::new((5, 4));
        // 400 = 40%
        for col in 0..4 {
            tri_mat.add_triplet(0, col, 100);
        }
        // 300 = 30%
        for col in 0..4 {
            tri_mat.add_triplet(1, col, 75);
        }
        // 200 = 20%
        for col in 0..4 {
            tri_mat.add_triplet(2, col, 50);
        }
        // 90 = 9%
        for col in 0..3 {
            tri_mat.add_triplet(3, col, 30);
        }
        // 10 = 1%
        tri_mat.add_triplet(4, 0, 10);

        let taxon_ids: Vec<String> = (0..5).map(|i| format!("otu_{}", i)).collect();
        let sample_ids: Vec<String> = (0..4).map(|i| format!("S{}", i)).collect();
        CountMatrix::new(tri_mat.to_csr(), taxon_ids, sample_ids).unwrap()
    }

    fn scenario_matrix() -> CountMatrix {
        CountMatrix::from_sample_rows(
            &[
                vec![100, 0, 0, 0, 0],
                vec![90, 10, 0, 0, 0],
                vec![0, 0, 100, 0, 0],
                vec![0, 0, 90, 10, 0],
            ],
            (1..=5).map(|i| format!("t{}", i)).collect(),
            vec!["a1".into(), "a2".into(), "b1".into(), "b2".into()],
        )
        .unwrap()
    }

    #[test]
    fn test_threshold_is_strict() {
        let counts = create_test_matrix();
        // otu_2 has exactly 20%, which does not exceed 0.2
        let filtered = filter_relative_abundance(&counts, 0.20).unwrap();
        assert_eq!(filtered.taxon_ids(), &["otu_0", "otu_1"]);

        let filtered = filter_relative_abundance(&counts, 0.05).unwrap();
        assert_eq!(filtered.taxon_ids(), &["otu_0", "otu_1", "otu_2", "otu_3"]);
    }

    #[test]
    fn test_zero_threshold_is_identity() {
        let counts = scenario_matrix();
        let filtered = filter_relative_abundance(&counts, 0.0).unwrap();
        assert_eq!(filtered, counts);
        assert_eq!(filtered.n_taxa(), 5);
    }

    #[test]
    fn test_idempotent() {
        let counts = create_test_matrix();
        for &t in &[0.0, 0.005, 0.05, 0.15, 0.35] {
            let once = filter_relative_abundance(&counts, t).unwrap();
            let twice = filter_relative_abundance(&once, t).unwrap();
            assert_eq!(once, twice, "threshold {}", t);
        }
    }

    #[test]
    fn test_scenario_drops_absent_taxon() {
        // 400 reads in total: t2 and t4 carry 10 each (2.5%)
        let filtered = filter_relative_abundance(&scenario_matrix(), 0.02).unwrap();
        assert_eq!(filtered.taxon_ids(), &["t1", "t2", "t3", "t4"]);

        let filtered = filter_relative_abundance(&scenario_matrix(), 0.05).unwrap();
        assert_eq!(filtered.taxon_ids(), &["t1", "t3"]);
    }

    #[test]
    fn test_everything_removed_is_an_error() {
        let counts = create_test_matrix();
        let err = filter_relative_abundance(&counts, 0.5).unwrap_err();
        assert!(matches!(err, CommunityError::DegenerateFilter(_)));
    }

    #[test]
    fn test_invalid_threshold() {
        let counts = create_test_matrix();
        assert!(filter_relative_abundance(&counts, -0.1).is_err());
        assert!(filter_relative_abundance(&counts, 1.0).is_err());
        assert!(filter_relative_abundance(&counts, f64::NAN).is_err());
    }

    #[test]
    fn test_empty_matrix() {
        let empty = CountMatrix::new(TriMat::new((0, 3)).to_csr(), vec![], vec![
            "a".into(),
            "b".into(),
            "c".into(),
        ])
        .unwrap();
        assert!(matches!(
            filter_relative_abundance(&empty, 0.1),
            Err(CommunityError::EmptyData(_))
        ));
    }

    #[test]
    fn test_with_stats() {
        let counts = create_test_matrix();
        let (filtered, stats) = filter_relative_abundance_with_stats(&counts, 0.10).unwrap();

        assert_eq!(filtered.n_taxa(), 3);
        assert_eq!(stats.n_before, 5);
        assert_eq!(stats.n_after, 3);
        assert_eq!(stats.n_removed, 2);
        assert!((stats.retention_rate - 0.6).abs() < 1e-10);
        assert!((stats.reads_retained - 0.9).abs() < 1e-10);
    }
}
