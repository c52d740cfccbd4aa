//! SIMPER: similarity percentage decomposition of Bray-Curtis dissimilarity.
//!
//! For every pair (i ∈ A, j ∈ B) the Bray-Curtis dissimilarity on relative
//! abundances splits into per-taxon terms
//!
//! δ_ijk = |x_ik − x_jk| / Σ_k (x_ik + x_jk)
//!
//! which sum to the pair's dissimilarity. SIMPER averages these over all
//! cross-group pairs.
//!
//! # Caveat
//!
//! Abundant taxa have larger absolute differences, so the ranking tracks
//! mean abundance more than group separation. Use
//! [`SimperResult::abundance_rank_correlation`] to see how strongly a given
//! ranking is driven by abundance, and confirm candidates with a
//! per-taxon test.

use crate::data::CountMatrix;
use crate::error::{CommunityError, Result};
use crate::network::spearman;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Contribution of one taxon to between-group dissimilarity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimperTaxon {
    pub taxon_id: String,
    /// Mean contribution over all cross-group pairs.
    pub average: f64,
    /// Standard deviation of the contribution over pairs.
    pub sd: f64,
    /// average / sd; `None` when sd is zero.
    pub ratio: Option<f64>,
    /// Mean relative abundance in group A.
    pub mean_a: f64,
    /// Mean relative abundance in group B.
    pub mean_b: f64,
    /// Cumulative share of total dissimilarity up to and including this taxon.
    pub cumulative: f64,
}

/// SIMPER decomposition between two groups, sorted by average contribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimperResult {
    pub group_a: String,
    pub group_b: String,
    /// Number of cross-group sample pairs.
    pub n_pairs: usize,
    /// Mean Bray-Curtis dissimilarity between the groups.
    pub overall_dissimilarity: f64,
    pub taxa: Vec<SimperTaxon>,
}

impl SimperResult {
    /// IDs of the `n` largest contributors.
    pub fn top(&self, n: usize) -> Vec<String> {
        self.taxa.iter().take(n).map(|t| t.taxon_id.clone()).collect()
    }

    /// Spearman correlation between each taxon's average contribution and
    /// its mean abundance over both groups.
    ///
    /// Values near 1 mean the ranking is mostly an abundance ranking.
    pub fn abundance_rank_correlation(&self) -> Result<f64> {
        let contributions: Vec<f64> = self.taxa.iter().map(|t| t.average).collect();
        let abundances: Vec<f64> = self.taxa.iter().map(|t| (t.mean_a + t.mean_b) / 2.0).collect();
        spearman(&contributions, &abundances)
    }

    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(
            writer,
            "taxon_id\taverage\tsd\tratio\tmean_{}\tmean_{}\tcumulative",
            self.group_a, self.group_b
        )?;
        for t in &self.taxa {
            let ratio = t.ratio.map(|r| format!("{:.4}", r)).unwrap_or_else(|| "NA".to_string());
            writeln!(
                writer,
                "{}\t{:.6}\t{:.6}\t{}\t{:.6}\t{:.6}\t{:.4}",
                t.taxon_id, t.average, t.sd, ratio, t.mean_a, t.mean_b, t.cumulative
            )?;
        }
        Ok(())
    }
}

/// Decompose the Bray-Curtis dissimilarity between `group_a` and `group_b`.
///
/// `groups` holds one label per sample, in matrix column order; samples
/// with other labels are ignored.
///
/// # Errors
/// * label count differs from sample count
/// * either group has no samples, or the two labels are equal
/// * a sample in either group has zero depth
pub fn simper<S: AsRef<str>>(
    counts: &CountMatrix,
    groups: &[S],
    group_a: &str,
    group_b: &str,
) -> Result<SimperResult> {
    if groups.len() != counts.n_samples() {
        return Err(CommunityError::DimensionMismatch {
            expected: counts.n_samples(),
            actual: groups.len(),
        });
    }
    if group_a == group_b {
        return Err(CommunityError::InvalidParameter(format!(
            "SIMPER needs two distinct groups, got '{}' twice",
            group_a
        )));
    }

    let members = |label: &str| -> Vec<usize> {
        groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.as_ref() == label)
            .map(|(i, _)| i)
            .collect()
    };
    let a = members(group_a);
    let b = members(group_b);
    for (label, idx) in [(group_a, &a), (group_b, &b)] {
        if idx.is_empty() {
            return Err(CommunityError::Precondition(format!(
                "group '{}' has no samples",
                label
            )));
        }
    }

    let depths = counts.col_sums();
    if let Some(&s) = a.iter().chain(&b).find(|&&s| depths[s] == 0) {
        return Err(CommunityError::EmptyData(format!(
            "sample '{}' has zero depth",
            counts.sample_ids()[s]
        )));
    }

    let rel = counts.relative_abundance();
    let n_taxa = counts.n_taxa();
    let n_pairs = a.len() * b.len();

    // Welford accumulators per taxon
    let mut mean = vec![0.0; n_taxa];
    let mut m2 = vec![0.0; n_taxa];
    let mut seen = 0usize;
    for &i in &a {
        for &j in &b {
            let denom: f64 = rel.column(i).sum() + rel.column(j).sum();
            seen += 1;
            for k in 0..n_taxa {
                let delta = (rel[(k, i)] - rel[(k, j)]).abs() / denom;
                let diff = delta - mean[k];
                mean[k] += diff / seen as f64;
                m2[k] += diff * (delta - mean[k]);
            }
        }
    }

    let group_mean = |idx: &[usize], k: usize| -> f64 {
        idx.iter().map(|&s| rel[(k, s)]).sum::<f64>() / idx.len() as f64
    };

    let mut taxa: Vec<SimperTaxon> = (0..n_taxa)
        .map(|k| {
            let sd = if n_pairs > 1 {
                (m2[k] / (n_pairs - 1) as f64).sqrt()
            } else {
                0.0
            };
            SimperTaxon {
                taxon_id: counts.taxon_ids()[k].clone(),
                average: mean[k],
                sd,
                ratio: if sd > 0.0 { Some(mean[k] / sd) } else { None },
                mean_a: group_mean(&a, k),
                mean_b: group_mean(&b, k),
                cumulative: 0.0,
            }
        })
        .collect();

    taxa.sort_by(|x, y| {
        y.average
            .total_cmp(&x.average)
            .then_with(|| x.taxon_id.cmp(&y.taxon_id))
    });

    let overall: f64 = taxa.iter().map(|t| t.average).sum();
    let mut running = 0.0;
    for t in &mut taxa {
        running += t.average;
        t.cumulative = if overall > 0.0 { running / overall } else { 0.0 };
    }

    tracing::debug!(
        group_a,
        group_b,
        n_pairs,
        overall_dissimilarity = overall,
        "SIMPER finished"
    );

    Ok(SimperResult {
        group_a: group_a.to_string(),
        group_b: group_b.to_string(),
        n_pairs,
        overall_dissimilarity: overall,
        taxa,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diversity::{bray_curtis, bray_curtis_matrix};
    use approx::assert_relative_eq;

    fn counts() -> CountMatrix {
        CountMatrix::from_sample_rows(
            &[
                vec![80, 10, 10, 0],
                vec![70, 20, 10, 0],
                vec![20, 10, 10, 60],
                vec![10, 20, 10, 60],
            ],
            vec!["t1".into(), "t2".into(), "t3".into(), "t4".into()],
            vec!["a1".into(), "a2".into(), "b1".into(), "b2".into()],
        )
        .unwrap()
    }

    const GROUPS: [&str; 4] = ["A", "A", "B", "B"];

    #[test]
    fn test_contributions_sum_to_bray_curtis() {
        let m = counts();
        let result = simper(&m, &GROUPS, "A", "B").unwrap();
        assert_eq!(result.n_pairs, 4);

        let rel = m.relative_abundance();
        let col = |c: usize| rel.column(c).iter().copied().collect::<Vec<_>>();
        let mut mean_bc = 0.0;
        for i in 0..2 {
            for j in 2..4 {
                mean_bc += bray_curtis(&col(i), &col(j)).unwrap();
            }
        }
        mean_bc /= 4.0;
        assert_relative_eq!(result.overall_dissimilarity, mean_bc, epsilon = 1e-12);
        assert_relative_eq!(result.taxa.last().unwrap().cumulative, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_overall_matches_distance_matrix() {
        // uneven depths: raw-count and proportion Bray-Curtis disagree here
        let m = CountMatrix::from_sample_rows(
            &[vec![100, 0], vec![10, 10], vec![0, 100], vec![5, 500]],
            vec!["t1".into(), "t2".into()],
            vec!["a1".into(), "a2".into(), "b1".into(), "b2".into()],
        )
        .unwrap();
        let result = simper(&m, &GROUPS, "A", "B").unwrap();

        let dm = bray_curtis_matrix(&m).unwrap();
        let cross: f64 = [(0, 2), (0, 3), (1, 2), (1, 3)]
            .iter()
            .map(|&(i, j)| dm.get(i, j))
            .sum::<f64>()
            / 4.0;
        assert_relative_eq!(result.overall_dissimilarity, cross, epsilon = 1e-12);
        // pairs: 1, (1 + 495/505)/2, 1/2, (495/505)/2
        assert_relative_eq!(cross, (2.0 + 495.0 / 505.0) / 4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_sorted_descending() {
        let result = simper(&counts(), &GROUPS, "A", "B").unwrap();
        for w in result.taxa.windows(2) {
            assert!(w[0].average >= w[1].average);
            assert!(w[0].cumulative <= w[1].cumulative);
        }
        // t3 is 10% everywhere and contributes nothing
        let t3 = result.taxa.iter().find(|t| t.taxon_id == "t3").unwrap();
        assert_relative_eq!(t3.average, 0.0, epsilon = 1e-12);
        assert!(t3.ratio.is_none());
        assert_eq!(result.top(2).len(), 2);
        assert!(!result.top(2).contains(&"t3".to_string()));
    }

    #[test]
    fn test_group_means() {
        let result = simper(&counts(), &GROUPS, "A", "B").unwrap();
        let t4 = result.taxa.iter().find(|t| t.taxon_id == "t4").unwrap();
        assert_relative_eq!(t4.mean_a, 0.0);
        assert_relative_eq!(t4.mean_b, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_abundance_rank_correlation_in_range() {
        let result = simper(&counts(), &GROUPS, "A", "B").unwrap();
        let rho = result.abundance_rank_correlation().unwrap();
        assert!((-1.0..=1.0).contains(&rho));
    }

    #[test]
    fn test_missing_group() {
        let err = simper(&counts(), &GROUPS, "A", "C").unwrap_err();
        assert!(matches!(err, CommunityError::Precondition(_)));
        assert!(simper(&counts(), &GROUPS, "A", "A").is_err());
    }

    #[test]
    fn test_to_tsv() {
        let result = simper(&counts(), &GROUPS, "A", "B").unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        result.to_tsv(file.path()).unwrap();
        let text = std::fs::read_to_string(file.path()).unwrap();
        assert!(text.starts_with("taxon_id\taverage\tsd\tratio\tmean_A\tmean_B\tcumulative"));
        assert_eq!(text.lines().count(), 5);
    }
}
