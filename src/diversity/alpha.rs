//! Within-sample (alpha) diversity.

use crate::data::CountMatrix;
use crate::error::{CommunityError, Result};
use serde::{Deserialize, Serialize};

/// Alpha diversity summary for a single sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlphaDiversity {
    pub sample_id: String,
    /// Number of taxa with a non-zero count.
    pub observed: usize,
    /// Shannon entropy H = -Σ p_i ln(p_i).
    pub shannon: f64,
    /// Gini-Simpson index 1 - Σ p_i².
    pub simpson: f64,
    /// Bias-corrected Chao1 richness.
    pub chao1: f64,
}

/// Alpha diversity metric selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaMetric {
    Observed,
    Shannon,
    Simpson,
    Chao1,
}

impl AlphaMetric {
    pub const ALL: [AlphaMetric; 4] = [
        AlphaMetric::Observed,
        AlphaMetric::Shannon,
        AlphaMetric::Simpson,
        AlphaMetric::Chao1,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Observed => "observed",
            Self::Shannon => "shannon",
            Self::Simpson => "simpson",
            Self::Chao1 => "chao1",
        }
    }
}

impl AlphaDiversity {
    pub fn value(&self, metric: AlphaMetric) -> f64 {
        match metric {
            AlphaMetric::Observed => self.observed as f64,
            AlphaMetric::Shannon => self.shannon,
            AlphaMetric::Simpson => self.simpson,
            AlphaMetric::Chao1 => self.chao1,
        }
    }
}

/// Shannon entropy (natural log) of a count vector.
pub fn shannon(counts: &[u64]) -> f64 {
    let n: u64 = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / n;
            -p * p.ln()
        })
        .sum()
}

/// Gini-Simpson index 1 - Σ p_i².
pub fn simpson(counts: &[u64]) -> f64 {
    let n: u64 = counts.iter().sum();
    if n == 0 {
        return 0.0;
    }
    let n = n as f64;
    1.0 - counts
        .iter()
        .map(|&c| {
            let p = c as f64 / n;
            p * p
        })
        .sum::<f64>()
}

/// Bias-corrected Chao1: S_obs + F1(F1 - 1) / (2(F2 + 1)).
pub fn chao1(counts: &[u64]) -> f64 {
    let s_obs = counts.iter().filter(|&&c| c > 0).count() as f64;
    let f1 = counts.iter().filter(|&&c| c == 1).count() as f64;
    let f2 = counts.iter().filter(|&&c| c == 2).count() as f64;
    s_obs + f1 * (f1 - 1.0) / (2.0 * (f2 + 1.0))
}

/// Compute alpha diversity for every sample.
///
/// # Errors
/// Fails if any sample has zero total count.
pub fn alpha_diversity(counts: &CountMatrix) -> Result<Vec<AlphaDiversity>> {
    let depths = counts.col_sums();
    let empty: Vec<&str> = counts
        .sample_ids()
        .iter()
        .zip(&depths)
        .filter(|(_, &d)| d == 0)
        .map(|(s, _)| s.as_str())
        .collect();
    if !empty.is_empty() {
        return Err(CommunityError::EmptyData(format!(
            "samples with zero total count: {:?}",
            empty
        )));
    }

    Ok((0..counts.n_samples())
        .map(|col| {
            let profile = counts.col_dense(col);
            AlphaDiversity {
                sample_id: counts.sample_ids()[col].clone(),
                observed: profile.iter().filter(|&&c| c > 0).count(),
                shannon: shannon(&profile),
                simpson: simpson(&profile),
                chao1: chao1(&profile),
            }
        })
        .collect())
}
