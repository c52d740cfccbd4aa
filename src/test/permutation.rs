//! Label-permutation machinery shared by the permutation-based tests.
//!
//! # Algorithm
//!
//! 1. Compute the observed statistic on the true labels
//! 2. Shuffle the labels `n_permutations` times
//! 3. Recompute the statistic for each shuffle
//! 4. P-value = (#permuted ≥ observed + 1) / (n_permutations + 1)
//!
//! Each permutation draws from its own generator seeded from
//! `seed + permutation index`, so parallel and sequential runs agree exactly.

use crate::error::{CommunityError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Tolerance when comparing permuted statistics with the observed one.
const TIE_EPSILON: f64 = 1.490_116_119_384_765_6e-8;

/// Configuration for permutation testing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermutationConfig {
    /// Number of permutations to run. Must be at least 1.
    pub n_permutations: usize,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// Whether to use parallel computation.
    pub parallel: bool,
}

impl Default for PermutationConfig {
    fn default() -> Self {
        Self {
            n_permutations: 999,
            seed: 42,
            parallel: true,
        }
    }
}

impl PermutationConfig {
    /// Create a quick configuration for testing (fewer permutations).
    pub fn quick() -> Self {
        Self {
            n_permutations: 99,
            ..Default::default()
        }
    }

    pub fn with_permutations(mut self, n_permutations: usize) -> Self {
        self.n_permutations = n_permutations;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Outcome of a permutation test.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermutationOutcome {
    pub observed: f64,
    pub p_value: f64,
    pub n_permutations: usize,
    /// Number of permuted statistics ≥ observed.
    pub n_extreme: usize,
}

/// Deterministic xorshift64 generator for label shuffles.
pub(crate) struct SimpleRng {
    state: u64,
}

impl SimpleRng {
    pub(crate) fn new(seed: u64) -> Self {
        // splitmix64 scramble so neighbouring seeds diverge and state is never 0
        let mut z = seed.wrapping_add(0x9E37_79B9_7F4A_7C15);
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^= z >> 31;
        Self {
            state: if z == 0 { 0x2545_F491_4F6C_DD1D } else { z },
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Fisher-Yates shuffle
    pub(crate) fn shuffle<T>(&mut self, slice: &mut [T]) {
        let n = slice.len();
        for i in (1..n).rev() {
            let j = (self.next_u64() % (i as u64 + 1)) as usize;
            slice.swap(i, j);
        }
    }
}

/// Run a one-sided (upper tail) permutation test over integer group labels.
///
/// `statistic` receives a label vector the same length as `labels`.
///
/// # Errors
/// Fails when `n_permutations` is zero: the p-value would be undefined.
pub fn permutation_test<F>(
    labels: &[usize],
    config: &PermutationConfig,
    statistic: F,
) -> Result<PermutationOutcome>
where
    F: Fn(&[usize]) -> f64 + Sync,
{
    if config.n_permutations == 0 {
        return Err(CommunityError::InvalidParameter(
            "at least one permutation is required to compute a p-value".to_string(),
        ));
    }

    let observed = statistic(labels);
    let threshold = observed - TIE_EPSILON;

    let permuted_once = |perm_idx: usize| -> bool {
        let mut rng = SimpleRng::new(config.seed.wrapping_add(perm_idx as u64));
        let mut shuffled = labels.to_vec();
        rng.shuffle(&mut shuffled);
        statistic(&shuffled) >= threshold
    };

    let n_extreme = if config.parallel {
        (0..config.n_permutations)
            .into_par_iter()
            .filter(|&i| permuted_once(i))
            .count()
    } else {
        (0..config.n_permutations).filter(|&i| permuted_once(i)).count()
    };

    let p_value = (n_extreme as f64 + 1.0) / (config.n_permutations as f64 + 1.0);

    Ok(PermutationOutcome {
        observed,
        p_value,
        n_permutations: config.n_permutations,
        n_extreme,
    })
}

/// Map string labels to dense indices in order of first appearance.
///
/// Returns the index vector and the distinct labels.
pub fn encode_labels<S: AsRef<str>>(groups: &[S]) -> (Vec<usize>, Vec<String>) {
    let mut levels: Vec<String> = Vec::new();
    let codes = groups
        .iter()
        .map(|g| {
            let g = g.as_ref();
            match levels.iter().position(|l| l == g) {
                Some(i) => i,
                None => {
                    levels.push(g.to_string());
                    levels.len() - 1
                }
            }
        })
        .collect();
    (codes, levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_mean_difference(values: &[f64]) -> impl Fn(&[usize]) -> f64 + Sync + '_ {
        move |labels: &[usize]| {
            let (mut s0, mut n0, mut s1, mut n1) = (0.0, 0.0, 0.0, 0.0);
            for (&v, &l) in values.iter().zip(labels) {
                if l == 0 {
                    s0 += v;
                    n0 += 1.0;
                } else {
                    s1 += v;
                    n1 += 1.0;
                }
            }
            (s1 / n1 - s0 / n0).abs()
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = SimpleRng::new(7);
        let mut v: Vec<usize> = (0..20).collect();
        rng.shuffle(&mut v);
        let mut sorted = v.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_zero_permutations_rejected() {
        let config = PermutationConfig::default().with_permutations(0);
        let err = permutation_test(&[0, 1], &config, |_| 0.0).unwrap_err();
        assert!(matches!(err, CommunityError::InvalidParameter(_)));
    }

    #[test]
    fn test_minimum_p_value() {
        let values = [0.0, 0.1, 0.2, 0.1, 0.3, 10.0, 10.1, 10.2, 10.1, 10.3];
        let labels = [0, 0, 0, 0, 0, 1, 1, 1, 1, 1];
        let config = PermutationConfig::default().with_permutations(199);
        let outcome = permutation_test(&labels, &config, group_mean_difference(&values)).unwrap();
        assert!(outcome.p_value >= 1.0 / 200.0);
        assert!(outcome.p_value < 0.05);
    }

    #[test]
    fn test_constant_statistic_gives_p_one() {
        let config = PermutationConfig::quick();
        let outcome = permutation_test(&[0, 0, 1, 1], &config, |_| 3.0).unwrap();
        assert_eq!(outcome.n_extreme, config.n_permutations);
        assert_eq!(outcome.p_value, 1.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let values = [1.0, 3.0, 2.0, 5.0, 4.0, 6.0, 2.5, 3.5];
        let labels = [0, 1, 0, 1, 0, 1, 0, 1];
        let seq = PermutationConfig {
            n_permutations: 250,
            seed: 11,
            parallel: false,
        };
        let par = PermutationConfig {
            parallel: true,
            ..seq.clone()
        };
        let a = permutation_test(&labels, &seq, group_mean_difference(&values)).unwrap();
        let b = permutation_test(&labels, &par, group_mean_difference(&values)).unwrap();
        assert_eq!(a.n_extreme, b.n_extreme);
        assert_eq!(a.p_value, b.p_value);
    }

    #[test]
    fn test_encode_labels() {
        let (codes, levels) = encode_labels(&["b", "a", "b", "c"]);
        assert_eq!(codes, vec![0, 1, 0, 2]);
        assert_eq!(levels, vec!["b", "a", "c"]);
    }
}
