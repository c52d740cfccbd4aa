//! Sequencing-depth profiling for count matrices.
//!
//! Rarefied or otherwise normalized tables have per-sample totals that are
//! close to, but rarely exactly, equal. Consumers check evenness against an
//! explicit relative tolerance instead of assuming equality.

use crate::data::CountMatrix;
use serde::{Deserialize, Serialize};

/// Profile of sequencing depth (library size) across samples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibrarySizeProfile {
    pub n_samples: usize,
    /// Total counts per sample, in matrix order.
    pub library_sizes: Vec<u64>,
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: u64,
    pub max: u64,
    /// Coefficient of variation (std_dev / mean).
    pub cv: f64,
    /// Largest |size - mean| / mean over all samples.
    pub max_relative_deviation: f64,
}

impl LibrarySizeProfile {
    /// True when every sample lies within `tolerance` (relative) of the mean.
    pub fn is_even_within(&self, tolerance: f64) -> bool {
        self.max_relative_deviation <= tolerance
    }

    /// Indices of samples deviating from the mean by more than `tolerance`.
    pub fn samples_outside(&self, tolerance: f64) -> Vec<usize> {
        if self.mean <= 0.0 {
            return (0..self.n_samples).collect();
        }
        self.library_sizes
            .iter()
            .enumerate()
            .filter(|(_, &s)| ((s as f64 - self.mean) / self.mean).abs() > tolerance)
            .map(|(i, _)| i)
            .collect()
    }
}

impl std::fmt::Display for LibrarySizeProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Library Size Profile")?;
        writeln!(f, "  Samples: {}", self.n_samples)?;
        writeln!(f, "  Mean:    {:.0}", self.mean)?;
        writeln!(f, "  Median:  {:.0}", self.median)?;
        writeln!(f, "  Std Dev: {:.0}", self.std_dev)?;
        writeln!(f, "  Min:     {}", self.min)?;
        writeln!(f, "  Max:     {}", self.max)?;
        writeln!(f, "  CV:      {:.3}", self.cv)?;
        writeln!(f, "  Max deviation from mean: {:.2}%", self.max_relative_deviation * 100.0)?;
        Ok(())
    }
}

/// Profile library size characteristics of a count matrix.
pub fn profile_library_size(counts: &CountMatrix) -> LibrarySizeProfile {
    let library_sizes = counts.col_sums();
    let n_samples = library_sizes.len();

    if n_samples == 0 {
        return LibrarySizeProfile {
            n_samples: 0,
            library_sizes: vec![],
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0,
            max: 0,
            cv: 0.0,
            max_relative_deviation: 0.0,
        };
    }

    let mean = library_sizes.iter().sum::<u64>() as f64 / n_samples as f64;
    let variance = library_sizes
        .iter()
        .map(|&x| {
            let diff = x as f64 - mean;
            diff * diff
        })
        .sum::<f64>()
        / n_samples as f64;
    let std_dev = variance.sqrt();

    let min = library_sizes.iter().copied().min().unwrap_or(0);
    let max = library_sizes.iter().copied().max().unwrap_or(0);
    let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };
    let max_relative_deviation = if mean > 0.0 {
        library_sizes
            .iter()
            .map(|&x| ((x as f64 - mean) / mean).abs())
            .fold(0.0, f64::max)
    } else {
        0.0
    };

    LibrarySizeProfile {
        n_samples,
        median: median_u64(&library_sizes),
        library_sizes,
        mean,
        std_dev,
        min,
        max,
        cv,
        max_relative_deviation,
    }
}

fn median_u64(values: &[u64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len();
    if n % 2 == 0 {
        (sorted[n / 2 - 1] + sorted[n / 2]) as f64 / 2.0
    } else {
        sorted[n / 2] as f64
    }
}
