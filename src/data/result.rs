//! Per-taxon test results and their FDR-corrected families.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Confidence level based on statistical evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// Very high confidence (q < 0.001)
    VeryHigh,
    /// High confidence (q < 0.01)
    High,
    /// Moderate confidence (q < 0.05)
    Moderate,
    /// Low confidence (q < 0.10)
    Low,
    /// Suggestive (q < 0.20)
    Suggestive,
    /// Not significant
    NotSignificant,
}

impl Confidence {
    /// Classify based on adjusted p-value (q-value).
    pub fn from_qvalue(q: f64) -> Self {
        if q < 0.001 {
            Self::VeryHigh
        } else if q < 0.01 {
            Self::High
        } else if q < 0.05 {
            Self::Moderate
        } else if q < 0.10 {
            Self::Low
        } else if q < 0.20 {
            Self::Suggestive
        } else {
            Self::NotSignificant
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::VeryHigh => "very_high",
            Self::High => "high",
            Self::Moderate => "moderate",
            Self::Low => "low",
            Self::Suggestive => "suggestive",
            Self::NotSignificant => "not_significant",
        }
    }
}

/// Group-comparison result for a single taxon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonTest {
    pub taxon_id: String,
    /// Kruskal-Wallis H statistic.
    pub statistic: f64,
    /// Raw p-value.
    pub p_value: f64,
    /// BH-adjusted p-value within this result's family.
    pub q_value: f64,
    /// Mean relative abundance per group label.
    pub mean_by_group: BTreeMap<String, f64>,
    pub confidence: Confidence,
}

/// A family of per-taxon tests corrected together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonTestSet {
    /// Name of the correction family (e.g. "simper", "degree:control").
    pub family: String,
    pub results: Vec<TaxonTest>,
}

impl TaxonTestSet {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TaxonTest> {
        self.results.iter()
    }

    /// Results with q below `alpha`.
    pub fn significant_at(&self, alpha: f64) -> Vec<&TaxonTest> {
        self.results.iter().filter(|r| r.q_value < alpha).collect()
    }

    /// Results sorted by q-value (ascending).
    pub fn sorted_by_qvalue(&self) -> Vec<&TaxonTest> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| a.q_value.total_cmp(&b.q_value));
        sorted
    }

    /// Write results to a TSV file, one column per group mean.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        let groups: Vec<&String> = self
            .results
            .first()
            .map(|r| r.mean_by_group.keys().collect())
            .unwrap_or_default();

        write!(writer, "taxon_id\tstatistic\tp_value\tq_value\tconfidence")?;
        for g in &groups {
            write!(writer, "\tmean_{}", g)?;
        }
        writeln!(writer)?;

        for r in &self.results {
            write!(
                writer,
                "{}\t{:.4}\t{:.3e}\t{:.3e}\t{}",
                r.taxon_id,
                r.statistic,
                r.p_value,
                r.q_value,
                r.confidence.name()
            )?;
            for g in &groups {
                let mean = r.mean_by_group.get(*g).copied().unwrap_or(f64::NAN);
                write!(writer, "\t{:.6}", mean)?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }
}
