//! Analysis results: per-group records, the JSON report and TSV tables.

use super::config::AnalysisConfig;
use crate::data::{CountMatrix, Metadata, TaxonTestSet};
use crate::discriminant::{SimperResult, SimperTaxon};
use crate::diversity::{AlphaDiversity, AlphaMetric, DistanceMatrix, PcoaResult};
use crate::error::Result;
use crate::filter::AbundanceFilterResult;
use crate::network::{top_degree, CorrelationMatrix, Network};
use crate::profile::LibrarySizeProfile;
use crate::test::{KruskalResult, PermanovaResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Everything computed for one group label.
#[derive(Debug, Clone)]
pub struct GroupAnalysis {
    pub label: String,
    /// Group samples, re-filtered at the network threshold.
    pub counts: CountMatrix,
    pub metadata: Metadata,
    pub correlation: CorrelationMatrix,
    pub network: Network,
}

/// Full in-memory result of a pipeline run.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub config: AnalysisConfig,
    /// Group label per sample of `filtered`.
    pub labels: Vec<String>,
    /// The two labels compared by SIMPER.
    pub compared: (String, String),
    pub library_size: LibrarySizeProfile,
    pub filter: AbundanceFilterResult,
    pub filtered: CountMatrix,
    pub alpha: Vec<AlphaDiversity>,
    /// Kruskal-Wallis per alpha metric and per configured metadata column.
    pub alpha_tests: BTreeMap<String, KruskalResult>,
    pub distances: DistanceMatrix,
    pub pcoa: PcoaResult,
    pub permanova: PermanovaResult,
    pub simper: SimperResult,
    /// Kruskal-Wallis family over the SIMPER top taxa.
    pub simper_tests: TaxonTestSet,
    pub groups: BTreeMap<String, GroupAnalysis>,
    /// One Kruskal-Wallis family per group, over its top-degree taxa.
    pub degree_tests: BTreeMap<String, TaxonTestSet>,
    pub warnings: Vec<String>,
}

/// Serializable summary of one group's network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSummary {
    pub n_samples: usize,
    pub n_nodes: usize,
    pub n_edges: usize,
    /// Tie-inclusive top-degree taxa.
    pub top_degree: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimperSummary {
    pub group_a: String,
    pub group_b: String,
    pub overall_dissimilarity: f64,
    /// Spearman correlation of contribution with mean abundance.
    pub abundance_rank_correlation: Option<f64>,
    pub top: Vec<SimperTaxon>,
}

/// JSON report of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// RFC 3339 creation time.
    pub generated_at: String,
    pub config: AnalysisConfig,
    pub n_samples: usize,
    pub group_sizes: BTreeMap<String, usize>,
    pub library_size: LibrarySizeProfile,
    pub filter: AbundanceFilterResult,
    pub alpha_tests: BTreeMap<String, KruskalResult>,
    pub pcoa_proportion_explained: Vec<f64>,
    pub permanova: PermanovaResult,
    pub simper: SimperSummary,
    pub simper_tests: TaxonTestSet,
    pub networks: BTreeMap<String, NetworkSummary>,
    pub degree_tests: BTreeMap<String, TaxonTestSet>,
    pub warnings: Vec<String>,
}

impl AnalysisReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Analysis {
    /// Summarize into a serializable report stamped with the current time.
    pub fn report(&self) -> AnalysisReport {
        let mut group_sizes = BTreeMap::new();
        for label in &self.labels {
            *group_sizes.entry(label.clone()).or_insert(0) += 1;
        }

        let networks = self
            .groups
            .iter()
            .map(|(label, g)| {
                let summary = NetworkSummary {
                    n_samples: g.counts.n_samples(),
                    n_nodes: g.network.n_nodes(),
                    n_edges: g.network.n_edges(),
                    top_degree: top_degree(&g.network, self.config.degree_top_n),
                };
                (label.clone(), summary)
            })
            .collect();

        let rho = self.simper.abundance_rank_correlation().ok().filter(|r| r.is_finite());

        AnalysisReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            config: self.config.clone(),
            n_samples: self.filtered.n_samples(),
            group_sizes,
            library_size: self.library_size.clone(),
            filter: self.filter.clone(),
            alpha_tests: self.alpha_tests.clone(),
            pcoa_proportion_explained: self.pcoa.proportion_explained.clone(),
            permanova: self.permanova.clone(),
            simper: SimperSummary {
                group_a: self.simper.group_a.clone(),
                group_b: self.simper.group_b.clone(),
                overall_dissimilarity: self.simper.overall_dissimilarity,
                abundance_rank_correlation: rho,
                top: self
                    .simper
                    .taxa
                    .iter()
                    .take(self.config.simper_top_n)
                    .cloned()
                    .collect(),
            },
            simper_tests: self.simper_tests.clone(),
            networks,
            degree_tests: self.degree_tests.clone(),
            warnings: self.warnings.clone(),
        }
    }

    /// Write the report and all tables into `dir`, returning the files written.
    pub fn write_outputs<P: AsRef<Path>>(&self, dir: P) -> Result<Vec<PathBuf>> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let mut written = Vec::new();

        let path = dir.join("report.json");
        std::fs::write(&path, self.report().to_json()?)?;
        written.push(path);

        let path = dir.join("filtered_counts.tsv");
        self.filtered.to_tsv(&path)?;
        written.push(path);

        let path = dir.join("alpha_diversity.tsv");
        write_alpha(&self.alpha, &self.labels, &path)?;
        written.push(path);

        let path = dir.join("bray_curtis.tsv");
        self.distances.to_tsv(&path)?;
        written.push(path);

        let path = dir.join("simper.tsv");
        self.simper.to_tsv(&path)?;
        written.push(path);

        let path = dir.join("simper_tests.tsv");
        self.simper_tests.to_tsv(&path)?;
        written.push(path);

        for (label, group) in &self.groups {
            let stem = file_stem(label);

            let path = dir.join(format!("network_{}_edges.tsv", stem));
            group.network.edges_to_tsv(&path)?;
            written.push(path);

            let path = dir.join(format!("network_{}_nodes.tsv", stem));
            group.network.nodes_to_tsv(&path)?;
            written.push(path);
        }

        for (label, tests) in &self.degree_tests {
            let path = dir.join(format!("degree_tests_{}.tsv", file_stem(label)));
            tests.to_tsv(&path)?;
            written.push(path);
        }

        tracing::info!(n_files = written.len(), dir = %dir.display(), "outputs written");
        Ok(written)
    }
}

fn write_alpha(alpha: &[AlphaDiversity], labels: &[String], path: &Path) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    write!(writer, "sample_id\tgroup")?;
    for metric in AlphaMetric::ALL {
        write!(writer, "\t{}", metric.name())?;
    }
    writeln!(writer)?;
    for (a, label) in alpha.iter().zip(labels) {
        write!(writer, "{}\t{}", a.sample_id, label)?;
        for metric in AlphaMetric::ALL {
            write!(writer, "\t{:.6}", a.value(metric))?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Group labels may contain characters unsuitable for file names.
fn file_stem(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem("control"), "control");
        assert_eq!(file_stem("day 3/a"), "day_3_a");
    }
}
