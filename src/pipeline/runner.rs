//! Pipeline runner: loader → filter → diversity, SIMPER, networks → tests.

use super::config::AnalysisConfig;
use super::report::{Analysis, GroupAnalysis};
use crate::data::{CountMatrix, Metadata};
use crate::discriminant::simper;
use crate::diversity::{alpha_diversity, bray_curtis_matrix, pcoa, AlphaMetric};
use crate::error::{CommunityError, Result};
use crate::filter::{filter_relative_abundance, filter_relative_abundance_with_stats};
use crate::network::{spearman_matrix, top_degree, Network};
use crate::profile::profile_library_size;
use crate::test::{kruskal_wallis_allow_constant, permanova, test_taxa_kruskal, PermutationConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Stages of a run. A failing stage aborts everything after it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Align,
    Filter,
    Diversity,
    Compare,
    Simper,
    Network,
    Correct,
}

impl PipelineStage {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Align => "align",
            Self::Filter => "filter",
            Self::Diversity => "diversity",
            Self::Compare => "compare",
            Self::Simper => "simper",
            Self::Network => "network",
            Self::Correct => "correct",
        }
    }

    fn wrap(self, e: CommunityError) -> CommunityError {
        CommunityError::Stage {
            stage: self.name(),
            source: Box::new(e),
        }
    }
}

/// Builder for configuring and running a community comparison.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: AnalysisConfig,
}

impl Pipeline {
    /// Create a pipeline with default parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from a config.
    pub fn from_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn group_column(mut self, column: &str) -> Self {
        self.config.group_column = column.to_string();
        self
    }

    /// Labels compared by SIMPER.
    pub fn compare(mut self, group_a: &str, group_b: &str) -> Self {
        self.config.groups = Some(vec![group_a.to_string(), group_b.to_string()]);
        self
    }

    pub fn global_threshold(mut self, threshold: f64) -> Self {
        self.config.global_threshold = threshold;
        self
    }

    pub fn network_threshold(mut self, threshold: f64) -> Self {
        self.config.network_threshold = threshold;
        self
    }

    /// Edge thresholds: p below `p_threshold` and |r| above `r_threshold`.
    pub fn edge_thresholds(mut self, p_threshold: f64, r_threshold: f64) -> Self {
        self.config.p_threshold = p_threshold;
        self.config.r_threshold = r_threshold;
        self
    }

    pub fn permutations(mut self, n: usize) -> Self {
        self.config.permutations = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn simper_top_n(mut self, n: usize) -> Self {
        self.config.simper_top_n = n;
        self
    }

    pub fn degree_top_n(mut self, n: usize) -> Self {
        self.config.degree_top_n = n;
        self
    }

    pub fn depth_tolerance(mut self, tolerance: f64) -> Self {
        self.config.depth_tolerance = tolerance;
        self
    }

    pub fn alpha_column(mut self, column: &str) -> Self {
        self.config.alpha_columns.push(column.to_string());
        self
    }

    /// Load both tables and run.
    pub fn run_files<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        counts_path: P,
        metadata_path: Q,
    ) -> Result<Analysis> {
        let counts = CountMatrix::from_tsv(counts_path, self.config.orientation)?;
        let metadata = Metadata::from_tsv(metadata_path)?;
        self.run(&counts, &metadata)
    }

    /// Run every stage on in-memory data.
    pub fn run(&self, counts: &CountMatrix, metadata: &Metadata) -> Result<Analysis> {
        let config = &self.config;
        config.validate()?;

        // === Align ===
        let stage = PipelineStage::Align;
        if counts.is_empty() {
            return Err(stage.wrap(CommunityError::EmptyData(
                "count matrix has no taxa or no samples".to_string(),
            )));
        }
        let metadata = metadata
            .align_to(counts.sample_ids())
            .map_err(|e| stage.wrap(e))?;
        let labels = metadata
            .group_labels(&config.group_column)
            .map_err(|e| stage.wrap(e))?;
        let levels = metadata
            .levels(&config.group_column)
            .map_err(|e| stage.wrap(e))?;
        let compared = compared_groups(config, &levels).map_err(|e| stage.wrap(e))?;
        tracing::info!(
            n_samples = counts.n_samples(),
            n_taxa = counts.n_taxa(),
            n_groups = levels.len(),
            "inputs aligned"
        );

        let mut warnings = Vec::new();
        let library_size = profile_library_size(counts);
        if !library_size.is_even_within(config.depth_tolerance) {
            let outside: Vec<&str> = library_size
                .samples_outside(config.depth_tolerance)
                .into_iter()
                .map(|i| counts.sample_ids()[i].as_str())
                .collect();
            let msg = format!(
                "sample depths deviate from the mean by up to {:.1}% (tolerance {:.1}%): {:?}",
                library_size.max_relative_deviation * 100.0,
                config.depth_tolerance * 100.0,
                outside
            );
            tracing::warn!("{}", msg);
            warnings.push(msg);
        }

        // === Filter ===
        let stage = PipelineStage::Filter;
        let (filtered, filter) =
            filter_relative_abundance_with_stats(counts, config.global_threshold)
                .map_err(|e| stage.wrap(e))?;
        tracing::info!(
            n_before = filter.n_before,
            n_after = filter.n_after,
            "global abundance filter done"
        );

        // === Diversity ===
        let stage = PipelineStage::Diversity;
        // richness estimators need the rare taxa the filter drops
        let alpha = alpha_diversity(counts).map_err(|e| stage.wrap(e))?;
        let distances = bray_curtis_matrix(&filtered).map_err(|e| stage.wrap(e))?;
        let ordination = pcoa(&distances, 2).map_err(|e| stage.wrap(e))?;
        tracing::info!(n_samples = alpha.len(), "diversity done");

        // === Compare ===
        let stage = PipelineStage::Compare;
        let mut alpha_tests = BTreeMap::new();
        for metric in AlphaMetric::ALL {
            let values: Vec<f64> = alpha.iter().map(|a| a.value(metric)).collect();
            let result =
                kruskal_wallis_allow_constant(&values, &labels).map_err(|e| stage.wrap(e))?;
            alpha_tests.insert(metric.name().to_string(), result);
        }
        for column in &config.alpha_columns {
            let values = metadata.numeric_column(column).map_err(|e| stage.wrap(e))?;
            let result =
                kruskal_wallis_allow_constant(&values, &labels).map_err(|e| stage.wrap(e))?;
            alpha_tests.insert(column.clone(), result);
        }
        let perm_config = PermutationConfig::default()
            .with_permutations(config.permutations)
            .with_seed(config.seed);
        let permanova_result =
            permanova(&distances, &labels, &perm_config).map_err(|e| stage.wrap(e))?;
        tracing::info!(
            pseudo_f = permanova_result.pseudo_f,
            p_value = permanova_result.p_value,
            "group comparison done"
        );

        // === SIMPER ===
        let stage = PipelineStage::Simper;
        let simper_result =
            simper(&filtered, &labels, &compared.0, &compared.1).map_err(|e| stage.wrap(e))?;
        let simper_top = simper_result.top(config.simper_top_n);
        tracing::info!(
            group_a = %compared.0,
            group_b = %compared.1,
            n_top = simper_top.len(),
            "SIMPER done"
        );

        // === Network ===
        let stage = PipelineStage::Network;
        let mut groups = BTreeMap::new();
        for label in &levels {
            let group = build_group(&filtered, &metadata, &labels, label, config)
                .map_err(|e| stage.wrap(e))?;
            tracing::info!(
                group = %label,
                n_nodes = group.network.n_nodes(),
                n_edges = group.network.n_edges(),
                "network built"
            );
            groups.insert(label.clone(), group);
        }

        // === Correct ===
        // two separate families: never pooled
        let stage = PipelineStage::Correct;
        let pair_idx: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, l)| **l == compared.0 || **l == compared.1)
            .map(|(i, _)| i)
            .collect();
        let pair_counts = filtered.subset_samples(&pair_idx).map_err(|e| stage.wrap(e))?;
        let pair_labels: Vec<&str> = pair_idx.iter().map(|&i| labels[i].as_str()).collect();
        let simper_tests = test_taxa_kruskal(&pair_counts, &pair_labels, &simper_top, "simper")
            .map_err(|e| stage.wrap(e))?;

        let mut degree_tests = BTreeMap::new();
        for (label, group) in &groups {
            let top = top_degree(&group.network, config.degree_top_n);
            let family = format!("degree:{}", label);
            let tests = test_taxa_kruskal(&filtered, &labels, &top, &family)
                .map_err(|e| stage.wrap(e))?;
            degree_tests.insert(label.clone(), tests);
        }
        tracing::info!(
            n_simper = simper_tests.len(),
            n_degree_families = degree_tests.len(),
            "FDR correction done"
        );

        Ok(Analysis {
            config: config.clone(),
            labels,
            compared,
            library_size,
            filter,
            filtered,
            alpha,
            alpha_tests,
            distances,
            pcoa: ordination,
            permanova: permanova_result,
            simper: simper_result,
            simper_tests,
            groups,
            degree_tests,
            warnings,
        })
    }
}

/// Labels compared by SIMPER: configured, or the first two sorted levels.
fn compared_groups(config: &AnalysisConfig, levels: &[String]) -> Result<(String, String)> {
    if levels.len() < 2 {
        return Err(CommunityError::Precondition(format!(
            "column '{}' has {} group(s); at least 2 are required",
            config.group_column,
            levels.len()
        )));
    }
    match &config.groups {
        Some(pair) => {
            for g in pair {
                if !levels.contains(g) {
                    return Err(CommunityError::InvalidParameter(format!(
                        "group '{}' not found in column '{}' (levels {:?})",
                        g, config.group_column, levels
                    )));
                }
            }
            Ok((pair[0].clone(), pair[1].clone()))
        }
        None => Ok((levels[0].clone(), levels[1].clone())),
    }
}

/// Restrict to one group, re-filter and build its network.
fn build_group(
    filtered: &CountMatrix,
    metadata: &Metadata,
    labels: &[String],
    label: &str,
    config: &AnalysisConfig,
) -> Result<GroupAnalysis> {
    let sample_ids: Vec<String> = filtered
        .sample_ids()
        .iter()
        .zip(labels)
        .filter(|(_, l)| l.as_str() == label)
        .map(|(s, _)| s.clone())
        .collect();
    let group_counts = filtered.select_samples(&sample_ids)?;
    let local = filter_relative_abundance(&group_counts, config.network_threshold)?;
    tracing::debug!(
        group = label,
        n_samples = local.n_samples(),
        n_taxa = local.n_taxa(),
        "group-local filter applied"
    );
    let correlation = spearman_matrix(&local)?;
    let network = Network::from_correlation(&correlation, config.p_threshold, config.r_threshold)?;

    Ok(GroupAnalysis {
        label: label.to_string(),
        counts: local,
        metadata: metadata.subset_samples(&sample_ids)?,
        correlation,
        network,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario() -> (CountMatrix, Metadata) {
        let counts = CountMatrix::from_sample_rows(
            &[
                vec![100, 0, 0, 0, 0],
                vec![90, 10, 0, 0, 0],
                vec![0, 0, 100, 0, 0],
                vec![0, 0, 90, 10, 0],
            ],
            (1..=5).map(|i| format!("t{}", i)).collect(),
            (1..=4).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let metadata = Metadata::from_rows(
            vec!["group".to_string()],
            vec![
                ("S1".to_string(), vec!["A"]),
                ("S2".to_string(), vec!["A"]),
                ("S3".to_string(), vec!["B"]),
                ("S4".to_string(), vec!["B"]),
            ],
        )
        .unwrap();
        (counts, metadata)
    }

    #[test]
    fn test_builder_sets_config() {
        let pipeline = Pipeline::new()
            .group_column("site")
            .compare("x", "y")
            .global_threshold(0.01)
            .network_threshold(0.02)
            .edge_thresholds(0.05, 0.5)
            .permutations(99)
            .seed(1)
            .alpha_column("ph");
        let c = pipeline.config();
        assert_eq!(c.group_column, "site");
        assert_eq!(c.groups, Some(vec!["x".to_string(), "y".to_string()]));
        assert_eq!(c.network_threshold, 0.02);
        assert_eq!(c.r_threshold, 0.5);
        assert_eq!(c.alpha_columns, vec!["ph"]);
    }

    #[test]
    fn test_scenario_networks() {
        let (counts, metadata) = scenario();
        let analysis = Pipeline::new()
            .global_threshold(0.02)
            .permutations(9)
            .run(&counts, &metadata)
            .unwrap();

        assert_eq!(analysis.filtered.taxon_ids(), &["t1", "t2", "t3", "t4"]);

        let a = &analysis.groups["A"];
        assert_eq!(a.counts.taxon_ids(), &["t1", "t2"]);
        assert_eq!(a.correlation.coefficient(0, 1), -1.0);
        assert!(a.network.has_edge(0, 1));

        let b = &analysis.groups["B"];
        assert_eq!(b.counts.taxon_ids(), &["t3", "t4"]);
        assert_eq!(b.correlation.coefficient(0, 1), -1.0);
        assert_eq!(b.network.n_edges(), 1);

        assert_eq!(analysis.degree_tests["A"].family, "degree:A");
        assert_eq!(analysis.simper_tests.family, "simper");
    }

    #[test]
    fn test_alpha_keeps_rare_taxa() {
        let counts = CountMatrix::from_sample_rows(
            &[
                vec![100, 50, 1, 0],
                vec![90, 60, 0, 2],
                vec![50, 100, 1, 1],
                vec![60, 90, 0, 0],
            ],
            (1..=4).map(|i| format!("t{}", i)).collect(),
            (1..=4).map(|i| format!("S{}", i)).collect(),
        )
        .unwrap();
        let (_, metadata) = scenario();
        let analysis = Pipeline::new()
            .global_threshold(0.02)
            .permutations(9)
            .run(&counts, &metadata)
            .unwrap();

        // t3 and t4 are below the global cutoff
        assert_eq!(analysis.filtered.taxon_ids(), &["t1", "t2"]);
        assert_eq!(analysis.alpha[0].observed, 3);
        // two singletons, no doubletons: 4 + 2·1 / 2
        assert_eq!(analysis.alpha[2].observed, 4);
        assert!((analysis.alpha[2].chao1 - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_simper_agrees_with_distances() {
        let (counts, metadata) = scenario();
        let analysis = Pipeline::new()
            .global_threshold(0.02)
            .permutations(9)
            .run(&counts, &metadata)
            .unwrap();
        let d = &analysis.distances;
        let cross = (d.get(0, 2) + d.get(0, 3) + d.get(1, 2) + d.get(1, 3)) / 4.0;
        assert!((analysis.simper.overall_dissimilarity - cross).abs() < 1e-12);
    }

    #[test]
    fn test_sample_mismatch_is_reported() {
        let (counts, _) = scenario();
        let metadata = Metadata::from_rows(
            vec!["group".to_string()],
            vec![
                ("S1".to_string(), vec!["A"]),
                ("S2".to_string(), vec!["A"]),
                ("S3".to_string(), vec!["B"]),
                ("S9".to_string(), vec!["B"]),
            ],
        )
        .unwrap();
        let err = Pipeline::new().run(&counts, &metadata).unwrap_err();
        match err {
            CommunityError::Stage { stage, source } => {
                assert_eq!(stage, "align");
                match *source {
                    CommunityError::SampleMismatch {
                        missing_in_metadata,
                        missing_in_counts,
                    } => {
                        assert_eq!(missing_in_metadata, vec!["S4"]);
                        assert_eq!(missing_in_counts, vec!["S9"]);
                    }
                    other => panic!("unexpected error: {}", other),
                }
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_single_group_fails() {
        let (counts, _) = scenario();
        let metadata = Metadata::from_rows(
            vec!["group".to_string()],
            (1..=4).map(|i| (format!("S{}", i), vec!["A"])).collect(),
        )
        .unwrap();
        let err = Pipeline::new().run(&counts, &metadata).unwrap_err();
        match err {
            CommunityError::Stage { stage, source } => {
                assert_eq!(stage, "align");
                assert!(matches!(*source, CommunityError::Precondition(_)));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_zero_permutations_rejected() {
        let (counts, metadata) = scenario();
        assert!(Pipeline::new().permutations(0).run(&counts, &metadata).is_err());
    }

    #[test]
    fn test_unknown_compared_group() {
        let (counts, metadata) = scenario();
        let result = Pipeline::new()
            .global_threshold(0.02)
            .compare("A", "Z")
            .run(&counts, &metadata);
        assert!(result.is_err());
    }
}
