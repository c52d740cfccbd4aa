//! Composable Community Comparison Library
//!
//! This library provides modular primitives for comparing predefined groups
//! of microbial-community samples from amplicon count tables.
//!
//! # Overview
//!
//! The library is organized into composable modules:
//!
//! - **data**: Core data structures (CountMatrix, Metadata, per-taxon results)
//! - **profile**: Sequencing-depth profiling
//! - **filter**: Relative-abundance filtering
//! - **diversity**: Alpha diversity, Bray-Curtis distances, PCoA
//! - **test**: Kruskal-Wallis and PERMANOVA
//! - **discriminant**: SIMPER discriminant taxa
//! - **network**: Spearman co-occurrence networks and degree ranking
//! - **correct**: Multiple testing correction (Benjamini-Hochberg)
//! - **pipeline**: Pipeline configuration, execution and reporting
//!
//! # Example
//!
//! ```no_run
//! use composable_community::prelude::*;
//!
//! // Load data
//! let counts = CountMatrix::from_tsv("counts.tsv", TableOrientation::SamplesAsRows).unwrap();
//! let metadata = Metadata::from_tsv("metadata.tsv").unwrap();
//!
//! // Run analysis pipeline
//! let analysis = Pipeline::new()
//!     .group_column("group")
//!     .global_threshold(1e-4)
//!     .network_threshold(1e-3)
//!     .edge_thresholds(0.001, 0.7)
//!     .run(&counts, &metadata)
//!     .unwrap();
//!
//! println!("{}", analysis.report().to_json().unwrap());
//! ```

pub mod correct;
pub mod data;
pub mod discriminant;
pub mod diversity;
pub mod error;
pub mod filter;
pub mod network;
pub mod pipeline;
pub mod profile;
pub mod test;

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::correct::{adjust, correct_bh, BhCorrected};
    pub use crate::data::{
        Confidence, CountMatrix, Metadata, TableOrientation, TaxonTest, TaxonTestSet, Variable,
        VariableType,
    };
    pub use crate::discriminant::{simper, SimperResult, SimperTaxon};
    pub use crate::diversity::{
        alpha_diversity, bray_curtis, bray_curtis_matrix, pcoa, AlphaDiversity, AlphaMetric,
        DistanceMatrix, PcoaResult,
    };
    pub use crate::error::{CommunityError, Result};
    pub use crate::filter::{
        filter_relative_abundance, filter_relative_abundance_with_stats, AbundanceFilterResult,
    };
    pub use crate::network::{
        build_network, spearman, spearman_matrix, top_degree, CorrelationEdge, CorrelationMatrix,
        Network, NetworkEdge, NodeSummary,
    };
    pub use crate::pipeline::{
        Analysis, AnalysisConfig, AnalysisReport, GroupAnalysis, NetworkSummary, Pipeline,
        PipelineStage, SimperSummary,
    };
    pub use crate::profile::{profile_library_size, LibrarySizeProfile};
    pub use crate::test::{
        kruskal_wallis, permanova, test_taxa_kruskal, KruskalResult, PermanovaResult,
        PermutationConfig,
    };
}
