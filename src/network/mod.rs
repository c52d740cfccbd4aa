//! Per-group Spearman co-occurrence networks.
//!
//! A network is built in three steps: the R and P matrices over all taxa
//! ([`spearman_matrix`]), the upper-triangle pair list
//! ([`CorrelationMatrix::edges`]), and thresholding into an undirected graph
//! that keeps every taxon as a node ([`Network::from_correlation`]).

pub mod correlation;
pub mod graph;

pub use correlation::{
    correlation_p_value, spearman, spearman_matrix, CorrelationEdge, CorrelationMatrix,
};
pub use graph::{build_network, top_degree, Network, NetworkEdge, NodeSummary};
