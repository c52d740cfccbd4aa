//! Thresholded co-occurrence networks and degree ranking.

use super::correlation::{spearman_matrix, CorrelationMatrix};
use crate::data::CountMatrix;
use crate::error::{CommunityError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// A surviving correlation edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEdge {
    pub source: usize,
    pub target: usize,
    pub coefficient: f64,
    pub p_value: f64,
}

/// Per-node summary for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSummary {
    pub taxon_id: String,
    pub degree: usize,
    /// Degree / (n − 1).
    pub centrality: f64,
    /// Degree / max degree, 0 when the graph has no edges.
    pub size: f64,
}

/// Undirected graph over the taxa of one group.
///
/// Every taxon is a node, including those with no surviving edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    taxon_ids: Vec<String>,
    edges: Vec<NetworkEdge>,
    adjacency: Vec<Vec<usize>>,
    p_threshold: f64,
    r_threshold: f64,
}

impl Network {
    /// Keep pairs with `p < p_threshold` and `|r| > r_threshold`.
    ///
    /// Pairs with a NaN coefficient or p-value never form an edge.
    pub fn from_correlation(
        correlation: &CorrelationMatrix,
        p_threshold: f64,
        r_threshold: f64,
    ) -> Result<Self> {
        validate_thresholds(p_threshold, r_threshold)?;

        let n = correlation.n_taxa();
        let mut network = Self {
            taxon_ids: correlation.taxon_ids().to_vec(),
            edges: Vec::new(),
            adjacency: vec![Vec::new(); n],
            p_threshold,
            r_threshold,
        };

        for pair in correlation.edges() {
            // NaN fails both comparisons
            if pair.p_value < p_threshold && pair.coefficient.abs() > r_threshold {
                network.add_edge(pair.index_a, pair.index_b, pair.coefficient, pair.p_value);
            }
        }

        Ok(network)
    }

    fn add_edge(&mut self, source: usize, target: usize, coefficient: f64, p_value: f64) {
        self.edges.push(NetworkEdge {
            source,
            target,
            coefficient,
            p_value,
        });
        self.adjacency[source].push(target);
        self.adjacency[target].push(source);
    }

    pub fn n_nodes(&self) -> usize {
        self.taxon_ids.len()
    }

    pub fn n_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    pub fn edges(&self) -> &[NetworkEdge] {
        &self.edges
    }

    pub fn p_threshold(&self) -> f64 {
        self.p_threshold
    }

    pub fn r_threshold(&self) -> f64 {
        self.r_threshold
    }

    /// Neighbor indices of a node.
    pub fn neighbors(&self, node: usize) -> &[usize] {
        self.adjacency.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_edge(&self, a: usize, b: usize) -> bool {
        self.neighbors(a).contains(&b)
    }

    pub fn degree(&self, node: usize) -> usize {
        self.neighbors(node).len()
    }

    pub fn degrees(&self) -> Vec<usize> {
        self.adjacency.iter().map(Vec::len).collect()
    }

    /// Degree centrality: degree(v) / (n - 1).
    pub fn degree_centrality(&self) -> Vec<f64> {
        let n = self.n_nodes();
        if n <= 1 {
            return vec![0.0; n];
        }
        let denom = (n - 1) as f64;
        self.adjacency.iter().map(|a| a.len() as f64 / denom).collect()
    }

    /// |r| of each edge divided by the largest |r| in the graph.
    pub fn edge_weights_normalized(&self) -> Vec<f64> {
        let max = self
            .edges
            .iter()
            .map(|e| e.coefficient.abs())
            .fold(0.0, f64::max);
        if max <= 0.0 {
            return vec![0.0; self.edges.len()];
        }
        self.edges.iter().map(|e| e.coefficient.abs() / max).collect()
    }

    /// Degree of each node divided by the largest degree.
    pub fn node_sizes_normalized(&self) -> Vec<f64> {
        let degrees = self.degrees();
        let max = degrees.iter().copied().max().unwrap_or(0);
        if max == 0 {
            return vec![0.0; degrees.len()];
        }
        degrees.iter().map(|&d| d as f64 / max as f64).collect()
    }

    pub fn nodes(&self) -> Vec<NodeSummary> {
        let centrality = self.degree_centrality();
        let sizes = self.node_sizes_normalized();
        self.taxon_ids
            .iter()
            .enumerate()
            .map(|(i, id)| NodeSummary {
                taxon_id: id.clone(),
                degree: self.degree(i),
                centrality: centrality[i],
                size: sizes[i],
            })
            .collect()
    }

    /// Write the edge list as TSV.
    pub fn edges_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "taxon_a\ttaxon_b\tcoefficient\tp_value\tweight")?;
        for (e, w) in self.edges.iter().zip(self.edge_weights_normalized()) {
            writeln!(
                writer,
                "{}\t{}\t{:.6}\t{:.3e}\t{:.4}",
                self.taxon_ids[e.source], self.taxon_ids[e.target], e.coefficient, e.p_value, w
            )?;
        }
        Ok(())
    }

    /// Write one row per node (degree, centrality, size) as TSV.
    pub fn nodes_to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "taxon_id\tdegree\tcentrality\tsize")?;
        for node in self.nodes() {
            writeln!(
                writer,
                "{}\t{}\t{:.4}\t{:.4}",
                node.taxon_id, node.degree, node.centrality, node.size
            )?;
        }
        Ok(())
    }
}

fn validate_thresholds(p_threshold: f64, r_threshold: f64) -> Result<()> {
    if !(p_threshold > 0.0 && p_threshold <= 1.0) {
        return Err(CommunityError::InvalidParameter(format!(
            "p_threshold must be in (0, 1], got {}",
            p_threshold
        )));
    }
    if !(0.0..1.0).contains(&r_threshold) {
        return Err(CommunityError::InvalidParameter(format!(
            "r_threshold must be in [0, 1), got {}",
            r_threshold
        )));
    }
    Ok(())
}

/// Build a co-occurrence network from a (group-restricted, filtered) matrix.
///
/// # Errors
/// `DegenerateFilter` when fewer than 2 taxa remain.
pub fn build_network(matrix: &CountMatrix, p_threshold: f64, r_threshold: f64) -> Result<Network> {
    validate_thresholds(p_threshold, r_threshold)?;
    let correlation = spearman_matrix(matrix)?;
    let network = Network::from_correlation(&correlation, p_threshold, r_threshold)?;
    tracing::debug!(
        n_nodes = network.n_nodes(),
        n_edges = network.n_edges(),
        "built co-occurrence network"
    );
    Ok(network)
}

/// Taxa ranked by degree, keeping every taxon tied with the n-th.
///
/// Ordered by degree descending, then taxon ID. The result can be longer
/// than `n` when degrees tie at the cutoff.
pub fn top_degree(network: &Network, n: usize) -> Vec<String> {
    if n == 0 || network.n_nodes() == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..network.n_nodes()).collect();
    order.sort_by(|&a, &b| {
        network
            .degree(b)
            .cmp(&network.degree(a))
            .then_with(|| network.taxon_ids[a].cmp(&network.taxon_ids[b]))
    });

    let cutoff_idx = n.min(order.len()) - 1;
    let cutoff = network.degree(order[cutoff_idx]);
    order
        .into_iter()
        .take_while(|&i| network.degree(i) >= cutoff)
        .map(|i| network.taxon_ids[i].clone())
        .collect()
}
