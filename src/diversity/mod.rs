//! Alpha diversity, Bray-Curtis beta diversity and PCoA ordination.

pub mod alpha;
pub mod beta;
pub mod ordination;

pub use alpha::{alpha_diversity, AlphaDiversity, AlphaMetric};
pub use beta::{bray_curtis, bray_curtis_matrix, DistanceMatrix};
pub use ordination::{pcoa, PcoaResult};
