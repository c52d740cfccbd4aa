//! Group comparison tests: Kruskal-Wallis and PERMANOVA.

pub mod permutation;

pub use kruskal::{kruskal_wallis, kruskal_wallis_allow_constant, KruskalResult};
pub use permanova::{permanova, PermanovaResult};
pub use permutation::{encode_labels, permutation_test, PermutationConfig, PermutationOutcome};
pub use rank::rank_average;
pub use taxa::test_taxa_kruskal;
