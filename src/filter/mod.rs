//! Filtering primitives for count matrices.

pub mod abundance;

pub use abundance::{
    filter_relative_abundance, filter_relative_abundance_with_stats, AbundanceFilterResult,
};
