//! Discriminant taxa between two groups.

pub mod simper;

pub use simper::{simper, SimperResult, SimperTaxon};
