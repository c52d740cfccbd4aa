//! Multiple testing correction.

pub mod bh;

pub use bh::{adjust, correct_bh, BhCorrected};
