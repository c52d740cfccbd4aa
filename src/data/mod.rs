//! Data structures for community comparison.

mod count_matrix;
mod metadata;
mod result;

pub use count_matrix::{CountMatrix, TableOrientation};
pub use metadata::{Metadata, Variable, VariableType};
pub use result::{Confidence, TaxonTest, TaxonTestSet};
