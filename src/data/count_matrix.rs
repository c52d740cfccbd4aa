//! Count matrix with sparse storage for amplicon abundance data.

use crate::error::{CommunityError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sprs::{CsMat, TriMat};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Layout of a count table on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOrientation {
    /// One row per taxon, one column per sample.
    TaxaAsRows,
    /// One row per sample, one column per taxon.
    #[default]
    SamplesAsRows,
}

/// A sparse count matrix storing taxon abundances across samples.
///
/// Rows represent taxa, columns represent samples.
/// Uses CSR (Compressed Sparse Row) format for efficient per-taxon operations.
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (taxa × samples)
    data: CsMat<u64>,
    /// Taxon identifiers (row names)
    taxon_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<u64>, taxon_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != taxon_ids.len() {
            return Err(CommunityError::DimensionMismatch {
                expected: nrows,
                actual: taxon_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(CommunityError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        check_unique("taxon", &taxon_ids)?;
        check_unique("sample", &sample_ids)?;
        Ok(Self {
            data,
            taxon_ids,
            sample_ids,
        })
    }

    /// Build a matrix from dense per-sample rows (`rows[sample][taxon]`).
    pub fn from_sample_rows(
        rows: &[Vec<u64>],
        taxon_ids: Vec<String>,
        sample_ids: Vec<String>,
    ) -> Result<Self> {
        if rows.len() != sample_ids.len() {
            return Err(CommunityError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: rows.len(),
            });
        }
        let n_taxa = taxon_ids.len();
        let mut tri_mat = TriMat::new((n_taxa, sample_ids.len()));
        for (sample, row) in rows.iter().enumerate() {
            if row.len() != n_taxa {
                return Err(CommunityError::DimensionMismatch {
                    expected: n_taxa,
                    actual: row.len(),
                });
            }
            for (taxon, &value) in row.iter().enumerate() {
                if value > 0 {
                    tri_mat.add_triplet(taxon, sample, value);
                }
            }
        }
        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Load a count matrix from a tab-separated file.
    ///
    /// The first header cell names the identifier column and is ignored.
    /// With [`TableOrientation::TaxaAsRows`] the remaining header cells are
    /// sample IDs; with [`TableOrientation::SamplesAsRows`] they are taxon IDs.
    pub fn from_tsv<P: AsRef<Path>>(path: P, orientation: TableOrientation) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_path(path)?;

        let header = reader.headers()?.clone();
        if header.len() < 2 {
            return Err(CommunityError::EmptyData(
                "count table must have at least one data column".to_string(),
            ));
        }
        let column_ids: Vec<String> = header.iter().skip(1).map(|s| s.trim().to_string()).collect();

        let mut row_ids: Vec<String> = Vec::new();
        let mut triplets: Vec<(usize, usize, u64)> = Vec::new();

        for (row_idx, record) in reader.records().enumerate() {
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            if record.len() != column_ids.len() + 1 {
                return Err(CommunityError::DimensionMismatch {
                    expected: column_ids.len() + 1,
                    actual: record.len(),
                });
            }
            let row = row_ids.len();
            row_ids.push(record[0].trim().to_string());

            for (col_idx, value_str) in record.iter().skip(1).enumerate() {
                let value: u64 =
                    value_str
                        .trim()
                        .parse()
                        .map_err(|_| CommunityError::InvalidCount {
                            value: value_str.to_string(),
                            row: row_idx,
                            col: col_idx,
                        })?;
                if value > 0 {
                    triplets.push((row, col_idx, value));
                }
            }
        }

        if row_ids.is_empty() {
            return Err(CommunityError::EmptyData("no data rows in count table".to_string()));
        }

        let (taxon_ids, sample_ids) = match orientation {
            TableOrientation::TaxaAsRows => (row_ids, column_ids),
            TableOrientation::SamplesAsRows => (column_ids, row_ids),
        };

        let mut tri_mat = TriMat::new((taxon_ids.len(), sample_ids.len()));
        for (row, col, val) in triplets {
            match orientation {
                TableOrientation::TaxaAsRows => tri_mat.add_triplet(row, col, val),
                TableOrientation::SamplesAsRows => tri_mat.add_triplet(col, row, val),
            }
        }

        Self::new(tri_mat.to_csr(), taxon_ids, sample_ids)
    }

    /// Write the count matrix to a TSV file (taxa as rows).
    ///
    /// Read it back with [`TableOrientation::TaxaAsRows`].
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "taxon_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, taxon_id) in self.taxon_ids.iter().enumerate() {
            write!(writer, "{}", taxon_id)?;
            for col_idx in 0..self.n_samples() {
                write!(writer, "\t{}", self.get(row_idx, col_idx))?;
            }
            writeln!(writer)?;
        }

        Ok(())
    }

    /// Get the value at (taxon, sample), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Number of taxa (rows).
    #[inline]
    pub fn n_taxa(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// True when the matrix has no taxa or no samples.
    pub fn is_empty(&self) -> bool {
        self.n_taxa() == 0 || self.n_samples() == 0
    }

    /// Total number of non-zero entries.
    #[inline]
    pub fn nnz(&self) -> usize {
        self.data.nnz()
    }

    #[inline]
    pub fn taxon_ids(&self) -> &[String] {
        &self.taxon_ids
    }

    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Row index of a taxon.
    pub fn taxon_index(&self, taxon_id: &str) -> Option<usize> {
        self.taxon_ids.iter().position(|t| t == taxon_id)
    }

    /// Get the underlying sparse matrix.
    #[inline]
    pub fn data(&self) -> &CsMat<u64> {
        &self.data
    }

    /// Dense counts of one taxon across all samples.
    pub fn row_dense(&self, row: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Dense counts of one sample across all taxa.
    pub fn col_dense(&self, col: usize) -> Vec<u64> {
        (0..self.n_taxa()).map(|row| self.get(row, col)).collect()
    }

    /// Total counts per taxon.
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.n_taxa())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Total counts per sample (sequencing depth).
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Grand total of all counts.
    pub fn total(&self) -> u64 {
        self.data.data().iter().sum()
    }

    /// Subset the matrix to the given taxa (by index), preserving order.
    pub fn subset_taxa(&self, indices: &[usize]) -> Result<Self> {
        let n_taxa = indices.len();
        let mut tri_mat = TriMat::new((n_taxa, self.n_samples()));
        let mut new_taxon_ids = Vec::with_capacity(n_taxa);

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_taxa() {
                return Err(CommunityError::InvalidParameter(format!(
                    "Taxon index {} out of bounds",
                    old_row
                )));
            }
            new_taxon_ids.push(self.taxon_ids[old_row].clone());
            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_taxon_ids, self.sample_ids.clone())
    }

    /// Subset the matrix to the given samples (by index), preserving order.
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let col_map: HashMap<usize, usize> = indices
            .iter()
            .enumerate()
            .map(|(new_idx, &old_idx)| (old_idx, new_idx))
            .collect();

        let mut new_sample_ids = Vec::with_capacity(indices.len());
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(CommunityError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        let mut tri_mat = TriMat::new((self.n_taxa(), indices.len()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(&new_col) = col_map.get(&old_col) {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), self.taxon_ids.clone(), new_sample_ids)
    }

    /// Subset to the named samples, in the given order.
    pub fn select_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .sample_ids
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let mut indices = Vec::with_capacity(sample_ids.len());
        let mut missing = Vec::new();
        for sid in sample_ids {
            match index.get(sid.as_str()) {
                Some(&i) => indices.push(i),
                None => missing.push(sid.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(CommunityError::SampleMismatch {
                missing_in_metadata: Vec::new(),
                missing_in_counts: missing,
            });
        }
        self.subset_samples(&indices)
    }

    /// Convert to a dense matrix (f64), taxa × samples.
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.n_taxa(), self.n_samples());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val as f64;
            }
        }
        dense
    }

    /// Per-sample proportions (each column sums to 1), taxa × samples.
    ///
    /// Samples with zero depth are left as all-zero columns.
    pub fn relative_abundance(&self) -> nalgebra::DMatrix<f64> {
        let depths = self.col_sums();
        let mut dense = self.to_dense();
        for (col, &depth) in depths.iter().enumerate() {
            if depth > 0 {
                let depth = depth as f64;
                for value in dense.column_mut(col).iter_mut() {
                    *value /= depth;
                }
            }
        }
        dense
    }
}

fn check_unique(kind: &'static str, ids: &[String]) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(CommunityError::DuplicateId {
                kind,
                id: id.clone(),
            });
        }
    }
    Ok(())
}
