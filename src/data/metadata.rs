//! Sample metadata: group labels and precomputed per-sample scalars.

use crate::error::{CommunityError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;

/// A variable value that can be categorical, continuous, or ordinal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical variable with string levels.
    Categorical(String),
    /// Continuous numeric variable.
    Continuous(f64),
    /// Ordinal variable with integer rank.
    Ordinal(i64),
    /// Missing value.
    Missing,
}

impl Variable {
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_continuous(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            Variable::Ordinal(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Render any non-missing value as a group label.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Variable::Categorical(s) => Some(s.clone()),
            Variable::Continuous(v) => Some(v.to_string()),
            Variable::Ordinal(v) => Some(v.to_string()),
            Variable::Missing => None,
        }
    }
}

/// Inferred type of a metadata column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
}

/// Sample metadata containing variables for each sample.
#[derive(Debug, Clone, Default)]
pub struct Metadata {
    /// Sample IDs in order.
    sample_ids: Vec<String>,
    /// Column names.
    column_names: Vec<String>,
    /// Data stored as sample_id -> column_name -> Variable.
    data: HashMap<String, HashMap<String, Variable>>,
    /// Type of each column.
    column_types: HashMap<String, VariableType>,
}

fn is_missing_token(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan")
}

impl Metadata {
    /// Create empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load metadata from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with column names (first column is sample ID)
    /// - Subsequent rows: sample ID followed by variable values
    ///
    /// Columns are inferred as continuous if all non-missing values parse as
    /// numbers, otherwise categorical. `NA`, `nan` and empty cells are missing.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .flexible(true)
            .from_path(path)?;

        let header = reader.headers()?.clone();
        if header.len() < 2 {
            return Err(CommunityError::EmptyData(
                "Metadata must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> =
            header.iter().skip(1).map(|s| s.trim().to_string()).collect();

        let mut raw_data: Vec<(String, Vec<String>)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            if record.iter().all(|f| f.trim().is_empty()) {
                continue;
            }
            let sample_id = record[0].trim().to_string();
            let values: Vec<String> = record.iter().skip(1).map(|s| s.trim().to_string()).collect();
            raw_data.push((sample_id, values));
        }

        let rows: Vec<(String, Vec<&str>)> = raw_data
            .iter()
            .map(|(sid, values)| (sid.clone(), values.iter().map(String::as_str).collect()))
            .collect();
        Self::from_rows(column_names, rows)
    }

    /// Build metadata from in-memory rows of raw string cells.
    pub fn from_rows(column_names: Vec<String>, rows: Vec<(String, Vec<&str>)>) -> Result<Self> {
        if rows.is_empty() {
            return Err(CommunityError::EmptyData("No samples in metadata".to_string()));
        }

        let mut seen = HashSet::new();
        for (sid, _) in &rows {
            if !seen.insert(sid.as_str()) {
                return Err(CommunityError::DuplicateId {
                    kind: "sample",
                    id: sid.clone(),
                });
            }
        }

        let mut column_types = HashMap::new();
        for (col_idx, col_name) in column_names.iter().enumerate() {
            let all_numeric = rows.iter().all(|(_, values)| {
                values
                    .get(col_idx)
                    .map(|v| is_missing_token(v) || v.parse::<f64>().is_ok())
                    .unwrap_or(true)
            });
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            column_types.insert(col_name.clone(), var_type);
        }

        let mut sample_ids = Vec::with_capacity(rows.len());
        let mut data = HashMap::with_capacity(rows.len());

        for (sample_id, values) in rows {
            let mut sample_data = HashMap::new();
            for (col_idx, col_name) in column_names.iter().enumerate() {
                let var = match values.get(col_idx) {
                    Some(raw) if !is_missing_token(raw) => match column_types[col_name] {
                        VariableType::Continuous => raw
                            .parse::<f64>()
                            .map(Variable::Continuous)
                            .unwrap_or(Variable::Missing),
                        VariableType::Categorical => Variable::Categorical(raw.to_string()),
                    },
                    _ => Variable::Missing,
                };
                sample_data.insert(col_name.clone(), var);
            }
            sample_ids.push(sample_id.clone());
            data.insert(sample_id, sample_data);
        }

        Ok(Self {
            sample_ids,
            column_names,
            data,
            column_types,
        })
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Get a variable value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// Get all values for a column, in sample order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        if !self.has_column(column) {
            return Err(CommunityError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| {
                self.data
                    .get(sid)
                    .and_then(|m| m.get(column))
                    .unwrap_or(&Variable::Missing)
            })
            .collect())
    }

    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Group label for every sample, in sample order.
    ///
    /// Fails listing the samples whose label is missing.
    pub fn group_labels(&self, column: &str) -> Result<Vec<String>> {
        let values = self.column(column)?;
        let mut labels = Vec::with_capacity(values.len());
        let mut missing = Vec::new();
        for (sid, value) in self.sample_ids.iter().zip(values) {
            match value.as_label() {
                Some(label) => labels.push(label),
                None => missing.push(sid.as_str()),
            }
        }
        if !missing.is_empty() {
            return Err(CommunityError::InvalidVariableType {
                column: column.to_string(),
                reason: format!("missing group label for samples {:?}", missing),
            });
        }
        Ok(labels)
    }

    /// Numeric values of a column, in sample order.
    pub fn numeric_column(&self, column: &str) -> Result<Vec<f64>> {
        if self.column_type(column) != Some(VariableType::Continuous) {
            return Err(CommunityError::InvalidVariableType {
                column: column.to_string(),
                reason: "expected a numeric column".to_string(),
            });
        }
        self.column(column)?
            .into_iter()
            .zip(&self.sample_ids)
            .map(|(v, sid)| {
                v.as_continuous().ok_or_else(|| CommunityError::InvalidVariableType {
                    column: column.to_string(),
                    reason: format!("missing value for sample '{}'", sid),
                })
            })
            .collect()
    }

    /// Sorted unique labels of a column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let labels: BTreeSet<String> = self
            .column(column)?
            .iter()
            .filter_map(|v| v.as_label())
            .collect();
        Ok(labels.into_iter().collect())
    }

    /// Subset metadata to the specified samples, in the given order.
    pub fn subset_samples(&self, sample_ids: &[String]) -> Result<Self> {
        let mut new_data = HashMap::with_capacity(sample_ids.len());
        let mut missing = Vec::new();

        for sid in sample_ids {
            match self.data.get(sid) {
                Some(sample_data) => {
                    new_data.insert(sid.clone(), sample_data.clone());
                }
                None => missing.push(sid.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(CommunityError::SampleMismatch {
                missing_in_metadata: missing,
                missing_in_counts: Vec::new(),
            });
        }

        Ok(Self {
            sample_ids: sample_ids.to_vec(),
            column_names: self.column_names.clone(),
            data: new_data,
            column_types: self.column_types.clone(),
        })
    }

    /// Align metadata to a count matrix's sample order.
    ///
    /// Both sample sets must be identical; the error lists the offending
    /// identifiers on each side.
    pub fn align_to(&self, sample_ids: &[String]) -> Result<Self> {
        let ours: HashSet<&str> = self.sample_ids.iter().map(String::as_str).collect();
        let theirs: HashSet<&str> = sample_ids.iter().map(String::as_str).collect();

        let mut missing_in_metadata: Vec<String> = sample_ids
            .iter()
            .filter(|s| !ours.contains(s.as_str()))
            .cloned()
            .collect();
        let mut missing_in_counts: Vec<String> = self
            .sample_ids
            .iter()
            .filter(|s| !theirs.contains(s.as_str()))
            .cloned()
            .collect();

        if !missing_in_metadata.is_empty() || !missing_in_counts.is_empty() {
            missing_in_metadata.sort();
            missing_in_counts.sort();
            return Err(CommunityError::SampleMismatch {
                missing_in_metadata,
                missing_in_counts,
            });
        }
        self.subset_samples(sample_ids)
    }

    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}
