//! Analysis configuration, serializable to and from YAML.

use crate::data::TableOrientation;
use crate::error::{CommunityError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Parameters of a two-group community comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Metadata column holding the group label.
    pub group_column: String,
    /// The two labels compared by SIMPER. Defaults to the first two sorted
    /// labels.
    pub groups: Option<Vec<String>>,
    /// Layout of the count table on disk.
    pub orientation: TableOrientation,
    /// Relative-abundance threshold applied to the whole matrix.
    pub global_threshold: f64,
    /// Relative-abundance threshold applied within each group before
    /// building its network.
    pub network_threshold: f64,
    /// Edges need a correlation p-value below this.
    pub p_threshold: f64,
    /// Edges need |r| above this.
    pub r_threshold: f64,
    /// PERMANOVA label permutations.
    pub permutations: usize,
    pub seed: u64,
    pub simper_top_n: usize,
    pub degree_top_n: usize,
    /// Significance level used in summaries.
    pub alpha: f64,
    /// Allowed relative deviation of sample depths from their mean.
    pub depth_tolerance: f64,
    /// Precomputed numeric metadata columns to compare across groups.
    pub alpha_columns: Vec<String>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            group_column: "group".to_string(),
            groups: None,
            orientation: TableOrientation::default(),
            global_threshold: 1e-4,
            network_threshold: 1e-3,
            p_threshold: 1e-3,
            r_threshold: 0.7,
            permutations: 999,
            seed: 42,
            simper_top_n: 10,
            degree_top_n: 10,
            alpha: 0.05,
            depth_tolerance: 0.05,
            alpha_columns: Vec::new(),
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(CommunityError::from)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }

    /// Reject out-of-range parameters before any computation.
    pub fn validate(&self) -> Result<()> {
        let unit_open = |name: &str, v: f64| -> Result<()> {
            if (0.0..1.0).contains(&v) {
                Ok(())
            } else {
                Err(CommunityError::InvalidParameter(format!(
                    "{} must be in [0, 1), got {}",
                    name, v
                )))
            }
        };
        unit_open("global_threshold", self.global_threshold)?;
        unit_open("network_threshold", self.network_threshold)?;
        unit_open("r_threshold", self.r_threshold)?;

        for (name, v) in [("p_threshold", self.p_threshold), ("alpha", self.alpha)] {
            if !(v > 0.0 && v <= 1.0) {
                return Err(CommunityError::InvalidParameter(format!(
                    "{} must be in (0, 1], got {}",
                    name, v
                )));
            }
        }
        if !(self.depth_tolerance >= 0.0 && self.depth_tolerance.is_finite()) {
            return Err(CommunityError::InvalidParameter(format!(
                "depth_tolerance must be a non-negative number, got {}",
                self.depth_tolerance
            )));
        }
        if self.permutations == 0 {
            return Err(CommunityError::InvalidParameter(
                "permutations must be at least 1".to_string(),
            ));
        }
        if self.group_column.is_empty() {
            return Err(CommunityError::InvalidParameter(
                "group_column must not be empty".to_string(),
            ));
        }
        if let Some(groups) = &self.groups {
            if groups.len() != 2 || groups[0] == groups[1] {
                return Err(CommunityError::InvalidParameter(format!(
                    "groups must name exactly two distinct labels, got {:?}",
                    groups
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::default();
        assert_eq!(config.group_column, "group");
        assert_eq!(config.global_threshold, 1e-4);
        assert_eq!(config.network_threshold, 1e-3);
        assert_eq!(config.p_threshold, 1e-3);
        assert_eq!(config.r_threshold, 0.7);
        assert_eq!(config.permutations, 999);
        assert_eq!(config.orientation, TableOrientation::SamplesAsRows);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_roundtrip_and_partial() {
        let config = AnalysisConfig {
            groups: Some(vec!["control".into(), "treated".into()]),
            seed: 7,
            ..Default::default()
        };
        let yaml = config.to_yaml().unwrap();
        assert_eq!(AnalysisConfig::from_yaml(&yaml).unwrap(), config);

        let partial = AnalysisConfig::from_yaml("group_column: site\npermutations: 99\n").unwrap();
        assert_eq!(partial.group_column, "site");
        assert_eq!(partial.permutations, 99);
        assert_eq!(partial.r_threshold, 0.7);
        assert_eq!(partial.orientation, TableOrientation::SamplesAsRows);

        let taxa_rows = AnalysisConfig::from_yaml("orientation: taxa_as_rows\n").unwrap();
        assert_eq!(taxa_rows.orientation, TableOrientation::TaxaAsRows);
    }

    #[test]
    fn test_validation() {
        assert!(AnalysisConfig::from_yaml("permutations: 0\n").is_err());
        assert!(AnalysisConfig::from_yaml("global_threshold: 1.5\n").is_err());
        assert!(AnalysisConfig::from_yaml("p_threshold: 0.0\n").is_err());
        assert!(AnalysisConfig::from_yaml("groups: [a]\n").is_err());
        assert!(AnalysisConfig::from_yaml("groups: [a, a]\n").is_err());
    }
}
