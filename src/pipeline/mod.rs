//! Pipeline composition and execution for two-group community comparison.

mod config;
mod report;
mod runner;

pub use config::AnalysisConfig;
pub use report::{Analysis, AnalysisReport, GroupAnalysis, NetworkSummary, SimperSummary};
pub use runner::{Pipeline, PipelineStage};
