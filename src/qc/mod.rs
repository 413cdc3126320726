//! Quality control: rule-based evaluation and sequence anomaly detection.

pub mod anomaly;
pub mod rules;
pub mod scoring;

#[cfg(test)]
pub mod tests;

pub use anomaly::{AnomalyDetector, DetectionReport, ModelInfo};
pub use rules::{QualityRuleEngine, RuleSet};
