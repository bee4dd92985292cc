//! Risk assessment model

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of risk levels.
///
/// The external scorer may answer with any of the five; the fallback
/// classifier only produces `Low`, `Medium` and `High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    #[serde(rename = "Low")]
    Low,
    #[serde(rename = "Low-Medium")]
    LowMedium,
    #[serde(rename = "Medium")]
    Medium,
    #[serde(rename = "Medium-High")]
    MediumHigh,
    #[serde(rename = "High")]
    High,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        Self::Low,
        Self::LowMedium,
        Self::Medium,
        Self::MediumHigh,
        Self::High,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::LowMedium => "Low-Medium",
            Self::Medium => "Medium",
            Self::MediumHigh => "Medium-High",
            Self::High => "High",
        }
    }

    /// Category label attached to results, e.g. `Medium-Risk`
    pub fn category(&self) -> String {
        format!("{}-Risk", self.as_str())
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown risk level '{0}'")]
pub struct UnknownRiskLevel(pub String);

impl FromStr for RiskLevel {
    type Err = UnknownRiskLevel;

    /// Lenient parse: case-insensitive, ignores `-`, `_` and spaces.
    /// `Critical` folds into `High`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match key.as_str() {
            "low" => Ok(Self::Low),
            "lowmedium" => Ok(Self::LowMedium),
            "medium" => Ok(Self::Medium),
            "mediumhigh" => Ok(Self::MediumHigh),
            "high" | "critical" => Ok(Self::High),
            _ => Err(UnknownRiskLevel(s.to_string())),
        }
    }
}

/// Which classification path produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSource {
    Model,
    Fallback,
}

impl RiskSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Model => "model",
            Self::Fallback => "fallback",
        }
    }
}

/// Named scores reported alongside a classification.
///
/// Known keys are typed; anything else the scorer sends is kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_deviation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub historical_risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_based_risk: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_match: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Outcome of classifying one transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskResult {
    pub risk_level: RiskLevel,
    /// Fraction in `[0, 1]`
    pub confidence: f64,
    pub details: String,
    pub risk_factors: Vec<String>,
    pub security_suggestions: Vec<String>,
    pub analysis_metrics: AnalysisMetrics,
    pub transaction_category: String,
    pub source: RiskSource,
}
