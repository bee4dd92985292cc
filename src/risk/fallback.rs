//! Fallback classifier
//!
//! Deterministic two-breakpoint heuristic used whenever the external scorer
//! is unavailable. No I/O.

use rust_decimal::Decimal;

use crate::models::{AnalysisMetrics, RiskLevel, RiskResult, RiskSource};

/// Below this amount a transaction is `Low`
pub const MEDIUM_THRESHOLD: Decimal = Decimal::from_parts(1000, 0, 0, false, 0);

/// Above this amount a transaction is `High`; the bound itself is `Medium`
pub const HIGH_THRESHOLD: Decimal = Decimal::from_parts(5000, 0, 0, false, 0);

struct Tier {
    level: RiskLevel,
    confidence: f64,
    score: f64,
    factors: &'static [&'static str],
    suggestions: &'static [&'static str],
}

const LOW: Tier = Tier {
    level: RiskLevel::Low,
    confidence: 0.80,
    score: 0.2,
    factors: &["Amount within normal range"],
    suggestions: &[
        "Standard security measures are sufficient",
        "Verify the recipient address before sending",
    ],
};

const MEDIUM: Tier = Tier {
    level: RiskLevel::Medium,
    confidence: 0.85,
    score: 0.5,
    factors: &["Large transaction amount"],
    suggestions: &[
        "Enable two-factor authentication",
        "Verify recipient identity",
    ],
};

const HIGH: Tier = Tier {
    level: RiskLevel::High,
    confidence: 0.90,
    score: 0.8,
    factors: &["Large transaction amount", "Very large transaction amount"],
    suggestions: &[
        "Enable two-factor authentication",
        "Verify recipient identity",
        "Consider splitting large transactions",
    ],
};

fn tier_for(amount: Decimal) -> Option<&'static Tier> {
    if amount <= Decimal::ZERO {
        None
    } else if amount < MEDIUM_THRESHOLD {
        Some(&LOW)
    } else if amount <= HIGH_THRESHOLD {
        Some(&MEDIUM)
    } else {
        Some(&HIGH)
    }
}

/// Classify by amount alone. `None` only for non-positive amounts, which
/// input validation rejects before this is reached.
pub fn classify(amount: Decimal) -> Option<RiskResult> {
    let tier = tier_for(amount)?;

    Some(RiskResult {
        risk_level: tier.level,
        confidence: tier.confidence,
        details: format!("Risk score: {:.2}", tier.score),
        risk_factors: tier.factors.iter().map(|s| s.to_string()).collect(),
        security_suggestions: tier.suggestions.iter().map(|s| s.to_string()).collect(),
        analysis_metrics: AnalysisMetrics {
            velocity_score: Some(1.0),
            frequency_score: Some(0.1),
            amount_deviation: Some(1.0),
            historical_risk_score: Some(tier.score),
            time_based_risk: Some(0.2),
            pattern_match: Some("Normal".to_string()),
            ..Default::default()
        },
        transaction_category: tier.level.category(),
        source: RiskSource::Fallback,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn level(amount: Decimal) -> RiskLevel {
        classify(amount).unwrap().risk_level
    }

    #[test]
    fn test_reference_amounts() {
        assert_eq!(level(dec!(500)), RiskLevel::Low);
        assert_eq!(level(dec!(2500)), RiskLevel::Medium);
        assert_eq!(level(dec!(7000)), RiskLevel::High);
    }

    #[test]
    fn test_breakpoints() {
        assert_eq!(level(dec!(999.999999)), RiskLevel::Low);
        assert_eq!(level(dec!(1000)), RiskLevel::Medium);
        assert_eq!(level(dec!(5000)), RiskLevel::Medium);
        assert_eq!(level(dec!(5000.000000000000000001)), RiskLevel::High);
        assert_eq!(level(dec!(0.000000000000000001)), RiskLevel::Low);
    }

    #[test]
    fn test_non_positive_has_no_tier() {
        assert!(classify(Decimal::ZERO).is_none());
        assert!(classify(dec!(-10)).is_none());
    }

    #[test]
    fn test_tier_payload() {
        let high = classify(dec!(10000)).unwrap();
        assert_eq!(high.source, RiskSource::Fallback);
        assert_eq!(high.confidence, 0.90);
        assert_eq!(high.details, "Risk score: 0.80");
        assert_eq!(high.transaction_category, "High-Risk");
        assert_eq!(high.risk_factors.len(), 2);
        assert_eq!(high.analysis_metrics.historical_risk_score, Some(0.8));

        let low = classify(dec!(10)).unwrap();
        assert_eq!(low.confidence, 0.80);
        assert_ne!(low.security_suggestions, high.security_suggestions);
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(classify(dec!(2500)), classify(dec!(2500)));
    }
}
