//! Risk classification
//!
//! `RiskClassifier::classify` tries the configured external scorer first
//! and drops to the deterministic fallback on any failure (transport error,
//! timeout, non-zero exit, malformed answer). Every successful
//! classification is appended to the classification log.

pub mod fallback;
pub mod scorer;

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::ledger::units::LEDGER_DECIMALS;
use crate::models::{ClassificationLogEntry, RiskResult};
use crate::store::Store;
use scorer::{parse_response, RiskScorer, ScoreRequest, ScorerError};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("classification unavailable: {0}")]
    Unavailable(String),
}

/// Amounts must stay below 10^22; `NUMERIC(40, 18)` leaves 22 integer digits
const AMOUNT_CEILING: i128 = 10_000_000_000_000_000_000_000;

/// Matches the `VARCHAR(255)` recipient columns
const MAX_RECIPIENT_CHARS: usize = 255;

/// Checks shared by every route that accepts `{amount, recipient}`
pub fn validate_input(
    amount: Option<Decimal>,
    recipient: Option<&str>,
) -> Result<(Decimal, String), ClassifyError> {
    let recipient = recipient.map(str::trim).filter(|r| !r.is_empty());
    let (amount, recipient) = match (amount, recipient) {
        (Some(amount), Some(recipient)) => (amount, recipient.to_string()),
        _ => {
            return Err(ClassifyError::InvalidInput(
                "Amount and recipient address are required".to_string(),
            ))
        }
    };

    if amount <= Decimal::ZERO {
        return Err(ClassifyError::InvalidInput("Amount must be greater than 0".to_string()));
    }
    if amount >= Decimal::from_i128_with_scale(AMOUNT_CEILING, 0) {
        return Err(ClassifyError::InvalidInput(
            "Amount must be less than 10^22".to_string(),
        ));
    }
    if recipient.chars().count() > MAX_RECIPIENT_CHARS {
        return Err(ClassifyError::InvalidInput(format!(
            "Recipient address must be at most {} characters",
            MAX_RECIPIENT_CHARS
        )));
    }
    if amount.normalize().scale() > LEDGER_DECIMALS {
        return Err(ClassifyError::InvalidInput(format!(
            "Amount supports at most {} decimal places",
            LEDGER_DECIMALS
        )));
    }

    Ok((amount, recipient))
}

pub struct RiskClassifier {
    scorer: Option<Arc<dyn RiskScorer>>,
    timeout: Duration,
    store: Arc<dyn Store>,
}

impl RiskClassifier {
    pub fn new(scorer: Option<Arc<dyn RiskScorer>>, timeout: Duration, store: Arc<dyn Store>) -> Self {
        Self { scorer, timeout, store }
    }

    /// Name of the preferred path, `none` when only the fallback is active
    pub fn scorer_name(&self) -> &'static str {
        self.scorer.as_ref().map(|s| s.name()).unwrap_or("none")
    }

    pub async fn classify(
        &self,
        amount: Decimal,
        recipient: &str,
        extra_features: Option<Value>,
    ) -> Result<RiskResult, ClassifyError> {
        let (amount, recipient) = validate_input(Some(amount), Some(recipient))?;

        let result = match self.score_with_model(amount, &recipient, extra_features).await {
            Some(result) => result,
            None => fallback::classify(amount).ok_or_else(|| {
                ClassifyError::Unavailable(format!("no fallback tier for amount {}", amount))
            })?,
        };

        tracing::debug!(
            "Classified {} -> {} ({}, confidence {:.2})",
            amount,
            result.risk_level,
            result.source.as_str(),
            result.confidence
        );

        let entry = ClassificationLogEntry::new(amount, &recipient, &result);
        if let Err(e) = self.store.log_classification(entry).await {
            tracing::warn!("Failed to append classification log: {}", e);
        }

        Ok(result)
    }

    async fn score_with_model(
        &self,
        amount: Decimal,
        recipient: &str,
        extra_features: Option<Value>,
    ) -> Option<RiskResult> {
        let scorer = self.scorer.as_ref()?;

        let request = ScoreRequest {
            amount,
            recipient_address: recipient.to_string(),
            extra_features: extra_features.unwrap_or_else(|| Value::Object(Default::default())),
        };

        let outcome = match tokio::time::timeout(self.timeout, scorer.score(&request)).await {
            Ok(answer) => answer.and_then(parse_response),
            Err(_) => Err(ScorerError::Timeout(self.timeout)),
        };

        match outcome {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!("{} scorer failed, using fallback classification: {}", scorer.name(), e);
                None
            }
        }
    }
}
