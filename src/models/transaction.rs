//! Transaction record model

use std::str::FromStr;

use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::risk::{AnalysisMetrics, RiskLevel, RiskResult, UnknownRiskLevel};

/// Row cap applied to the unrestricted history view
pub const GLOBAL_HISTORY_LIMIT: i64 = 200;

/// Persisted transaction. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub owner_id: String,
    pub amount: Decimal,
    pub recipient: String,
    pub risk_level: RiskLevel,
    pub confidence: f64,
    pub details: String,
    pub risk_factors: Vec<String>,
    pub security_suggestions: Vec<String>,
    pub analysis_metrics: AnalysisMetrics,
    pub transaction_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_hash: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for the record store.
///
/// `risk_level` and `confidence` are optional so the store can reject
/// incomplete records instead of trusting every caller.
#[derive(Debug, Clone)]
pub struct NewTransactionRecord {
    pub owner_id: String,
    pub amount: Decimal,
    pub recipient: String,
    pub risk_level: Option<RiskLevel>,
    pub confidence: Option<f64>,
    pub details: String,
    pub risk_factors: Vec<String>,
    pub security_suggestions: Vec<String>,
    pub analysis_metrics: AnalysisMetrics,
    pub transaction_category: String,
    pub ledger_hash: Option<String>,
}

impl NewTransactionRecord {
    /// Denormalize a classification into an insert payload
    pub fn from_risk(
        owner_id: impl Into<String>,
        amount: Decimal,
        recipient: impl Into<String>,
        risk: &RiskResult,
        ledger_hash: Option<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            amount,
            recipient: recipient.into(),
            risk_level: Some(risk.risk_level),
            confidence: Some(risk.confidence),
            details: risk.details.clone(),
            risk_factors: risk.risk_factors.clone(),
            security_suggestions: risk.security_suggestions.clone(),
            analysis_metrics: risk.analysis_metrics.clone(),
            transaction_category: risk.transaction_category.clone(),
            ledger_hash,
        }
    }

    /// Check required fields; returns the unwrapped risk level and confidence
    pub fn required_fields(&self) -> Result<(RiskLevel, f64), String> {
        if self.owner_id.trim().is_empty() {
            return Err("ownerId is required".to_string());
        }
        if self.amount <= Decimal::ZERO {
            return Err("amount must be greater than 0".to_string());
        }
        if self.recipient.trim().is_empty() {
            return Err("recipient is required".to_string());
        }
        let risk_level = self.risk_level.ok_or_else(|| "riskLevel is required".to_string())?;
        let confidence = self.confidence.ok_or_else(|| "confidence is required".to_string())?;
        Ok((risk_level, confidence))
    }

    pub fn into_record(self, risk_level: RiskLevel, confidence: f64) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            owner_id: self.owner_id,
            amount: self.amount,
            recipient: self.recipient,
            risk_level,
            confidence,
            details: self.details,
            risk_factors: self.risk_factors,
            security_suggestions: self.security_suggestions,
            analysis_metrics: self.analysis_metrics,
            transaction_category: self.transaction_category,
            ledger_hash: self.ledger_hash,
            created_at: Utc::now(),
        }
    }
}

/// Audit copy of a classification; never read back over the API
#[derive(Debug, Clone)]
pub struct ClassificationLogEntry {
    pub id: Uuid,
    pub amount: Decimal,
    pub recipient: String,
    pub result: RiskResult,
    pub created_at: DateTime<Utc>,
}

impl ClassificationLogEntry {
    pub fn new(amount: Decimal, recipient: &str, result: &RiskResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            recipient: recipient.to_string(),
            result: result.clone(),
            created_at: Utc::now(),
        }
    }
}

// ============================================================================
// QUERY FILTER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RiskLevelFilter {
    #[default]
    All,
    Only(RiskLevel),
}

impl RiskLevelFilter {
    pub fn accepts(&self, level: RiskLevel) -> bool {
        match self {
            Self::All => true,
            Self::Only(wanted) => *wanted == level,
        }
    }
}

impl FromStr for RiskLevelFilter {
    type Err = UnknownRiskLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        s.parse().map(Self::Only)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    /// `None` selects the unrestricted view
    pub owner_id: Option<String>,
    pub risk_level: RiskLevelFilter,
    /// Case-insensitive substring
    pub recipient: Option<String>,
    /// Inclusive, from 00:00 UTC
    pub start_date: Option<NaiveDate>,
    /// Inclusive calendar day; the bound is 00:00 UTC of the following day
    pub end_date: Option<NaiveDate>,
    pub limit: Option<i64>,
}

impl TransactionFilter {
    pub fn for_owner(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: Some(owner_id.into()),
            ..Default::default()
        }
    }

    pub fn created_from(&self) -> Option<DateTime<Utc>> {
        self.start_date
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn created_before(&self) -> Option<DateTime<Utc>> {
        self.end_date
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn matches(&self, record: &TransactionRecord) -> bool {
        if let Some(owner) = &self.owner_id {
            if &record.owner_id != owner {
                return false;
            }
        }
        if !self.risk_level.accepts(record.risk_level) {
            return false;
        }
        if let Some(needle) = &self.recipient {
            if !record.recipient.to_lowercase().contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if let Some(from) = self.created_from() {
            if record.created_at < from {
                return false;
            }
        }
        if let Some(before) = self.created_before() {
            if record.created_at >= before {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// API PAYLOADS
// ============================================================================

/// `{amount, recipient}` as sent by clients. Fields stay optional so missing
/// values surface as validation errors rather than decode failures.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictRequest {
    pub amount: Option<Decimal>,
    #[serde(alias = "recipientAddress")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub extra_features: Option<serde_json::Value>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionRequest {
    pub amount: Option<Decimal>,
    #[serde(alias = "recipientAddress")]
    pub recipient: Option<String>,
    #[serde(default)]
    pub extra_features: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub persist: bool,
    #[serde(default = "default_true")]
    pub record_on_ledger: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTransactionResponse {
    pub risk: RiskResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<TransactionRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_warning: Option<String>,
}

/// History query string. Dates are `YYYY-MM-DD`; empty values are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub risk_level: Option<String>,
    pub recipient: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl HistoryQuery {
    pub fn into_filter(self, owner_id: Option<String>) -> Result<TransactionFilter, String> {
        let risk_level = match self.risk_level.as_deref() {
            Some(raw) => raw.parse().map_err(|e: UnknownRiskLevel| e.to_string())?,
            None => RiskLevelFilter::All,
        };

        Ok(TransactionFilter {
            owner_id,
            risk_level,
            recipient: non_empty(self.recipient),
            start_date: parse_date(self.start_date, "startDate")?,
            end_date: parse_date(self.end_date, "endDate")?,
            limit: None,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_date(value: Option<String>, field: &str) -> Result<Option<NaiveDate>, String> {
    match non_empty(value) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| format!("{} must be formatted as YYYY-MM-DD", field)),
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub transactions: Vec<TransactionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn record(owner: &str, level: RiskLevel, recipient: &str, at: DateTime<Utc>) -> TransactionRecord {
        TransactionRecord {
            id: Uuid::new_v4(),
            owner_id: owner.to_string(),
            amount: dec!(10),
            recipient: recipient.to_string(),
            risk_level: level,
            confidence: 0.8,
            details: String::new(),
            risk_factors: vec![],
            security_suggestions: vec![],
            analysis_metrics: AnalysisMetrics::default(),
            transaction_category: level.category(),
            ledger_hash: None,
            created_at: at,
        }
    }

    #[test]
    fn test_date_range_end_is_exclusive_day_boundary() {
        let filter = TransactionFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 2),
            ..Default::default()
        };

        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let late_end_day = Utc.with_ymd_and_hms(2024, 3, 2, 23, 59, 59).unwrap();
        let next_day = Utc.with_ymd_and_hms(2024, 3, 3, 0, 0, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();

        assert!(filter.matches(&record("u", RiskLevel::Low, "0xabc", start)));
        assert!(filter.matches(&record("u", RiskLevel::Low, "0xabc", late_end_day)));
        assert!(!filter.matches(&record("u", RiskLevel::Low, "0xabc", next_day)));
        assert!(!filter.matches(&record("u", RiskLevel::Low, "0xabc", before)));
    }

    #[test]
    fn test_recipient_substring_is_case_insensitive() {
        let filter = TransactionFilter {
            recipient: Some("BEEF".to_string()),
            ..Default::default()
        };
        let now = Utc::now();

        assert!(filter.matches(&record("u", RiskLevel::Low, "0x00beef11", now)));
        assert!(!filter.matches(&record("u", RiskLevel::Low, "0x00bee11", now)));
    }

    #[test]
    fn test_risk_level_filter_parse() {
        assert_eq!("all".parse::<RiskLevelFilter>(), Ok(RiskLevelFilter::All));
        assert_eq!("ALL".parse::<RiskLevelFilter>(), Ok(RiskLevelFilter::All));
        assert_eq!("".parse::<RiskLevelFilter>(), Ok(RiskLevelFilter::All));
        assert_eq!(
            "High".parse::<RiskLevelFilter>(),
            Ok(RiskLevelFilter::Only(RiskLevel::High))
        );
        assert!("extreme".parse::<RiskLevelFilter>().is_err());
    }

    #[test]
    fn test_history_query_rejects_bad_date() {
        let query = HistoryQuery {
            start_date: Some("03/01/2024".to_string()),
            ..Default::default()
        };
        let err = query.into_filter(None).unwrap_err();
        assert!(err.contains("startDate"));
    }

    #[test]
    fn test_history_query_ignores_empty_values() {
        let query = HistoryQuery {
            risk_level: Some("all".to_string()),
            recipient: Some("  ".to_string()),
            start_date: Some(String::new()),
            end_date: None,
        };
        let filter = query.into_filter(Some("owner-1".to_string())).unwrap();

        assert_eq!(filter.owner_id.as_deref(), Some("owner-1"));
        assert_eq!(filter.risk_level, RiskLevelFilter::All);
        assert!(filter.recipient.is_none());
        assert!(filter.start_date.is_none());
    }

    #[test]
    fn test_required_fields() {
        let mut new = NewTransactionRecord {
            owner_id: "owner".to_string(),
            amount: dec!(5),
            recipient: "0xabc".to_string(),
            risk_level: Some(RiskLevel::Low),
            confidence: Some(0.8),
            details: String::new(),
            risk_factors: vec![],
            security_suggestions: vec![],
            analysis_metrics: AnalysisMetrics::default(),
            transaction_category: String::new(),
            ledger_hash: None,
        };
        assert_eq!(new.required_fields(), Ok((RiskLevel::Low, 0.8)));

        new.confidence = None;
        assert!(new.required_fields().unwrap_err().contains("confidence"));

        new.confidence = Some(0.8);
        new.owner_id = " ".to_string();
        assert!(new.required_fields().unwrap_err().contains("ownerId"));
    }
}
