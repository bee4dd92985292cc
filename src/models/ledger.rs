//! Ledger entry model

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

/// One transaction as stored by the ledger contract. Read-only, never cached.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub amount: Decimal,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub verified: bool,
    pub risk_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerReceipt {
    pub ledger_hash: String,
}

#[derive(Debug, Serialize)]
pub struct LedgerHistoryResponse {
    pub success: bool,
    pub transactions: Vec<LedgerEntry>,
}
