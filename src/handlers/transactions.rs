//! Classification and transaction record handlers

use axum::{
    extract::{Query, State},
    extract::rejection::{JsonRejection, QueryRejection},
    Json,
};

use crate::config::LedgerFailurePolicy;
use crate::ledger::LedgerError;
use crate::middleware::auth::UserContext;
use crate::models::{
    HistoryQuery, HistoryResponse, LedgerReceipt, NewTransactionRecord, PredictRequest, RiskLevel,
    RiskResult, SubmitTransactionRequest, SubmitTransactionResponse, GLOBAL_HISTORY_LIMIT,
};
use crate::risk::validate_input;
use crate::{AppError, AppResult, AppState};

/// POST /api/v1/predict
pub async fn predict(
    State(state): State<AppState>,
    payload: Result<Json<PredictRequest>, JsonRejection>,
) -> AppResult<Json<RiskResult>> {
    let Json(req) = payload?;
    let (amount, recipient) = validate_input(req.amount, req.recipient.as_deref())?;

    let result = state.classifier.classify(amount, &recipient, req.extra_features).await?;
    Ok(Json(result))
}

/// POST /api/v1/transactions
///
/// classify -> ledger (optional) -> persist (optional). The ledger write goes
/// first so the stored record can carry its hash.
pub async fn submit(
    State(state): State<AppState>,
    user: UserContext,
    payload: Result<Json<SubmitTransactionRequest>, JsonRejection>,
) -> AppResult<Json<SubmitTransactionResponse>> {
    let Json(req) = payload?;
    let (amount, recipient) = validate_input(req.amount, req.recipient.as_deref())?;

    let risk = state.classifier.classify(amount, &recipient, req.extra_features).await?;

    let mut ledger_hash = None;
    let mut ledger_warning = None;

    // A deployment without a ledger skips this step silently
    if req.record_on_ledger && state.ledger.is_enabled() {
        match record_on_ledger(&state, amount, &recipient, risk.risk_level).await {
            Ok(receipt) => ledger_hash = Some(receipt.ledger_hash),
            Err(e) => match state.config.ledger_failure_policy {
                LedgerFailurePolicy::Abort => {
                    return Err(AppError::LedgerError(format!("Ledger recording failed: {}", e)));
                }
                LedgerFailurePolicy::Soft => {
                    tracing::warn!("Ledger recording failed for user {}: {}", user.user_id, e);
                    ledger_warning = Some(format!("Ledger recording failed: {}", e));
                }
            },
        }
    }

    let record = if req.persist {
        let new = NewTransactionRecord::from_risk(
            user.owner_id(),
            amount,
            recipient,
            &risk,
            ledger_hash.clone(),
        );
        let record = state.store.append_transaction(new).await?;
        tracing::info!("Stored transaction {} for {} ({})", record.id, user.email, user.user_id);
        Some(record)
    } else {
        None
    };

    Ok(Json(SubmitTransactionResponse {
        risk,
        record,
        ledger_hash,
        ledger_warning,
    }))
}

async fn record_on_ledger(
    state: &AppState,
    amount: rust_decimal::Decimal,
    recipient: &str,
    risk_level: RiskLevel,
) -> Result<LedgerReceipt, LedgerError> {
    let signer = state
        .signer
        .as_deref()
        .ok_or(LedgerError::NotConfigured("LEDGER_SIGNING_KEY"))?;

    state.ledger.record(amount, recipient, risk_level, signer).await
}

/// GET /api/v1/transactions/history
pub async fn history(
    State(state): State<AppState>,
    user: UserContext,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Query(query) = query?;
    let filter = query
        .into_filter(Some(user.owner_id()))
        .map_err(AppError::ValidationError)?;

    let transactions = state.store.query_transactions(&filter).await?;
    Ok(Json(HistoryResponse { transactions }))
}

/// GET /api/v1/transactions/all
pub async fn all(
    State(state): State<AppState>,
    _user: UserContext,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Query(query) = query?;
    let mut filter = query.into_filter(None).map_err(AppError::ValidationError)?;
    filter.limit = Some(GLOBAL_HISTORY_LIMIT);

    let transactions = state.store.query_transactions(&filter).await?;
    Ok(Json(HistoryResponse { transactions }))
}
