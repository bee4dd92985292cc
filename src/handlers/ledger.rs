//! Ledger lookup handler

use axum::{
    extract::{Path, State},
    Json,
};

use crate::models::LedgerHistoryResponse;
use crate::{AppResult, AppState};

/// GET /api/v1/ledger/history/:address
pub async fn history(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> AppResult<Json<LedgerHistoryResponse>> {
    let transactions = state.ledger.history(&address).await?;

    Ok(Json(LedgerHistoryResponse {
        success: true,
        transactions,
    }))
}
