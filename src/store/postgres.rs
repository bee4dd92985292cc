//! PostgreSQL store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    normalize_email, AnalysisMetrics, ClassificationLogEntry, NewTransactionRecord, NewUser,
    RiskLevelFilter, TransactionFilter, TransactionRecord, User,
};

const TRANSACTION_COLUMNS: &str = "id, owner_id, amount, recipient, risk_level, confidence, \
     details, risk_factors, security_suggestions, analysis_metrics, transaction_category, \
     ledger_hash, created_at";

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    name: Option<String>,
    last_login: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            name: row.name,
            last_login: row.last_login,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    owner_id: String,
    amount: Decimal,
    recipient: String,
    risk_level: String,
    confidence: f64,
    details: String,
    risk_factors: Vec<String>,
    security_suggestions: Vec<String>,
    analysis_metrics: Json<AnalysisMetrics>,
    transaction_category: String,
    ledger_hash: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for TransactionRecord {
    type Error = StoreError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        let risk_level = row
            .risk_level
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("transaction {}: {}", row.id, e)))?;

        Ok(TransactionRecord {
            id: row.id,
            owner_id: row.owner_id,
            amount: row.amount.normalize(),
            recipient: row.recipient,
            risk_level,
            confidence: row.confidence,
            details: row.details,
            risk_factors: row.risk_factors,
            security_suggestions: row.security_suggestions,
            analysis_metrics: row.analysis_metrics.0,
            transaction_category: row.transaction_category,
            ledger_hash: row.ledger_hash,
            created_at: row.created_at,
        })
    }
}

/// Escape LIKE wildcards so the recipient filter is a literal substring
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn build_history_query(filter: &TransactionFilter) -> QueryBuilder<'static, Postgres> {
    let mut qb = QueryBuilder::new(format!("SELECT {} FROM transactions WHERE TRUE", TRANSACTION_COLUMNS));

    if let Some(owner) = &filter.owner_id {
        qb.push(" AND owner_id = ").push_bind(owner.clone());
    }
    if let RiskLevelFilter::Only(level) = filter.risk_level {
        qb.push(" AND risk_level = ").push_bind(level.as_str());
    }
    if let Some(recipient) = &filter.recipient {
        qb.push(" AND recipient ILIKE ")
            .push_bind(format!("%{}%", escape_like(recipient)));
    }
    if let Some(from) = filter.created_from() {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(before) = filter.created_before() {
        qb.push(" AND created_at < ").push_bind(before);
    }

    qb.push(" ORDER BY created_at DESC, seq DESC");

    if let Some(limit) = filter.limit {
        qb.push(" LIMIT ").push_bind(limit.max(0));
    }
    qb
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn create_user(&self, new: NewUser) -> Result<User, StoreError> {
        let email = normalize_email(&new.email);
        let user = NewUser { email, ..new }.into_user();

        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email, password_hash, name, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (email) DO NOTHING
            RETURNING id, email, password_hash, name, last_login, created_at
            "#
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.created_at)
        .fetch_optional(&self.pool)
        .await?;

        row.map(User::from)
            .ok_or_else(|| StoreError::Conflict(format!("user {}", user.email)))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, password_hash, name, last_login, created_at FROM users WHERE email = $1"
        )
        .bind(normalize_email(email))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn log_classification(&self, entry: ClassificationLogEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO classification_log (id, amount, recipient, risk_level, confidence, source, result, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#
        )
        .bind(entry.id)
        .bind(entry.amount)
        .bind(&entry.recipient)
        .bind(entry.result.risk_level.as_str())
        .bind(entry.result.confidence)
        .bind(entry.result.source.as_str())
        .bind(Json(&entry.result))
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn append_transaction(
        &self,
        new: NewTransactionRecord,
    ) -> Result<TransactionRecord, StoreError> {
        let (risk_level, confidence) = new.required_fields().map_err(StoreError::InvalidRecord)?;
        let record = new.into_record(risk_level, confidence);

        sqlx::query(
            r#"
            INSERT INTO transactions (
                id, owner_id, amount, recipient, risk_level, confidence, details,
                risk_factors, security_suggestions, analysis_metrics, transaction_category,
                ledger_hash, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        )
        .bind(record.id)
        .bind(&record.owner_id)
        .bind(record.amount)
        .bind(&record.recipient)
        .bind(record.risk_level.as_str())
        .bind(record.confidence)
        .bind(&record.details)
        .bind(&record.risk_factors)
        .bind(&record.security_suggestions)
        .bind(Json(&record.analysis_metrics))
        .bind(&record.transaction_category)
        .bind(&record.ledger_hash)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        tracing::debug!("Transaction {} stored for owner {}", record.id, record.owner_id);
        Ok(record)
    }

    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let rows = build_history_query(filter)
            .build_query_as::<TransactionRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TransactionRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RiskLevel;
    use chrono::NaiveDate;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("0xab_c%"), "0xab\\_c\\%");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_owner_query_sql() {
        let qb = build_history_query(&TransactionFilter::for_owner("alice"));
        let sql = qb.sql();

        assert!(sql.contains("owner_id = $1"));
        assert!(sql.ends_with("ORDER BY created_at DESC, seq DESC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn test_full_filter_sql() {
        let filter = TransactionFilter {
            owner_id: None,
            risk_level: RiskLevelFilter::Only(RiskLevel::High),
            recipient: Some("beef".to_string()),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 31),
            limit: Some(200),
        };
        let qb = build_history_query(&filter);
        let sql = qb.sql();

        assert!(!sql.contains("owner_id ="));
        assert!(sql.contains("risk_level = $1"));
        assert!(sql.contains("recipient ILIKE $2"));
        assert!(sql.contains("created_at >= $3"));
        assert!(sql.contains("created_at < $4"));
        assert!(sql.ends_with("LIMIT $5"));
    }
}
