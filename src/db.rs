//! Database module - PostgreSQL connection and migrations

use sqlx::{postgres::PgPoolOptions, PgPool};

/// Create database connection pool
pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Multi-statement script, so it goes through the simple query protocol
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await?;

    tracing::info!("Database schema applied successfully");
    Ok(())
}

/// Database schema SQL
const SCHEMA_SQL: &str = r#"
-- Users
CREATE TABLE IF NOT EXISTS users (
    id UUID PRIMARY KEY,
    email VARCHAR(255) NOT NULL UNIQUE,
    password_hash VARCHAR(255) NOT NULL,
    name VARCHAR(255),
    last_login TIMESTAMPTZ,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Classification log (append-only audit trail, no read API)
CREATE TABLE IF NOT EXISTS classification_log (
    id UUID PRIMARY KEY,
    amount NUMERIC(40, 18) NOT NULL,
    recipient VARCHAR(255) NOT NULL,
    risk_level VARCHAR(20) NOT NULL,
    confidence DOUBLE PRECISION NOT NULL,
    source VARCHAR(20) NOT NULL,
    result JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Transaction records (append-only, filtered read)
CREATE TABLE IF NOT EXISTS transactions (
    seq BIGSERIAL,
    id UUID PRIMARY KEY,
    owner_id VARCHAR(255) NOT NULL,
    amount NUMERIC(40, 18) NOT NULL,
    recipient VARCHAR(255) NOT NULL,
    risk_level VARCHAR(20) NOT NULL,
    confidence DOUBLE PRECISION NOT NULL,
    details TEXT NOT NULL DEFAULT '',
    risk_factors TEXT[] NOT NULL DEFAULT '{}',
    security_suggestions TEXT[] NOT NULL DEFAULT '{}',
    analysis_metrics JSONB NOT NULL DEFAULT '{}',
    transaction_category TEXT NOT NULL DEFAULT '',
    ledger_hash VARCHAR(80),
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

-- Indexes
CREATE INDEX IF NOT EXISTS idx_transactions_owner ON transactions(owner_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_created ON transactions(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_transactions_risk ON transactions(risk_level);
CREATE INDEX IF NOT EXISTS idx_classification_log_created ON classification_log(created_at);
"#;
