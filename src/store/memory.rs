//! In-process store

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{Store, StoreError};
use crate::models::{
    normalize_email, ClassificationLogEntry, NewTransactionRecord, NewUser, TransactionFilter,
    TransactionRecord, User,
};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    classification_log: Vec<ClassificationLogEntry>,
    transactions: Vec<TransactionRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn classification_count(&self) -> usize {
        self.tables.read().classification_log.len()
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create_user(&self, mut new: NewUser) -> Result<User, StoreError> {
        new.email = normalize_email(&new.email);

        let mut tables = self.tables.write();
        if tables.users.iter().any(|u| u.email == new.email) {
            return Err(StoreError::Conflict(format!("user {}", new.email)));
        }

        let user = new.into_user();
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let email = normalize_email(email);
        Ok(self.tables.read().users.iter().find(|u| u.email == email).cloned())
    }

    async fn touch_last_login(&self, id: Uuid) -> Result<(), StoreError> {
        if let Some(user) = self.tables.write().users.iter_mut().find(|u| u.id == id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }

    async fn log_classification(&self, entry: ClassificationLogEntry) -> Result<(), StoreError> {
        self.tables.write().classification_log.push(entry);
        Ok(())
    }

    async fn append_transaction(
        &self,
        new: NewTransactionRecord,
    ) -> Result<TransactionRecord, StoreError> {
        let (risk_level, confidence) = new.required_fields().map_err(StoreError::InvalidRecord)?;
        let record = new.into_record(risk_level, confidence);

        self.tables.write().transactions.push(record.clone());
        Ok(record)
    }

    async fn query_transactions(
        &self,
        filter: &TransactionFilter,
    ) -> Result<Vec<TransactionRecord>, StoreError> {
        let tables = self.tables.read();

        // Walk newest insert first so the stable sort keeps that order on ties
        let mut rows: Vec<TransactionRecord> = tables
            .transactions
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            rows.truncate(limit.max(0) as usize);
        }
        Ok(rows)
    }
}
