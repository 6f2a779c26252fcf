//! PostgreSQL storage implementation.
//!
//! Ledgers live in the `ledgers` table with a `version` column; commits use
//! `UPDATE ... WHERE version = $expected` inside a transaction that also
//! inserts the journal row, so the check and the write cannot interleave with
//! another writer.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};

use usage_ledger_core::{EntryKind, Ledger, LedgerEntry, SubscriptionId};

use crate::error::{Result, StoreError};
use crate::{next_version, Store};

/// Maximum pooled connections.
const MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL-backed storage implementation.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect to the database at `database_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot connect.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct LedgerRow {
    subscription_id: String,
    customer_id: String,
    emissions_available: i64,
    emissions_used: i64,
    credit_balance: i64,
    credits_used: i64,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for Ledger {
    type Error = StoreError;

    fn try_from(row: LedgerRow) -> Result<Self> {
        Ok(Self {
            subscription_id: parse(&row.subscription_id)?,
            customer_id: parse(&row.customer_id)?,
            emissions_available: row.emissions_available,
            emissions_used: row.emissions_used,
            credit_balance: row.credit_balance,
            credits_used: row.credits_used,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: String,
    subscription_id: String,
    kind: String,
    amount: i64,
    balance_after: i64,
    reason: String,
    reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<EntryRow> for LedgerEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self> {
        Ok(Self {
            id: parse(&row.id)?,
            subscription_id: parse(&row.subscription_id)?,
            kind: row.kind.parse::<EntryKind>().map_err(StoreError::Serialization)?,
            amount: row.amount,
            balance_after: row.balance_after,
            reason: row.reason,
            reference: row.reference,
            created_at: row.created_at,
        })
    }
}

fn parse<T>(value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Serialization(format!("{value}: {e}")))
}

const SELECT_LEDGER: &str = "SELECT subscription_id, customer_id, emissions_available, \
     emissions_used, credit_balance, credits_used, version, created_at, updated_at \
     FROM ledgers WHERE subscription_id = $1";

#[async_trait]
impl Store for PgStore {
    async fn get_ledger(&self, subscription_id: &SubscriptionId) -> Result<Option<Ledger>> {
        sqlx::query_as::<_, LedgerRow>(SELECT_LEDGER)
            .bind(subscription_id.as_str())
            .fetch_optional(&self.pool)
            .await?
            .map(Ledger::try_from)
            .transpose()
    }

    async fn create_ledger(&self, ledger: &Ledger) -> Result<Ledger> {
        sqlx::query(
            "INSERT INTO ledgers (subscription_id, customer_id, emissions_available, \
             emissions_used, credit_balance, credits_used, version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (subscription_id) DO NOTHING",
        )
        .bind(ledger.subscription_id.as_str())
        .bind(ledger.customer_id.as_str())
        .bind(ledger.emissions_available)
        .bind(ledger.emissions_used)
        .bind(ledger.credit_balance)
        .bind(ledger.credits_used)
        .bind(ledger.version)
        .bind(ledger.created_at)
        .bind(ledger.updated_at)
        .execute(&self.pool)
        .await?;

        self.get_ledger(&ledger.subscription_id)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "ledger",
                id: ledger.subscription_id.to_string(),
            })
    }

    async fn commit(&self, ledger: &Ledger, entry: &LedgerEntry) -> Result<Ledger> {
        let committed = next_version(ledger);
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE ledgers SET emissions_available = $3, emissions_used = $4, \
             credit_balance = $5, credits_used = $6, version = $7, updated_at = $8 \
             WHERE subscription_id = $1 AND version = $2",
        )
        .bind(ledger.subscription_id.as_str())
        .bind(ledger.version)
        .bind(committed.emissions_available)
        .bind(committed.emissions_used)
        .bind(committed.credit_balance)
        .bind(committed.credits_used)
        .bind(committed.version)
        .bind(committed.updated_at)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() == 0 {
            let actual: Option<i64> =
                sqlx::query_scalar("SELECT version FROM ledgers WHERE subscription_id = $1")
                    .bind(ledger.subscription_id.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match actual {
                Some(actual) => StoreError::VersionConflict {
                    subscription_id: ledger.subscription_id.to_string(),
                    expected: ledger.version,
                    actual,
                },
                None => StoreError::NotFound {
                    entity: "ledger",
                    id: ledger.subscription_id.to_string(),
                },
            });
        }

        let inserted = sqlx::query(
            "INSERT INTO ledger_entries (id, subscription_id, kind, amount, balance_after, \
             reason, reference, created_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (reference) DO NOTHING",
        )
        .bind(entry.id.to_string())
        .bind(entry.subscription_id.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(&entry.reason)
        .bind(entry.reference.as_deref())
        .bind(entry.created_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            // Dropping the transaction rolls back the ledger update.
            return Err(StoreError::DuplicateReference {
                reference: entry.reference.clone().unwrap_or_default(),
            });
        }

        tx.commit().await?;

        tracing::debug!(
            subscription_id = %committed.subscription_id,
            version = committed.version,
            entry_id = %entry.id,
            "Ledger committed"
        );

        Ok(committed)
    }

    async fn list_entries(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let offset = i64::try_from(offset).unwrap_or(i64::MAX);

        sqlx::query_as::<_, EntryRow>(
            "SELECT id, subscription_id, kind, amount, balance_after, reason, reference, \
             created_at FROM ledger_entries WHERE subscription_id = $1 \
             ORDER BY id DESC LIMIT $2 OFFSET $3",
        )
        .bind(subscription_id.as_str())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(LedgerEntry::try_from)
        .collect()
    }

    async fn has_reference(&self, reference: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM ledger_entries WHERE reference = $1)")
                .bind(reference)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }
}
