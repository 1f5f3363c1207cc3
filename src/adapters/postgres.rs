use std::collections::HashMap;

use crate::{Account, LedgerAdapter, LedgerError, TransactionRecord};
use sqlx::Row;
use uuid::Uuid;

pub trait PostgresLedgerAdapter {
    fn get_pool(&self) -> sqlx::PgPool;
}

#[async_trait::async_trait]
pub trait PostgresSchemaLedgerAdapter {
    /// Initialize the schema for the ledger.
    /// Call once before the first append against a fresh database.
    async fn init_ledger_schema(&self) -> Result<(), LedgerError>;
}

#[async_trait::async_trait]
impl<T> PostgresSchemaLedgerAdapter for T
where
    T: PostgresLedgerAdapter + Send + Sync,
{
    async fn init_ledger_schema(&self) -> Result<(), LedgerError> {
        let mut tx = self
            .get_pool()
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        // Accounts table
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_accounts (
                id UUID PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        // Records table. UNIQUE (account, sequence) is the relational
        // statement of "no gaps, no reordering" per chain.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ledger_records (
                id UUID PRIMARY KEY,
                account UUID NOT NULL REFERENCES ledger_accounts(id),
                parent UUID REFERENCES ledger_records(id),
                sequence BIGINT NOT NULL,
                last_balance BIGINT NOT NULL,
                balance_diff BIGINT NOT NULL,
                balance BIGINT NOT NULL CHECK (balance = last_balance + balance_diff),
                idempotency_key TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE (account, sequence)
            )
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        // No two records may claim the same predecessor
        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_records_parent
            ON ledger_records(parent) WHERE parent IS NOT NULL
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_records_idempotency
            ON ledger_records(idempotency_key) WHERE idempotency_key IS NOT NULL
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_records_account_sequence
            ON ledger_records(account, sequence DESC)
            "#,
        )
        .execute(&mut *tx)
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(())
    }
}

fn record_from_row(row: &sqlx::postgres::PgRow) -> Result<TransactionRecord, LedgerError> {
    Ok(TransactionRecord {
        id: row
            .try_get("id")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        account: row
            .try_get("account")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        parent: row
            .try_get("parent")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        sequence: row
            .try_get("sequence")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        last_balance: row
            .try_get("last_balance")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        balance_diff: row
            .try_get("balance_diff")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        balance: row
            .try_get("balance")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        idempotency_key: row
            .try_get("idempotency_key")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| LedgerError::Storage(e.to_string()))?,
    })
}

fn insert_error(e: sqlx::Error) -> LedgerError {
    match e.as_database_error().and_then(|db| db.code()) {
        // Unique violation: another writer claimed this head first
        Some(code) if code == "23505" => {
            LedgerError::Conflict("concurrent append on the same chain".to_string())
        }
        _ => LedgerError::Storage(e.to_string()),
    }
}

#[async_trait::async_trait]
impl<T> LedgerAdapter for T
where
    T: PostgresLedgerAdapter + Send + Sync,
{
    async fn append_records(&self, records: &[TransactionRecord]) -> Result<(), LedgerError> {
        let mut tx = self
            .get_pool()
            .begin()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        // ── Phase 1: lock account rows and read live heads ────────────────
        // Ascending id order keeps opposing transfers from deadlocking.
        let mut accounts: Vec<Uuid> = records.iter().map(|r| r.account).collect();
        accounts.sort();
        accounts.dedup();

        let mut heads: HashMap<Uuid, (Option<Uuid>, i64)> = HashMap::new();

        for account in &accounts {
            let exists = sqlx::query("SELECT id FROM ledger_accounts WHERE id = $1 FOR UPDATE")
                .bind(account)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| LedgerError::Storage(e.to_string()))?;

            if exists.is_none() {
                tx.rollback().await.ok();
                return Err(LedgerError::AccountNotFound(*account));
            }

            let head = sqlx::query(
                r#"
                SELECT id, balance
                FROM ledger_records
                WHERE account = $1
                ORDER BY sequence DESC
                LIMIT 1
                "#,
            )
            .bind(account)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

            let head = match head {
                Some(row) => (
                    Some(
                        row.try_get("id")
                            .map_err(|e| LedgerError::Storage(e.to_string()))?,
                    ),
                    row.try_get("balance")
                        .map_err(|e| LedgerError::Storage(e.to_string()))?,
                ),
                None => (None, 0),
            };

            heads.insert(*account, head);
        }

        // ── Phase 2: verify each record against its head, then insert ────
        for record in records {
            if !record.is_consistent() {
                tx.rollback().await.ok();
                return Err(LedgerError::Storage(
                    "record arithmetic does not hold".to_string(),
                ));
            }

            // Checked INSIDE the lock — this is the real lost-update guard
            let (head_id, head_balance) = heads
                .get(&record.account)
                .copied()
                .unwrap_or((None, 0));

            if record.parent != head_id || record.last_balance != head_balance {
                tx.rollback().await.ok();
                return Err(LedgerError::Conflict(format!(
                    "chain head moved for account {}",
                    record.account
                )));
            }

            if let Some(key) = &record.idempotency_key {
                let existing =
                    sqlx::query("SELECT id FROM ledger_records WHERE idempotency_key = $1")
                        .bind(key)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(|e| LedgerError::Storage(e.to_string()))?;

                if let Some(row) = existing {
                    let id = row
                        .try_get("id")
                        .map_err(|e| LedgerError::Storage(e.to_string()))?;
                    tx.rollback().await.ok();
                    return Err(LedgerError::DuplicateIdempotencyKey(id));
                }
            }

            let inserted = sqlx::query(
                r#"
                INSERT INTO ledger_records
                    (id, account, parent, sequence, last_balance, balance_diff, balance, idempotency_key, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(record.id)
            .bind(record.account)
            .bind(record.parent)
            .bind(record.sequence)
            .bind(record.last_balance)
            .bind(record.balance_diff)
            .bind(record.balance)
            .bind(&record.idempotency_key)
            .bind(record.created_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = inserted {
                tx.rollback().await.ok();
                return Err(insert_error(e));
            }

            heads.insert(record.account, (Some(record.id), record.balance));
        }

        tx.commit()
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Account, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, created_at
            FROM ledger_accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?
        .ok_or(LedgerError::AccountNotFound(id))?;

        Ok(Account {
            id: row
                .try_get("id")
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
            created_at: row
                .try_get("created_at")
                .map_err(|e| LedgerError::Storage(e.to_string()))?,
        })
    }

    async fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_accounts (id, created_at)
            VALUES ($1, $2) ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(account.id)
        .bind(account.created_at)
        .execute(&self.get_pool())
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn latest_record(
        &self,
        account: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, account, parent, sequence, last_balance, balance_diff, balance, idempotency_key, created_at
            FROM ledger_records
            WHERE account = $1
            ORDER BY sequence DESC
            LIMIT 1
            "#,
        )
        .bind(account)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        row.as_ref().map(record_from_row).transpose()
    }

    async fn records_for_account(
        &self,
        account: Uuid,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT id, account, parent, sequence, last_balance, balance_diff, balance, idempotency_key, created_at
            FROM ledger_records
            WHERE account = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(account)
        .fetch_all(&self.get_pool())
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?;

        rows.iter().map(record_from_row).collect()
    }

    async fn get_record(&self, id: Uuid) -> Result<TransactionRecord, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, account, parent, sequence, last_balance, balance_diff, balance, idempotency_key, created_at
            FROM ledger_records
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?
        .ok_or(LedgerError::RecordNotFound)?;

        record_from_row(&row)
    }

    async fn check_idempotency_key(&self, key: &str) -> Result<(), LedgerError> {
        let existing = sqlx::query("SELECT id FROM ledger_records WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.get_pool())
            .await
            .map_err(|e| LedgerError::Storage(e.to_string()))?;

        match existing {
            Some(row) => {
                let id = row
                    .try_get("id")
                    .map_err(|e| LedgerError::Storage(e.to_string()))?;
                Err(LedgerError::DuplicateIdempotencyKey(id))
            }
            None => Ok(()),
        }
    }

    async fn record_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<TransactionRecord, LedgerError> {
        let row = sqlx::query(
            r#"
            SELECT id, account, parent, sequence, last_balance, balance_diff, balance, idempotency_key, created_at
            FROM ledger_records
            WHERE idempotency_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.get_pool())
        .await
        .map_err(|e| LedgerError::Storage(e.to_string()))?
        .ok_or(LedgerError::RecordNotFound)?;

        record_from_row(&row)
    }
}
