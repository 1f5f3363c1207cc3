// src/record.rs
use crate::{Balance, LedgerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single entry in an account's balance chain.
///
/// Immutable once appended. `balance` is fixed at construction as
/// `last_balance + balance_diff`; readers never re-aggregate history.
/// Corrections are new offsetting records, never mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,

    /// Owning account. Must reference an existing account.
    pub account: Uuid,

    /// Predecessor record in this account's chain, `None` at chain start.
    /// No two records may claim the same predecessor.
    pub parent: Option<Uuid>,

    /// Per-account ordering key: parent's sequence + 1, `0` at chain start.
    pub sequence: i64,

    /// Balance immediately prior to this record.
    pub last_balance: i64,

    /// Signed delta: positive for a credit, negative for a debit.
    pub balance_diff: i64,

    /// Resulting balance, `last_balance + balance_diff`.
    pub balance: i64,

    /// Digest of a caller-supplied replay guard, if any.
    pub idempotency_key: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Build a record chained from `prior`, applying the signed `diff`.
    pub fn chained_from(prior: &Balance, diff: i64) -> Result<Self, LedgerError> {
        let balance = prior
            .amount
            .checked_add(diff)
            .ok_or(LedgerError::InvalidAmount)?;

        Ok(Self {
            id: Uuid::now_v7(),
            account: prior.account,
            parent: prior.record,
            sequence: prior.sequence + 1,
            last_balance: prior.amount,
            balance_diff: diff,
            balance,
            idempotency_key: None,
            created_at: Utc::now(),
        })
    }

    pub fn with_idempotency_key(mut self, digest: String) -> Self {
        self.idempotency_key = Some(digest);
        self
    }

    /// True when the stored arithmetic still holds.
    pub fn is_consistent(&self) -> bool {
        self.last_balance.checked_add(self.balance_diff) == Some(self.balance)
    }
}
