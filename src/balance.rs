// src/balance.rs
use crate::TransactionRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Derived view of an account's current balance.
///
/// Never stored: always read off the most recent chain record, or the zero
/// opening baseline when the account has no history yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub account: Uuid,
    pub amount: i64,
    /// Record this balance was read from; `None` means no history.
    pub record: Option<Uuid>,
    /// Sequence of that record; `-1` when there is no history.
    pub sequence: i64,
    pub timestamp: DateTime<Utc>,
}

impl Balance {
    /// Zero baseline for an account that has never moved money.
    /// A valid resting state, not a fault.
    pub fn opening(account: Uuid) -> Self {
        Self {
            account,
            amount: 0,
            record: None,
            sequence: -1,
            timestamp: Utc::now(),
        }
    }

    pub fn of_record(record: &TransactionRecord) -> Self {
        Self {
            account: record.account,
            amount: record.balance,
            record: Some(record.id),
            sequence: record.sequence,
            timestamp: Utc::now(),
        }
    }

    pub fn has_history(&self) -> bool {
        self.record.is_some()
    }
}
