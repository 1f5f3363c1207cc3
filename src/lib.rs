// src/lib.rs
pub mod account;
pub mod adapters;
pub mod balance;
pub mod command;
pub mod error;
pub mod processor;
pub mod record;

pub use account::Account;
pub use balance::Balance;
pub use command::{DepositCommand, Outcome, TransferCommand};
pub use error::LedgerError;
pub use processor::{LedgerContext, Processor};
pub use record::TransactionRecord;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub(crate) fn hash_idempotency_key(key: &str) -> String {
    blake3::hash(key.as_bytes()).to_hex().to_string()
}

/// Storage seam the processor and resolver work through.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    /// Append all records as one atomic unit.
    /// Implementors MUST:
    /// 1. BEGIN a storage transaction
    /// 2. Lock the chain head of every touched account
    /// 3. Verify each record's `parent` and `last_balance` still match the
    ///    true head — return Conflict if any head moved
    /// 4. Verify idempotency keys are unused
    /// 5. Insert all records, COMMIT on success, ROLLBACK on any error
    async fn append_records(&self, records: &[TransactionRecord]) -> Result<(), LedgerError>;

    // READ OPERATIONS
    async fn get_account(&self, id: Uuid) -> Result<Account, LedgerError>;
    async fn create_account(&self, account: Account) -> Result<(), LedgerError>;
    async fn latest_record(&self, account: Uuid)
    -> Result<Option<TransactionRecord>, LedgerError>;
    async fn records_for_account(
        &self,
        account: Uuid,
    ) -> Result<Vec<TransactionRecord>, LedgerError>;
    async fn get_record(&self, id: Uuid) -> Result<TransactionRecord, LedgerError>;
    async fn check_idempotency_key(&self, key: &str) -> Result<(), LedgerError>;
    async fn record_by_idempotency_key(&self, key: &str)
    -> Result<TransactionRecord, LedgerError>;
}

/// Owns the configured store adapter for the lifetime of the ledger.
pub struct LedgerSystem {
    adapter: Arc<dyn LedgerAdapter>,
}

impl LedgerSystem {
    pub fn new(adapter: Box<dyn LedgerAdapter>) -> Self {
        Self {
            adapter: adapter.into(),
        }
    }

    /// Borrow the adapter for direct store reads.
    pub fn adapter(&self) -> &dyn LedgerAdapter {
        self.adapter.as_ref()
    }

    /// Shared handle, the input for building a `LedgerContext`.
    pub fn adapter_arc(&self) -> Arc<dyn LedgerAdapter> {
        Arc::clone(&self.adapter)
    }
}
