// src/adapters/memory.rs
use crate::{Account, LedgerAdapter, LedgerError, TransactionRecord};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct MemoryStore {
    accounts: HashMap<Uuid, Account>,
    // Per-account chains, kept in sequence order
    chains: HashMap<Uuid, Vec<TransactionRecord>>,
    idempotency: HashMap<String, Uuid>,
}

/// In-memory adapter for tests and embedded use.
///
/// One mutex guards the whole store so the head check and the insert in
/// `append_records` form a single critical section.
pub struct MemoryAdapter {
    store: Mutex<MemoryStore>,
}

impl MemoryAdapter {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(MemoryStore::default()),
        }
    }
}

impl Default for MemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerAdapter for MemoryAdapter {
    async fn append_records(&self, records: &[TransactionRecord]) -> Result<(), LedgerError> {
        let mut store = self.store.lock().unwrap();

        // Phase 1: verify every record against the live chain head,
        // advancing a local head per account so later records in the same
        // batch must chain onto earlier ones, never onto the same head twice
        let mut heads: HashMap<Uuid, (Option<Uuid>, i64)> = HashMap::new();
        let mut batch_keys: HashSet<&str> = HashSet::new();

        for record in records {
            if !store.accounts.contains_key(&record.account) {
                return Err(LedgerError::AccountNotFound(record.account));
            }

            let (head_id, head_balance) = match heads.get(&record.account) {
                Some(head) => *head,
                None => {
                    let head = store.chains.get(&record.account).and_then(|c| c.last());
                    (head.map(|r| r.id), head.map(|r| r.balance).unwrap_or(0))
                }
            };

            if record.parent != head_id || record.last_balance != head_balance {
                return Err(LedgerError::Conflict(format!(
                    "chain head moved for account {}",
                    record.account
                )));
            }

            if let Some(key) = &record.idempotency_key {
                if let Some(existing) = store.idempotency.get(key) {
                    return Err(LedgerError::DuplicateIdempotencyKey(*existing));
                }
                if !batch_keys.insert(key.as_str()) {
                    return Err(LedgerError::DuplicateIdempotencyKey(record.id));
                }
            }

            if !record.is_consistent() {
                return Err(LedgerError::Storage(
                    "record arithmetic does not hold".to_string(),
                ));
            }

            heads.insert(record.account, (Some(record.id), record.balance));
        }

        // Phase 2: insert — nothing can fail past this point
        for record in records {
            if let Some(key) = &record.idempotency_key {
                store.idempotency.insert(key.clone(), record.id);
            }
            store
                .chains
                .entry(record.account)
                .or_default()
                .push(record.clone());
        }

        Ok(())
    }

    async fn get_account(&self, id: Uuid) -> Result<Account, LedgerError> {
        let store = self.store.lock().unwrap();
        store
            .accounts
            .get(&id)
            .cloned()
            .ok_or(LedgerError::AccountNotFound(id))
    }

    async fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        let mut store = self.store.lock().unwrap();
        store.accounts.insert(account.id, account);
        Ok(())
    }

    async fn latest_record(
        &self,
        account: Uuid,
    ) -> Result<Option<TransactionRecord>, LedgerError> {
        let store = self.store.lock().unwrap();
        Ok(store.chains.get(&account).and_then(|c| c.last()).cloned())
    }

    async fn records_for_account(
        &self,
        account: Uuid,
    ) -> Result<Vec<TransactionRecord>, LedgerError> {
        let store = self.store.lock().unwrap();
        Ok(store.chains.get(&account).cloned().unwrap_or_default())
    }

    async fn get_record(&self, id: Uuid) -> Result<TransactionRecord, LedgerError> {
        let store = self.store.lock().unwrap();
        store
            .chains
            .values()
            .flatten()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(LedgerError::RecordNotFound)
    }

    async fn check_idempotency_key(&self, key: &str) -> Result<(), LedgerError> {
        let store = self.store.lock().unwrap();
        match store.idempotency.get(key) {
            Some(existing) => Err(LedgerError::DuplicateIdempotencyKey(*existing)),
            None => Ok(()),
        }
    }

    async fn record_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<TransactionRecord, LedgerError> {
        let store = self.store.lock().unwrap();
        let record_id = store
            .idempotency
            .get(key)
            .copied()
            .ok_or(LedgerError::RecordNotFound)?;

        store
            .chains
            .values()
            .flatten()
            .find(|r| r.id == record_id)
            .cloned()
            .ok_or(LedgerError::RecordNotFound)
    }
}
