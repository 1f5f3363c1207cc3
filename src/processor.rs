// src/processor.rs
use crate::{Balance, LedgerAdapter, LedgerError, TransactionRecord, hash_idempotency_key};
use metrics::{counter, histogram};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Attempts before a stale-head conflict is surfaced to the caller.
const MAX_CONFLICT_RETRIES: u32 = 5;

/// Bound on any single store round-trip.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct LedgerContext {
    adapter: Arc<dyn LedgerAdapter>,
}

impl LedgerContext {
    pub fn new(adapter: Arc<dyn LedgerAdapter>) -> Self {
        Self { adapter }
    }

    pub fn adapter(&self) -> &dyn LedgerAdapter {
        self.adapter.as_ref()
    }
}

async fn bounded<T, F>(fut: F) -> Result<T, LedgerError>
where
    F: Future<Output = Result<T, LedgerError>>,
{
    tokio::time::timeout(STORE_TIMEOUT, fut)
        .await
        .map_err(|_| LedgerError::Timeout)?
}

/// Executes deposits and transfers as atomic read-compute-append units.
///
/// Records carry the exact chain head they were computed from; the adapter
/// re-verifies that head inside its commit transaction. A head that moved in
/// between surfaces as `Conflict` and the whole operation is retried from
/// the resolve step, up to `MAX_CONFLICT_RETRIES`.
#[derive(Clone)]
pub struct Processor {
    ctx: LedgerContext,
}

impl Processor {
    pub fn new(ctx: LedgerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &LedgerContext {
        &self.ctx
    }

    /// Credit `amount` to `account`, returning the committed balance.
    pub async fn deposit(&self, account: Uuid, amount: u64) -> Result<Balance, LedgerError> {
        let diff = validate_amount(amount)?;
        bounded(self.ctx.adapter().get_account(account)).await?;

        let mut committed = self
            .commit_with_retry("deposit", &[account], |balances: &[Balance]| {
                Ok(vec![TransactionRecord::chained_from(&balances[0], diff)?])
            })
            .await?;

        committed
            .pop()
            .ok_or_else(|| LedgerError::Storage("empty commit".to_string()))
    }

    /// Deposit guarded by a caller-supplied replay key. A second call with
    /// the same key fails with `DuplicateIdempotencyKey` naming the record
    /// the first call committed.
    pub async fn deposit_idempotent(
        &self,
        account: Uuid,
        amount: u64,
        idempotency_key: &str,
    ) -> Result<Balance, LedgerError> {
        let diff = validate_amount(amount)?;
        let digest = hash_idempotency_key(idempotency_key);

        bounded(self.ctx.adapter().get_account(account)).await?;
        // Advisory pre-flight; the real guard runs inside the adapter's append
        bounded(self.ctx.adapter().check_idempotency_key(&digest)).await?;

        let mut committed = self
            .commit_with_retry("deposit", &[account], |balances: &[Balance]| {
                Ok(vec![
                    TransactionRecord::chained_from(&balances[0], diff)?
                        .with_idempotency_key(digest.clone()),
                ])
            })
            .await?;

        committed
            .pop()
            .ok_or_else(|| LedgerError::Storage("empty commit".to_string()))
    }

    /// Look up the record a previous idempotent deposit committed under
    /// `idempotency_key`.
    pub async fn record_for_key(
        &self,
        idempotency_key: &str,
    ) -> Result<TransactionRecord, LedgerError> {
        let digest = hash_idempotency_key(idempotency_key);
        bounded(self.ctx.adapter().record_by_idempotency_key(&digest)).await
    }

    /// Move `amount` from `from` to `to`. Debit and credit commit together
    /// or not at all; returns both resulting balances.
    pub async fn transfer(
        &self,
        from: Uuid,
        to: Uuid,
        amount: u64,
    ) -> Result<(Balance, Balance), LedgerError> {
        let diff = validate_amount(amount)?;
        if from == to {
            return Err(LedgerError::SameAccount);
        }

        bounded(self.ctx.adapter().get_account(from)).await?;
        bounded(self.ctx.adapter().get_account(to)).await?;

        let mut committed = self
            .commit_with_retry("transfer", &[from, to], |balances: &[Balance]| {
                let (source, dest) = (&balances[0], &balances[1]);
                // Draining the balance to exactly zero is allowed
                if source.amount < diff {
                    return Err(LedgerError::InsufficientFunds);
                }
                Ok(vec![
                    TransactionRecord::chained_from(source, -diff)?,
                    TransactionRecord::chained_from(dest, diff)?,
                ])
            })
            .await?;

        let credit = committed
            .pop()
            .ok_or_else(|| LedgerError::Storage("empty commit".to_string()))?;
        let debit = committed
            .pop()
            .ok_or_else(|| LedgerError::Storage("empty commit".to_string()))?;

        Ok((debit, credit))
    }

    /// Resolve → build → append, retrying from resolve when the optimistic
    /// head check trips. `build` is pure: no store writes happen until the
    /// adapter's single atomic append.
    async fn commit_with_retry<F>(
        &self,
        op: &'static str,
        accounts: &[Uuid],
        build: F,
    ) -> Result<Vec<Balance>, LedgerError>
    where
        F: Fn(&[Balance]) -> Result<Vec<TransactionRecord>, LedgerError>,
    {
        let mut attempt = 0u32;

        loop {
            let mut balances = Vec::with_capacity(accounts.len());
            for account in accounts {
                balances.push(bounded(Balance::get(*account, &self.ctx)).await?);
            }

            // Business-rule rejections here count as failed commits too
            let records = match build(&balances) {
                Ok(records) => records,
                Err(e) => {
                    counter!("ledger.commits.total", "operation" => op, "status" => "failed")
                        .increment(1);
                    return Err(e);
                }
            };

            match bounded(self.ctx.adapter().append_records(&records)).await {
                Ok(()) => {
                    for record in &records {
                        histogram!("ledger.record.diff", "operation" => op)
                            .record(record.balance_diff.unsigned_abs() as f64);
                    }
                    counter!("ledger.commits.total", "operation" => op, "status" => "success")
                        .increment(1);

                    return Ok(records.iter().map(Balance::of_record).collect());
                }
                Err(LedgerError::Conflict(_)) if attempt < MAX_CONFLICT_RETRIES => {
                    attempt += 1;
                    counter!("ledger.conflicts.retried", "operation" => op).increment(1);
                }
                Err(e) => {
                    counter!("ledger.commits.total", "operation" => op, "status" => "failed")
                        .increment(1);
                    return Err(e);
                }
            }
        }
    }
}

fn validate_amount(amount: u64) -> Result<i64, LedgerError> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount);
    }
    i64::try_from(amount).map_err(|_| LedgerError::InvalidAmount)
}

impl Balance {
    /// Resolve the current balance of `account`: the most recent chain
    /// record, or the zero opening baseline when there is no history.
    pub async fn get(account: Uuid, ctx: &LedgerContext) -> Result<Balance, LedgerError> {
        match ctx.adapter().latest_record(account).await? {
            Some(record) => Ok(Balance::of_record(&record)),
            None => Ok(Balance::opening(account)),
        }
    }
}
