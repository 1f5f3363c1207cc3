// src/command.rs
//
// Boundary layer: validated command values going in, a caller-facing result
// taxonomy coming out. The processor only re-checks business rules (funds,
// existence), never command shape.
use crate::{Balance, LedgerError, Processor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Credit `amount` to `account`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    pub account: Uuid,
    pub amount: u64,
    pub idempotency_key: Option<String>,
}

impl DepositCommand {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount == 0 || self.amount > i64::MAX as u64 {
            return Err(LedgerError::InvalidAmount);
        }
        Ok(())
    }

    pub async fn handle(&self, processor: &Processor) -> Outcome {
        if self.validate().is_err() {
            return Outcome::BadRequest;
        }

        let result = match &self.idempotency_key {
            Some(key) => {
                processor
                    .deposit_idempotent(self.account, self.amount, key)
                    .await
            }
            None => processor.deposit(self.account, self.amount).await,
        };

        match result {
            Ok(balance) => Outcome::Ok {
                balances: vec![balance],
            },
            Err(e) => Outcome::from_error(e),
        }
    }
}

/// Move `amount` from `from` to `to`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from: Uuid,
    pub to: Uuid,
    pub amount: u64,
}

impl TransferCommand {
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.amount == 0 || self.amount > i64::MAX as u64 {
            return Err(LedgerError::InvalidAmount);
        }
        if self.from == self.to {
            return Err(LedgerError::SameAccount);
        }
        Ok(())
    }

    pub async fn handle(&self, processor: &Processor) -> Outcome {
        if self.validate().is_err() {
            return Outcome::BadRequest;
        }

        match processor.transfer(self.from, self.to, self.amount).await {
            Ok((debit, credit)) => Outcome::Ok {
                balances: vec![debit, credit],
            },
            Err(e) => Outcome::from_error(e),
        }
    }
}

/// Caller-facing result of a command. Every `LedgerError` maps to exactly
/// one category; internal representations stop at `InternalFailure`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Outcome {
    Ok { balances: Vec<Balance> },
    BadRequest,
    NotFound,
    Conflict,
    InternalFailure { message: String },
}

impl Outcome {
    pub fn from_error(error: LedgerError) -> Self {
        match error {
            LedgerError::InvalidAmount | LedgerError::SameAccount => Outcome::BadRequest,
            LedgerError::AccountNotFound(_) | LedgerError::RecordNotFound => Outcome::NotFound,
            // Timeout is retryable, like a tripped optimistic guard
            LedgerError::InsufficientFunds
            | LedgerError::Conflict(_)
            | LedgerError::Timeout
            | LedgerError::DuplicateIdempotencyKey(_) => Outcome::Conflict,
            LedgerError::Storage(_) => Outcome::InternalFailure {
                message: error.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_shape_checks() {
        let mut command = DepositCommand {
            account: Uuid::now_v7(),
            amount: 0,
            idempotency_key: None,
        };
        assert!(command.validate().is_err());

        command.amount = 100_00;
        assert!(command.validate().is_ok());
    }

    #[test]
    fn transfer_rejects_same_account() {
        let account = Uuid::now_v7();
        let command = TransferCommand {
            from: account,
            to: account,
            amount: 10_00,
        };
        assert!(matches!(command.validate(), Err(LedgerError::SameAccount)));
    }

    #[test]
    fn errors_map_to_one_category_each() {
        assert!(matches!(
            Outcome::from_error(LedgerError::InvalidAmount),
            Outcome::BadRequest
        ));
        assert!(matches!(
            Outcome::from_error(LedgerError::AccountNotFound(Uuid::now_v7())),
            Outcome::NotFound
        ));
        assert!(matches!(
            Outcome::from_error(LedgerError::InsufficientFunds),
            Outcome::Conflict
        ));
        assert!(matches!(
            Outcome::from_error(LedgerError::Timeout),
            Outcome::Conflict
        ));
        assert!(matches!(
            Outcome::from_error(LedgerError::Storage("connection reset".to_string())),
            Outcome::InternalFailure { .. }
        ));
    }
}
