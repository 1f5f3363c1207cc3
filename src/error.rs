// src/error.rs
use std::fmt;
use uuid::Uuid;

#[derive(Debug)]
pub enum LedgerError {
    InvalidAmount,
    SameAccount,
    AccountNotFound(Uuid),
    InsufficientFunds,
    Conflict(String),
    RecordNotFound,
    DuplicateIdempotencyKey(Uuid),
    Timeout,
    Storage(String),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidAmount => write!(f, "Invalid amount"),
            Self::SameAccount => write!(f, "Source and destination are the same account"),
            Self::AccountNotFound(id) => write!(f, "Account not found: {}", id),
            Self::InsufficientFunds => write!(f, "Insufficient funds"),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::RecordNotFound => write!(f, "Record not found"),
            Self::DuplicateIdempotencyKey(id) => {
                write!(f, "Duplicate idempotency key: {}", id)
            }
            Self::Timeout => write!(f, "Timed out waiting on the ledger store"),
            Self::Storage(msg) => write!(f, "Storage error: {}", msg),
        }
    }
}

impl std::error::Error for LedgerError {}
