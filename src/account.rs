// src/account.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An account money can move against.
///
/// Deliberately carries no balance field: the balance is always derived from
/// the most recent chain record, never stored alongside the account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            created_at: Utc::now(),
        }
    }

    pub fn with_id(id: Uuid) -> Self {
        Self {
            id,
            created_at: Utc::now(),
        }
    }
}

impl Default for Account {
    fn default() -> Self {
        Self::new()
    }
}
