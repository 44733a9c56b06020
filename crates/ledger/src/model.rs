//! Ledger records as they are stored.
//!
//! [`Account`] is the only mutable record. Deposits, withdrawals, and balance
//! inquiries are written once under a fresh [`RecordId`] and never touched
//! again by ledger operations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, OwnerId, RecordId};

/// A customer account.
///
/// `balance` is held in minor currency units. Being unsigned, it cannot go
/// negative; withdrawals that would underflow are rejected before any write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier.
    pub id: AccountId,

    /// Owner of the account, fixed at creation.
    pub owner_id: OwnerId,

    /// Current balance in minor units.
    pub balance: u64,

    /// When the account was opened.
    pub opened_at: DateTime<Utc>,
}

impl Account {
    /// Returns `true` if `caller` owns this account.
    #[must_use]
    pub fn is_owned_by(&self, caller: OwnerId) -> bool {
        self.owner_id == caller
    }
}

/// A committed deposit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: RecordId,
    pub account_id: AccountId,
    pub amount: u64,
    /// Balance immediately after this deposit was applied.
    pub balance_after: u64,
    pub timestamp: DateTime<Utc>,
}

/// A committed withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: RecordId,
    pub account_id: AccountId,
    pub amount: u64,
    /// Balance immediately after this withdrawal was applied.
    pub balance_after: u64,
    pub timestamp: DateTime<Utc>,
}

/// Audit record of a balance read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceInquiry {
    pub id: RecordId,
    pub account_id: AccountId,
    pub balance_at_time: u64,
    pub timestamp: DateTime<Utc>,
}

/// Every history record of one account, each list oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountHistory {
    pub deposits: Vec<Deposit>,
    pub withdrawals: Vec<Withdrawal>,
    pub inquiries: Vec<BalanceInquiry>,
}

impl AccountHistory {
    /// Total number of records across all kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.deposits.len() + self.withdrawals.len() + self.inquiries.len()
    }

    /// Returns `true` if the account has no history.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
