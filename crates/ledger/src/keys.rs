//! Key layout of ledger records in the store.
//!
//! ```text
//! accounts/{account_id}                        account record
//! owners/{owner_id}                            owner -> account id index
//! deposits/{account_id}/{record_id}            deposit history
//! withdrawals/{account_id}/{record_id}         withdrawal history
//! balance_inquiries/{account_id}/{record_id}   inquiry audit trail
//! ```
//!
//! History keys end in a time-ordered record id, so a prefix scan over one
//! account's history returns records in creation order.

use crate::ids::{AccountId, OwnerId, RecordId};

const ACCOUNTS: &str = "accounts";
const OWNERS: &str = "owners";
const DEPOSITS: &str = "deposits";
const WITHDRAWALS: &str = "withdrawals";
const BALANCE_INQUIRIES: &str = "balance_inquiries";

/// Kinds of history record, each under its own key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum HistoryKind {
    Deposit,
    Withdrawal,
    BalanceInquiry,
}

impl HistoryKind {
    fn root(self) -> &'static str {
        match self {
            Self::Deposit => DEPOSITS,
            Self::Withdrawal => WITHDRAWALS,
            Self::BalanceInquiry => BALANCE_INQUIRIES,
        }
    }

    /// Short name used in log fields and warnings.
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Withdrawal => "withdrawal",
            Self::BalanceInquiry => "balance_inquiry",
        }
    }
}

pub(crate) fn account(id: AccountId) -> Vec<u8> {
    format!("{ACCOUNTS}/{id}").into_bytes()
}

pub(crate) fn owner(id: OwnerId) -> Vec<u8> {
    format!("{OWNERS}/{id}").into_bytes()
}

pub(crate) fn history(kind: HistoryKind, account: AccountId, record: RecordId) -> Vec<u8> {
    format!("{}/{account}/{record}", kind.root()).into_bytes()
}

/// Prefix shared by every `kind` record of `account`, trailing slash included.
pub(crate) fn history_prefix(kind: HistoryKind, account: AccountId) -> Vec<u8> {
    format!("{}/{account}/", kind.root()).into_bytes()
}
