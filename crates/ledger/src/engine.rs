//! The ledger engine.
//!
//! [`Ledger`] implements every account operation as a protocol over a
//! [`StorageBackend`]. Balance changes run through the optimistic
//! read-modify-write loop in the `occ` module; the engine supplies the
//! transition that enforces ownership and the amount rules, so those rules are
//! evaluated against exactly the read whose revision guards the write.
//!
//! No in-process lock is taken. Two ledgers in different processes sharing a
//! store are as safe as two tasks sharing one ledger.
//!
//! # Example
//!
//! ```
//! use coffer_ledger::{Ledger, LedgerConfig, OwnerId};
//! use coffer_storage::MemoryBackend;
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let ledger = Ledger::new(MemoryBackend::new(), LedgerConfig::default())?;
//! let owner = OwnerId::generate();
//!
//! let account = ledger.open_account(owner).await?;
//! let receipt = ledger.deposit(account.id, 250, owner).await?;
//! assert_eq!(receipt.balance, 1250);
//!
//! let receipt = ledger.withdraw(account.id, 1000, owner).await?;
//! assert_eq!(receipt.balance, 250);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```

use chrono::Utc;
use coffer_storage::{StorageBackend, StorageError, TimeoutBackend, prefix_range};
use fail::fail_point;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    codec,
    config::LedgerConfig,
    error::{ConfigError, LedgerError, LedgerWarning, Result},
    ids::{AccountId, OwnerId, RecordId},
    keys::{self, HistoryKind},
    metrics::LedgerMetrics,
    model::{Account, AccountHistory, BalanceInquiry, Deposit, Withdrawal},
    occ::{self, Mutation},
};

/// Outcome of a committed deposit or withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub account_id: AccountId,
    /// Balance right after this operation committed.
    pub balance: u64,
    /// Id of the deposit or withdrawal record.
    pub record_id: RecordId,
    /// Read-compute-write cycles it took to commit.
    pub attempts: u32,
    /// Soft failures. The balance change stands regardless.
    pub warnings: Vec<LedgerWarning>,
}

/// Outcome of a balance inquiry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceReport {
    pub account_id: AccountId,
    pub balance: u64,
    /// Id of the audit record.
    pub inquiry_id: RecordId,
    pub warnings: Vec<LedgerWarning>,
}

/// Outcome of closing an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedAccount {
    /// The account as it was when the delete committed.
    pub account: Account,
    pub warnings: Vec<LedgerWarning>,
}

/// Account ledger over a revisioned key-value store.
///
/// Every store call made by the ledger is bounded by
/// [`LedgerConfig::store_timeout`]; a call that overruns it fails the
/// operation with [`LedgerError::StoreUnavailable`].
#[derive(Debug, Clone)]
pub struct Ledger<B> {
    backend: TimeoutBackend<B>,
    config: LedgerConfig,
    metrics: LedgerMetrics,
}

impl<B: StorageBackend> Ledger<B> {
    /// Creates a ledger over `backend`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` fails [`LedgerConfig::validate`].
    pub fn new(backend: B, config: LedgerConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            backend: TimeoutBackend::new(backend, config.store_timeout()),
            config,
            metrics: LedgerMetrics::new(),
        })
    }

    /// Returns the wrapped backend.
    pub fn backend(&self) -> &B {
        self.backend.inner()
    }

    #[must_use]
    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Returns the outcome counters. Clones share the same counters.
    #[must_use]
    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    /// Opens an account for `owner` with the configured starting balance.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::AccountAlreadyExists`] if the owner already has an account.
    /// - [`LedgerError::StoreUnavailable`] if the store fails. A claim on the owner made before
    ///   the failure is released best-effort, unless the account record may have been stored.
    ///   An insert that landed despite a failed reply is reported as a successful open.
    #[tracing::instrument(skip(self), fields(%owner))]
    pub async fn open_account(&self, owner: OwnerId) -> Result<Account> {
        let result = self.open_account_inner(owner).await;
        self.observe(result)
    }

    async fn open_account_inner(&self, owner: OwnerId) -> Result<Account> {
        let account = Account {
            id: AccountId::generate(),
            owner_id: owner,
            balance: self.config.starting_balance(),
            opened_at: Utc::now(),
        };

        let owner_key = keys::owner(owner);
        let claim = codec::encode(&owner_key, &account.id)?;
        match self.backend.compare_and_set(&owner_key, None, claim).await {
            Ok(_) => {},
            Err(StorageError::Conflict) => {
                return Err(LedgerError::AccountAlreadyExists { owner_id: owner });
            },
            Err(e) => return Err(e.into()),
        }

        let account_key = keys::account(account.id);
        let inserted = async {
            let bytes = codec::encode(&account_key, &account)?;
            self.backend.compare_and_set(&account_key, None, bytes).await?;
            Ok::<(), LedgerError>(())
        }
        .await;
        if let Err(err) = inserted {
            return self.settle_aborted_open(account, err).await;
        }

        tracing::info!(account_id = %account.id, balance = account.balance, "account opened");
        Ok(account)
    }

    /// Decides the outcome of an open whose account insert reported `err`.
    ///
    /// The owner claim is released only when the insert is known not to have
    /// landed. A store failure leaves that open, so the account key is read
    /// back first: a stored record means the open succeeded, and an
    /// unanswerable read or a timed-out insert keeps the claim.
    async fn settle_aborted_open(&self, account: Account, err: LedgerError) -> Result<Account> {
        if let LedgerError::StoreUnavailable { source } = &err {
            let key = keys::account(account.id);
            match self.backend.get(&key).await {
                Ok(Some(entry)) => {
                    let stored: Account = codec::decode(&key, &entry.value)?;
                    tracing::info!(
                        account_id = %stored.id,
                        error = %source,
                        "account insert landed despite failed reply",
                    );
                    return Ok(stored);
                },
                // A timed-out insert may still be applied after this read.
                Ok(None) if matches!(source, StorageError::Timeout) => {
                    tracing::warn!(
                        account_id = %account.id,
                        "owner claim kept, insert outcome unknown",
                    );
                    return Err(err);
                },
                Ok(None) => {},
                Err(read) => {
                    tracing::warn!(
                        account_id = %account.id,
                        error = %read,
                        "owner claim kept, account insert could not be confirmed",
                    );
                    return Err(err);
                },
            }
        }

        if let Err(release) = self.release_owner(account.owner_id, account.id).await {
            tracing::warn!(error = %release, "owner claim not released after aborted open");
        }
        Err(err)
    }

    /// Returns the id of the account `owner` holds, if any.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if the store fails.
    #[tracing::instrument(skip(self), fields(%owner))]
    pub async fn account_for_owner(&self, owner: OwnerId) -> Result<Option<AccountId>> {
        let key = keys::owner(owner);
        let result = match self.backend.get(&key).await {
            Ok(Some(entry)) => codec::decode(&key, &entry.value).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(e.into()),
        };
        self.observe(result)
    }

    /// Adds `amount` to the balance of `account_id`.
    ///
    /// On commit a [`Deposit`] record is stored best-effort; if that fails the
    /// receipt carries [`LedgerWarning::HistoryWriteFailed`].
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] if `amount` is zero or the balance would overflow.
    /// - [`LedgerError::AccountNotFound`] / [`LedgerError::AccessDenied`].
    /// - [`LedgerError::ConcurrentUpdateConflict`] if every attempt lost to a concurrent writer.
    /// - [`LedgerError::StoreUnavailable`] if the store fails or times out.
    #[tracing::instrument(skip(self), fields(%account_id, %caller))]
    pub async fn deposit(
        &self,
        account_id: AccountId,
        amount: u64,
        caller: OwnerId,
    ) -> Result<Receipt> {
        let result = self.deposit_inner(account_id, amount, caller).await;
        self.observe(result)
    }

    async fn deposit_inner(
        &self,
        account_id: AccountId,
        amount: u64,
        caller: OwnerId,
    ) -> Result<Receipt> {
        if amount == 0 {
            return Err(LedgerError::invalid_amount("amount must be positive"));
        }

        let committed = self
            .update_account(account_id, |mut account| {
                ensure_owner(&account, caller)?;
                account.balance = account.balance.checked_add(amount).ok_or_else(|| {
                    LedgerError::invalid_amount("deposit would overflow the balance")
                })?;
                let balance = account.balance;
                Ok((Mutation::Replace(account), balance))
            })
            .await?;
        let balance = committed.output;

        let record_id = RecordId::generate();
        let record = Deposit {
            id: record_id,
            account_id,
            amount,
            balance_after: balance,
            timestamp: Utc::now(),
        };
        let warnings =
            self.write_history(HistoryKind::Deposit, account_id, record_id, &record).await;

        tracing::debug!(balance, attempts = committed.attempts, "deposit committed");
        Ok(Receipt { account_id, balance, record_id, attempts: committed.attempts, warnings })
    }

    /// Subtracts `amount` from the balance of `account_id`.
    ///
    /// Sufficiency is evaluated on every attempt against the freshly read
    /// balance, so a withdrawal that raced a competing one and lost is judged
    /// on what the competitor left behind.
    ///
    /// # Errors
    ///
    /// As [`deposit`](Self::deposit), plus [`LedgerError::InsufficientFunds`]
    /// when `amount` exceeds the balance.
    #[tracing::instrument(skip(self), fields(%account_id, %caller))]
    pub async fn withdraw(
        &self,
        account_id: AccountId,
        amount: u64,
        caller: OwnerId,
    ) -> Result<Receipt> {
        let result = self.withdraw_inner(account_id, amount, caller).await;
        self.observe(result)
    }

    async fn withdraw_inner(
        &self,
        account_id: AccountId,
        amount: u64,
        caller: OwnerId,
    ) -> Result<Receipt> {
        if amount == 0 {
            return Err(LedgerError::invalid_amount("amount must be positive"));
        }

        let committed = self
            .update_account(account_id, |mut account| {
                ensure_owner(&account, caller)?;
                let available = account.balance;
                account.balance = available
                    .checked_sub(amount)
                    .ok_or(LedgerError::InsufficientFunds { requested: amount, available })?;
                let balance = account.balance;
                Ok((Mutation::Replace(account), balance))
            })
            .await?;
        let balance = committed.output;

        let record_id = RecordId::generate();
        let record = Withdrawal {
            id: record_id,
            account_id,
            amount,
            balance_after: balance,
            timestamp: Utc::now(),
        };
        let warnings =
            self.write_history(HistoryKind::Withdrawal, account_id, record_id, &record).await;

        tracing::debug!(balance, attempts = committed.attempts, "withdrawal committed");
        Ok(Receipt { account_id, balance, record_id, attempts: committed.attempts, warnings })
    }

    /// Reads the balance of `account_id` and stores an audit record of the
    /// read, best-effort.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`], [`LedgerError::AccessDenied`], or
    /// [`LedgerError::StoreUnavailable`]. Failing to store the audit record is
    /// never an error.
    #[tracing::instrument(skip(self), fields(%account_id, %caller))]
    pub async fn inquire(&self, account_id: AccountId, caller: OwnerId) -> Result<BalanceReport> {
        let result = self.inquire_inner(account_id, caller).await;
        self.observe(result)
    }

    async fn inquire_inner(&self, account_id: AccountId, caller: OwnerId) -> Result<BalanceReport> {
        let account = self.load_owned(account_id, caller).await?;

        let inquiry_id = RecordId::generate();
        let record = BalanceInquiry {
            id: inquiry_id,
            account_id,
            balance_at_time: account.balance,
            timestamp: Utc::now(),
        };
        let warnings =
            self.write_history(HistoryKind::BalanceInquiry, account_id, inquiry_id, &record).await;

        Ok(BalanceReport { account_id, balance: account.balance, inquiry_id, warnings })
    }

    /// Deletes `account_id` and frees its owner to open a new account.
    ///
    /// The delete is conditioned on the revision the ownership check read, so
    /// a deposit that lands in between is never silently discarded: the close
    /// re-reads and retries. History records are kept.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`], [`LedgerError::AccessDenied`],
    /// [`LedgerError::ConcurrentUpdateConflict`], or
    /// [`LedgerError::StoreUnavailable`].
    #[tracing::instrument(skip(self), fields(%account_id, %caller))]
    pub async fn close_account(
        &self,
        account_id: AccountId,
        caller: OwnerId,
    ) -> Result<ClosedAccount> {
        let result = self.close_account_inner(account_id, caller).await;
        self.observe(result)
    }

    async fn close_account_inner(
        &self,
        account_id: AccountId,
        caller: OwnerId,
    ) -> Result<ClosedAccount> {
        let committed = self
            .update_account(account_id, |account| {
                ensure_owner(&account, caller)?;
                Ok((Mutation::Remove, account))
            })
            .await?;
        let account = committed.output;

        let mut warnings = Vec::new();
        if let Err(err) = self.release_owner(account.owner_id, account.id).await {
            tracing::warn!(error = %err, "account closed but owner index entry remains");
            warnings.push(LedgerWarning::OwnerIndexNotReleased {
                owner_id: account.owner_id,
                message: err.to_string(),
            });
        }

        tracing::info!(final_balance = account.balance, "account closed");
        Ok(ClosedAccount { account, warnings })
    }

    /// Returns every history record of `account_id`, oldest first per kind.
    ///
    /// # Errors
    ///
    /// [`LedgerError::AccountNotFound`], [`LedgerError::AccessDenied`],
    /// [`LedgerError::CorruptRecord`], or [`LedgerError::StoreUnavailable`].
    #[tracing::instrument(skip(self), fields(%account_id, %caller))]
    pub async fn history(&self, account_id: AccountId, caller: OwnerId) -> Result<AccountHistory> {
        let result = self.history_inner(account_id, caller).await;
        self.observe(result)
    }

    async fn history_inner(
        &self,
        account_id: AccountId,
        caller: OwnerId,
    ) -> Result<AccountHistory> {
        self.load_owned(account_id, caller).await?;

        Ok(AccountHistory {
            deposits: self.scan(HistoryKind::Deposit, account_id).await?,
            withdrawals: self.scan(HistoryKind::Withdrawal, account_id).await?,
            inquiries: self.scan(HistoryKind::BalanceInquiry, account_id).await?,
        })
    }

    /// Checks that the store answers within the deadline.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::StoreUnavailable`] if it does not.
    pub async fn health_check(&self) -> Result<()> {
        self.backend.health_check().await.map_err(Into::into)
    }

    async fn update_account<O, F>(
        &self,
        account_id: AccountId,
        transition: F,
    ) -> Result<occ::Committed<O>>
    where
        F: FnMut(Account) -> Result<(Mutation<Account>, O)>,
    {
        occ::update(
            &self.backend,
            &keys::account(account_id),
            self.config.max_attempts(),
            &self.metrics,
            || LedgerError::AccountNotFound { account_id },
            transition,
        )
        .await
    }

    async fn load_owned(&self, account_id: AccountId, caller: OwnerId) -> Result<Account> {
        let key = keys::account(account_id);
        let entry =
            self.backend.get(&key).await?.ok_or(LedgerError::AccountNotFound { account_id })?;
        let account: Account = codec::decode(&key, &entry.value)?;
        ensure_owner(&account, caller)?;
        Ok(account)
    }

    /// Stores a history record; failures become warnings.
    async fn write_history<R: Serialize>(
        &self,
        kind: HistoryKind,
        account_id: AccountId,
        record_id: RecordId,
        record: &R,
    ) -> Vec<LedgerWarning> {
        let written = async {
            fail_point!("ledger-history-write", |_| {
                Err(LedgerError::from(StorageError::connection("injected history write failure")))
            });
            let key = keys::history(kind, account_id, record_id);
            let bytes = codec::encode(&key, record)?;
            self.backend.set(key, bytes).await?;
            Ok::<(), LedgerError>(())
        }
        .await;

        match written {
            Ok(()) => Vec::new(),
            Err(err) => {
                self.metrics.record_history_write_failure();
                tracing::warn!(
                    kind = kind.as_str(),
                    %record_id,
                    error = %err,
                    "history record not stored",
                );
                vec![LedgerWarning::HistoryWriteFailed {
                    kind: kind.as_str(),
                    record_id,
                    message: err.to_string(),
                }]
            },
        }
    }

    async fn scan<R: DeserializeOwned>(
        &self,
        kind: HistoryKind,
        account_id: AccountId,
    ) -> Result<Vec<R>> {
        let prefix = keys::history_prefix(kind, account_id);
        self.backend
            .get_range(prefix_range(&prefix))
            .await?
            .iter()
            .map(|kv| codec::decode(&kv.key, &kv.value))
            .collect()
    }

    /// Removes the owner index entry if it still points at `account_id`.
    async fn release_owner(&self, owner: OwnerId, account_id: AccountId) -> Result<()> {
        let key = keys::owner(owner);
        let Some(entry) = self.backend.get(&key).await? else {
            return Ok(());
        };
        let claimed: AccountId = codec::decode(&key, &entry.value)?;
        if claimed != account_id {
            return Ok(());
        }
        match self.backend.compare_and_delete(&key, entry.revision).await {
            // Someone else already moved the entry on.
            Ok(()) | Err(StorageError::Conflict) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Err(LedgerError::StoreUnavailable { source }) => {
                self.metrics.record_store_failure();
                tracing::warn!(error = %source, "store unavailable");
            },
            Err(
                LedgerError::InvalidAmount { .. }
                | LedgerError::AccountNotFound { .. }
                | LedgerError::AccessDenied { .. }
                | LedgerError::InsufficientFunds { .. }
                | LedgerError::AccountAlreadyExists { .. },
            ) => self.metrics.record_rejection(),
            _ => {},
        }
        result
    }
}

fn ensure_owner(account: &Account, caller: OwnerId) -> Result<()> {
    if account.is_owned_by(caller) {
        Ok(())
    } else {
        Err(LedgerError::AccessDenied { account_id: account.id })
    }
}
