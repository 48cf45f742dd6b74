//! In-memory ledger collaborators
//!
//! Transaction ledger, wallet and reward ledger backed by mutexed
//! vectors, plus a settable clock. All interior-mutable so tests can keep
//! posting activity while an engine holds shared references.

use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    campaigns::rewards::RewardKind,
    clock::Clock,
    directory::UserId,
    ledger::{
        CollaboratorError, Notification, Notifier, RewardEntryId, RewardLedger, TransactionLedger,
        Wallet,
    },
    window::QualificationWindow,
};

/// Lifecycle status of a recorded transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Counts towards qualification.
    Active,
    /// Counts towards qualification.
    Completed,
    /// Counts towards qualification.
    Approved,
    /// Does not count yet.
    Pending,
    /// Never counts.
    Rejected,
}

impl TransactionStatus {
    fn qualifying(self) -> bool {
        matches!(self, Self::Active | Self::Completed | Self::Approved)
    }
}

#[derive(Debug, Clone)]
struct Transaction {
    user: UserId,
    amount: Decimal,
    at: DateTime<Utc>,
    status: TransactionStatus,
}

/// A mutable in-memory transaction ledger.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    transactions: Mutex<Vec<Transaction>>,
}

impl InMemoryLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an approved (qualifying) transaction.
    pub fn push(&self, user: UserId, amount: Decimal, at: DateTime<Utc>) {
        self.push_with_status(user, amount, at, TransactionStatus::Approved);
    }

    /// Record a transaction with an explicit status.
    pub fn push_with_status(
        &self,
        user: UserId,
        amount: Decimal,
        at: DateTime<Utc>,
        status: TransactionStatus,
    ) {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Transaction {
                user,
                amount,
                at,
                status,
            });
    }
}

impl TransactionLedger for InMemoryLedger {
    fn sum_qualifying(&self, users: &[UserId], window: &QualificationWindow) -> Decimal {
        self.transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| {
                tx.status.qualifying() && users.contains(&tx.user) && window.contains(tx.at)
            })
            .map(|tx| tx.amount)
            .sum()
    }

    fn count_qualifying(&self, user: UserId, window: &QualificationWindow) -> u32 {
        let count = self
            .transactions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|tx| tx.status.qualifying() && tx.user == user && window.contains(tx.at))
            .count();

        count.try_into().unwrap_or(u32::MAX)
    }
}

/// One credit accepted by the in-memory wallet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WalletCredit {
    /// Credited user.
    pub user: UserId,

    /// Credited amount.
    pub amount: Decimal,

    /// Reward kind the credit came from.
    pub kind: RewardKind,
}

/// A wallet that records every credit it accepts.
#[derive(Debug, Default)]
pub struct InMemoryWallet {
    credits: Mutex<Vec<WalletCredit>>,
}

impl InMemoryWallet {
    /// Create an empty wallet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total balance credited to `user`.
    #[must_use]
    pub fn balance(&self, user: UserId) -> Decimal {
        self.credits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|credit| credit.user == user)
            .map(|credit| credit.amount)
            .sum()
    }

    /// Number of credits accepted for `user`.
    #[must_use]
    pub fn credit_count(&self, user: UserId) -> usize {
        self.credits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|credit| credit.user == user)
            .count()
    }
}

impl Wallet for InMemoryWallet {
    fn credit(
        &self,
        user: UserId,
        amount: Decimal,
        kind: RewardKind,
    ) -> Result<(), CollaboratorError> {
        self.credits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(WalletCredit { user, amount, kind });

        Ok(())
    }
}

/// One entry in the in-memory reward ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct RewardEntry {
    /// Entry id handed back to the engine.
    pub id: RewardEntryId,

    /// Rewarded user.
    pub user: UserId,

    /// Campaign name the reward references.
    pub campaign: String,

    /// Resolved reward amount.
    pub amount: Decimal,

    /// Human-readable description.
    pub description: String,

    /// Whether a later abort voided this entry.
    pub voided: bool,
}

/// A reward ledger that records entries and voids.
#[derive(Debug, Default)]
pub struct InMemoryRewardLedger {
    entries: Mutex<Vec<RewardEntry>>,
}

impl InMemoryRewardLedger {
    /// Create an empty reward ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-voided entries for `user`.
    #[must_use]
    pub fn active_entries(&self, user: UserId) -> Vec<RewardEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|entry| entry.user == user && !entry.voided)
            .cloned()
            .collect()
    }

    /// Every entry ever recorded, voided ones included.
    #[must_use]
    pub fn entries(&self) -> Vec<RewardEntry> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RewardLedger for InMemoryRewardLedger {
    fn record_reward(
        &self,
        user: UserId,
        campaign_name: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<RewardEntryId, CollaboratorError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let id = RewardEntryId(entries.len() as u64 + 1);

        entries.push(RewardEntry {
            id,
            user,
            campaign: campaign_name.to_string(),
            amount,
            description: description.to_string(),
            voided: false,
        });

        Ok(id)
    }

    fn void_reward(&self, entry: RewardEntryId) -> Result<(), CollaboratorError> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);

        match entries.iter_mut().find(|candidate| candidate.id == entry) {
            Some(found) => {
                found.voided = true;
                Ok(())
            }
            None => Err(CollaboratorError::new(
                "reward ledger",
                format!("no entry {entry:?} to void"),
            )),
        }
    }
}

/// A notifier that records every dispatched notification.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, Notification)>>,
}

impl RecordingNotifier {
    /// Create an empty notifier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification dispatched so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<(UserId, Notification)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Notifications dispatched to `user`, in order.
    #[must_use]
    pub fn sent_to(&self, user: UserId) -> Vec<Notification> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(recipient, _)| *recipient == user)
            .map(|(_, notification)| notification.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, user: UserId, notification: &Notification) {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((user, notification.clone()));
    }
}

/// A clock that reports whatever instant it was last set to.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Create a clock pinned at `now`.
    #[must_use]
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
