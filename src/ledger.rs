//! Ledger collaborators
//!
//! Contracts for the external transaction ledger, wallet, reward ledger
//! and notification dispatch. The engine owns none of this state; it only
//! aggregates from the transaction ledger and, inside the award unit,
//! posts to the reward ledger and wallet.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{
    campaigns::rewards::RewardKind,
    directory::UserId,
    window::QualificationWindow,
};

/// Identifier of an entry in the external reward ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RewardEntryId(pub u64);

/// A collaborator call failed.
///
/// The award unit treats any collaborator failure as an abort: already
/// performed external steps are compensated and no engine state changes.
#[derive(Debug, Error)]
#[error("{service} unavailable: {reason}")]
pub struct CollaboratorError {
    /// Which collaborator failed (`"wallet"`, `"reward ledger"`, ...).
    pub service: &'static str,

    /// Implementation-provided failure detail.
    pub reason: String,
}

impl CollaboratorError {
    /// Create a failure report for the named collaborator.
    #[must_use]
    pub fn new(service: &'static str, reason: impl Into<String>) -> Self {
        Self {
            service,
            reason: reason.into(),
        }
    }
}

/// Aggregation over the monetary transaction ledger.
///
/// "Qualifying" is the implementation's concern; the reference backend
/// counts transactions in ACTIVE, COMPLETED or APPROVED status. Both
/// methods are read-only and may be called concurrently.
pub trait TransactionLedger {
    /// Sum of qualifying transaction amounts for `users` inside `window`.
    fn sum_qualifying(&self, users: &[UserId], window: &QualificationWindow) -> Decimal;

    /// Number of qualifying transactions for `user` inside `window`.
    fn count_qualifying(&self, user: UserId, window: &QualificationWindow) -> u32;
}

/// The user's external wallet.
pub trait Wallet {
    /// Credit `amount` to `user`.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the wallet backend rejects or
    /// cannot process the credit; the caller aborts the award unit.
    fn credit(&self, user: UserId, amount: Decimal, kind: RewardKind)
    -> Result<(), CollaboratorError>;
}

/// The immutable income/reward ledger.
pub trait RewardLedger {
    /// Record a reward entry for `user`, returning its id.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the entry cannot be recorded; the
    /// caller aborts the award unit with no compensation needed.
    fn record_reward(
        &self,
        user: UserId,
        campaign_name: &str,
        amount: Decimal,
        description: &str,
    ) -> Result<RewardEntryId, CollaboratorError>;

    /// Void a previously recorded entry.
    ///
    /// Compensation hook: called when a step after
    /// [`record_reward`](RewardLedger::record_reward) aborts the award
    /// unit, so the entry never becomes visible as paid income.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] if the void itself fails; the caller
    /// logs and proceeds with the abort.
    fn void_reward(&self, entry: RewardEntryId) -> Result<(), CollaboratorError>;
}

/// Events dispatched to users after engine transitions.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The user met all criteria of a campaign.
    Qualified {
        /// Campaign name.
        campaign: String,
    },

    /// A reward was granted and (for cash kinds) credited.
    RewardGranted {
        /// Campaign name.
        campaign: String,
        /// Resolved reward amount (zero for item rewards).
        amount: Decimal,
    },

    /// The user was disqualified (campaign capacity exhausted).
    Disqualified {
        /// Campaign name.
        campaign: String,
    },
}

/// Fire-and-forget notification dispatch.
///
/// The engine never blocks on, or reacts to, delivery: implementations
/// swallow their own failures.
pub trait Notifier {
    /// Dispatch `notification` to `user`.
    fn notify(&self, user: UserId, notification: &Notification);
}

/// Notifier that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _user: UserId, _notification: &Notification) {}
}
