//! Qualification engine
//!
//! The impartial judge for campaign qualifications. Triggers arrive
//! concurrently from independent sources (an investment posted, a
//! referral created, a manual refresh, the scheduler); the engine
//! recomputes progress, drives the per-(user, campaign) record through
//! its state machine and, the first time a user crosses the threshold,
//! grants the reward exactly once.
//!
//! Progress recomputation is read-mostly and idempotent and takes no
//! locks; the grant protocol is the sole serialization point, a
//! per-(campaign, user) mutex held for the duration of the atomic unit.

use std::sync::{Arc, Mutex, PoisonError, RwLock};

use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use slotmap::SlotMap;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    campaigns::{
        Campaign, CampaignError, CampaignKey, CampaignStatus,
        rewards::RewardKind,
        schedule::{self, StatusRoll},
    },
    clock::{Clock, SystemClock},
    directory::{ReferralDirectory, UserId},
    leaderboard::{self, LeaderboardEntry},
    ledger::{
        CollaboratorError, Notification, Notifier, NoopNotifier, RewardLedger, TransactionLedger,
        Wallet,
    },
    progress::{DEFAULT_MAX_DEPTH, ProgressCalculator},
    qualification::{ManualOverride, QualificationRecord, QualificationStatus},
    window::QualificationWindow,
};

/// Shared referral directory handle.
pub type SharedDirectory = Arc<dyn ReferralDirectory + Send + Sync>;

/// Shared transaction ledger handle.
pub type SharedLedger = Arc<dyn TransactionLedger + Send + Sync>;

/// Shared wallet handle.
pub type SharedWallet = Arc<dyn Wallet + Send + Sync>;

/// Shared reward ledger handle.
pub type SharedRewardLedger = Arc<dyn RewardLedger + Send + Sync>;

/// Shared notifier handle.
pub type SharedNotifier = Arc<dyn Notifier + Send + Sync>;

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Errors surfaced by engine entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The campaign key references nothing.
    #[error("campaign not found")]
    CampaignNotFound,

    /// New evaluations are refused for campaigns that are not active.
    #[error("campaign is {0}, not active")]
    CampaignNotActive(CampaignStatus),

    /// A campaign with no criteria is unconfigured, not "always true".
    #[error("campaign has no qualification criteria configured")]
    UnconfiguredCriteria,

    /// The reward was already granted for this (user, campaign) pair.
    ///
    /// This is what the losing side of a concurrent double-award attempt
    /// sees; it is never retried automatically.
    #[error("reward already granted for this user and campaign")]
    AlreadyAwarded,

    /// Campaigns with qualified or awarded records cannot be deleted.
    #[error("campaign still has qualified or awarded records")]
    CampaignReferenced,

    /// Invalid campaign definition.
    #[error(transparent)]
    Campaign(#[from] CampaignError),

    /// A collaborator failed; the atomic unit was rolled back.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

/// Why a qualification check was triggered. Carried through logging only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// An investment was posted.
    InvestmentPosted,
    /// A new referral joined.
    ReferralCreated,
    /// A user asked for a refresh.
    ManualRefresh,
    /// The recurring scheduler ran.
    Scheduled,
    /// Unspecified activity.
    General,
}

/// Result of a batch qualification check across all open campaigns.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Campaigns evaluated.
    pub checked: u32,

    /// Campaigns the user newly qualified for (and was granted).
    pub qualified: u32,
}

/// Result of evaluating one (user, campaign) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation {
    /// The record was already terminal, or lost a qualification race;
    /// nothing changed.
    Unchanged,

    /// Criteria not yet met; the snapshot and scores were updated.
    InProgress,

    /// The campaign's capacity is exhausted; the record was disqualified.
    Disqualified,

    /// The reward was granted.
    Awarded {
        /// Resolved reward amount (zero for item rewards).
        amount: Decimal,
    },
}

/// Outcome of the grant protocol.
enum GrantOutcome {
    Granted(Decimal),
    CapacityExhausted,
}

#[derive(Debug, Default)]
struct EngineState {
    campaigns: SlotMap<CampaignKey, Campaign>,
    records: FxHashMap<(CampaignKey, UserId), QualificationRecord>,
}

/// Builder for [`QualificationEngine`].
pub struct EngineBuilder {
    directory: SharedDirectory,
    ledger: SharedLedger,
    wallet: SharedWallet,
    rewards: SharedRewardLedger,
    notifier: SharedNotifier,
    clock: SharedClock,
    max_depth: usize,
}

impl std::fmt::Debug for EngineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineBuilder")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl EngineBuilder {
    /// Replace the default [`NoopNotifier`].
    #[must_use]
    pub fn notifier(mut self, notifier: SharedNotifier) -> Self {
        self.notifier = notifier;
        self
    }

    /// Replace the default [`SystemClock`].
    #[must_use]
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Override the downline traversal depth cap.
    #[must_use]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> QualificationEngine {
        QualificationEngine {
            directory: self.directory,
            ledger: self.ledger,
            wallet: self.wallet,
            rewards: self.rewards,
            notifier: self.notifier,
            clock: self.clock,
            max_depth: self.max_depth,
            state: RwLock::new(EngineState::default()),
            grant_locks: Mutex::new(FxHashMap::default()),
        }
    }
}

/// The campaign qualification and reward engine.
pub struct QualificationEngine {
    directory: SharedDirectory,
    ledger: SharedLedger,
    wallet: SharedWallet,
    rewards: SharedRewardLedger,
    notifier: SharedNotifier,
    clock: SharedClock,
    max_depth: usize,
    state: RwLock<EngineState>,
    grant_locks: Mutex<FxHashMap<(CampaignKey, UserId), Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for QualificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QualificationEngine")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl QualificationEngine {
    /// Start building an engine from its required collaborators.
    #[must_use]
    pub fn builder(
        directory: SharedDirectory,
        ledger: SharedLedger,
        wallet: SharedWallet,
        rewards: SharedRewardLedger,
    ) -> EngineBuilder {
        EngineBuilder {
            directory,
            ledger,
            wallet,
            rewards,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    // ---- campaign administration ----------------------------------------

    /// Register a campaign after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Campaign`] if the definition is invalid.
    pub fn add_campaign(&self, campaign: Campaign) -> Result<CampaignKey, EngineError> {
        campaign.validate()?;

        let mut state = self.write_state();

        Ok(state.campaigns.insert(campaign))
    }

    /// A clone of the campaign behind `key`.
    #[must_use]
    pub fn campaign(&self, key: CampaignKey) -> Option<Campaign> {
        self.read_state().campaigns.get(key).cloned()
    }

    /// Explicit admin override of a campaign's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CampaignNotFound`] if the key is stale.
    pub fn set_campaign_status(
        &self,
        key: CampaignKey,
        status: CampaignStatus,
    ) -> Result<(), EngineError> {
        let mut state = self.write_state();

        let campaign = state
            .campaigns
            .get_mut(key)
            .ok_or(EngineError::CampaignNotFound)?;

        campaign.status = status;

        Ok(())
    }

    /// Delete a campaign.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CampaignReferenced`] while any qualified or
    /// awarded record references the campaign — the historical ledger
    /// must stay intact — or [`EngineError::CampaignNotFound`] for a
    /// stale key.
    pub fn remove_campaign(&self, key: CampaignKey) -> Result<Campaign, EngineError> {
        let mut state = self.write_state();

        if !state.campaigns.contains_key(key) {
            return Err(EngineError::CampaignNotFound);
        }

        let referenced = state
            .records
            .values()
            .any(|record| record.campaign == key && record.status.is_achieved());

        if referenced {
            return Err(EngineError::CampaignReferenced);
        }

        state.records.retain(|(campaign, _), _| *campaign != key);

        state
            .campaigns
            .remove(key)
            .ok_or(EngineError::CampaignNotFound)
    }

    /// A clone of the qualification record for a pair, if one exists.
    #[must_use]
    pub fn record(&self, key: CampaignKey, user: UserId) -> Option<QualificationRecord> {
        self.read_state().records.get(&(key, user)).cloned()
    }

    // ---- entry points ----------------------------------------------------

    /// Evaluate `user` against every active, visible campaign.
    ///
    /// Per-campaign failures never reach the end user: they are logged
    /// and degrade to "no change", with the prior progress still visible.
    pub fn check_and_update_qualification(&self, user: UserId, trigger: Trigger) -> CheckOutcome {
        let open: Vec<CampaignKey> = {
            let state = self.read_state();

            state
                .campaigns
                .iter()
                .filter(|(_, campaign)| campaign.open_for_evaluation())
                .map(|(key, _)| key)
                .collect()
        };

        let mut outcome = CheckOutcome::default();

        for key in open {
            outcome.checked += 1;

            match self.evaluate_campaign(user, key) {
                Ok(Evaluation::Awarded { .. }) => outcome.qualified += 1,
                Ok(_) => {}
                Err(EngineError::AlreadyAwarded) => {
                    debug!(%user, ?trigger, "grant already settled by a concurrent trigger");
                }
                Err(error) => {
                    warn!(%user, ?trigger, %error, "evaluation degraded to no change");
                }
            }
        }

        debug!(
            %user,
            ?trigger,
            checked = outcome.checked,
            qualified = outcome.qualified,
            "qualification check complete"
        );

        outcome
    }

    /// Evaluate `user` against one campaign.
    ///
    /// Records that already reached `Qualified` or `Awarded` are never
    /// recomputed or downgraded; a `Qualified` record only retries its
    /// pending grant. New evaluations are refused unless the campaign is
    /// active, but a campaign expiring mid-evaluation does not abort the
    /// in-flight check.
    ///
    /// # Errors
    ///
    /// Returns a configuration error ([`EngineError::CampaignNotFound`],
    /// [`EngineError::UnconfiguredCriteria`],
    /// [`EngineError::CampaignNotActive`]) with no state mutated, or
    /// [`EngineError::AlreadyAwarded`] / [`EngineError::Collaborator`]
    /// from the grant protocol.
    pub fn evaluate_campaign(
        &self,
        user: UserId,
        key: CampaignKey,
    ) -> Result<Evaluation, EngineError> {
        let (campaign, record_status) = {
            let state = self.read_state();

            let campaign = state
                .campaigns
                .get(key)
                .ok_or(EngineError::CampaignNotFound)?
                .clone();
            let record_status = state.records.get(&(key, user)).map(|record| record.status);

            (campaign, record_status)
        };

        if campaign.criteria.is_empty() {
            return Err(EngineError::UnconfiguredCriteria);
        }

        match record_status {
            Some(status) if status.is_terminal() => return Ok(Evaluation::Unchanged),
            Some(QualificationStatus::Qualified) => {
                // Achievement kept; only the pending grant is retried.
                return match self.grant(key, user, false)? {
                    GrantOutcome::Granted(amount) => Ok(Evaluation::Awarded { amount }),
                    GrantOutcome::CapacityExhausted => Ok(Evaluation::Disqualified),
                };
            }
            _ => {}
        }

        if campaign.status != CampaignStatus::Active {
            return Err(EngineError::CampaignNotActive(campaign.status));
        }

        if campaign.capacity_exhausted() {
            self.disqualify(key, user, "maximum qualifiers limit reached");
            return Ok(Evaluation::Disqualified);
        }

        // Snapshot computation holds no locks; it is idempotent and
        // re-running it with the same ledger yields the same result.
        let profile = self.directory.profile(user);
        let window = QualificationWindow::resolve(&campaign, profile.as_ref());
        let calculator = ProgressCalculator::new(self.directory.as_ref(), self.ledger.as_ref())
            .with_max_depth(self.max_depth);
        let snapshot = calculator.snapshot(user, &campaign, &window);
        let met = campaign.criteria.met_by(&snapshot);
        let score = leaderboard::score(&snapshot);
        let now = self.clock.now();

        let newly_qualified = {
            let mut state = self.write_state();

            let record = state
                .records
                .entry((key, user))
                .or_insert_with(|| QualificationRecord::new(key, user, now));

            if record.status.is_achieved() || record.status.is_terminal() {
                // A concurrent trigger got here first; keep its outcome.
                false
            } else {
                record.snapshot = snapshot;
                record.leaderboard_score = score;
                record.expires_at = Some(window.end);

                if met {
                    record.status = QualificationStatus::Qualified;
                    record.qualified_at = Some(now);
                    true
                } else {
                    record.status = QualificationStatus::InProgress;
                    false
                }
            }
        };

        if !newly_qualified {
            debug!(%user, campaign = %campaign.name, met, "progress updated");

            return Ok(if met {
                Evaluation::Unchanged
            } else {
                Evaluation::InProgress
            });
        }

        info!(%user, campaign = %campaign.name, "criteria met; granting reward");

        self.notifier.notify(
            user,
            &Notification::Qualified {
                campaign: campaign.name.clone(),
            },
        );

        match self.grant(key, user, false)? {
            GrantOutcome::Granted(amount) => Ok(Evaluation::Awarded { amount }),
            GrantOutcome::CapacityExhausted => Ok(Evaluation::Disqualified),
        }
    }

    /// Force-qualify a user and grant through the standard protocol.
    ///
    /// The override enters the same state machine and the identical grant
    /// unit, so the at-most-once guarantee is never bypassed; capacity is
    /// the one check an administrator overrides.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CampaignNotFound`] for a stale key,
    /// [`EngineError::AlreadyAwarded`] if the reward was already granted,
    /// or [`EngineError::Collaborator`] if the grant unit rolled back.
    pub fn manual_award(
        &self,
        key: CampaignKey,
        user: UserId,
        actor: UserId,
        reason: &str,
    ) -> Result<Decimal, EngineError> {
        let now = self.clock.now();

        {
            let mut state = self.write_state();

            if !state.campaigns.contains_key(key) {
                return Err(EngineError::CampaignNotFound);
            }

            let record = state
                .records
                .entry((key, user))
                .or_insert_with(|| QualificationRecord::new(key, user, now));

            if record.status == QualificationStatus::Awarded {
                return Err(EngineError::AlreadyAwarded);
            }

            record.status = QualificationStatus::Qualified;
            record.qualified_at.get_or_insert(now);
            record.manual_override = Some(ManualOverride {
                actor,
                reason: reason.to_string(),
            });
        }

        info!(%user, %actor, "manual qualification override");

        match self.grant(key, user, true)? {
            GrantOutcome::Granted(amount) => Ok(amount),
            // Unreachable with capacity bypassed; kept for completeness.
            GrantOutcome::CapacityExhausted => Err(EngineError::AlreadyAwarded),
        }
    }

    /// Roll campaign statuses forward against the engine clock.
    ///
    /// Idempotent: re-running with no campaign crossing a boundary has no
    /// observable effect.
    pub fn update_campaign_statuses(&self) -> StatusRoll {
        let now = self.clock.now();
        let mut state = self.write_state();

        schedule::roll_statuses(state.campaigns.values_mut(), now)
    }

    /// The ranked leaderboard for a campaign.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CampaignNotFound`] for a stale key.
    pub fn leaderboard(
        &self,
        key: CampaignKey,
        limit: usize,
    ) -> Result<Vec<LeaderboardEntry>, EngineError> {
        let state = self.read_state();

        if !state.campaigns.contains_key(key) {
            return Err(EngineError::CampaignNotFound);
        }

        Ok(leaderboard::rank(
            state.records.values().filter(|record| record.campaign == key),
            limit,
        ))
    }

    /// A user's leaderboard position for a campaign.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::CampaignNotFound`] for a stale key.
    pub fn position(&self, key: CampaignKey, user: UserId) -> Result<Option<usize>, EngineError> {
        let state = self.read_state();

        if !state.campaigns.contains_key(key) {
            return Err(EngineError::CampaignNotFound);
        }

        Ok(leaderboard::position(
            state.records.values().filter(|record| record.campaign == key),
            user,
        ))
    }

    // ---- grant protocol --------------------------------------------------

    /// The transactional, at-most-once reward grant.
    ///
    /// Serialized per (campaign, user). The unit opens by claiming a
    /// capacity slot under the state write lock: the record is re-checked,
    /// the amount resolved and `current_qualifiers` incremented in one
    /// critical section, so grants for different users can never overshoot
    /// `max_qualifiers` while this one is at a collaborator. Then the
    /// reward-ledger entry, the wallet credit (cash kinds only), and the
    /// commit that flips the record to `Awarded`. Every abort path voids
    /// the ledger entry and releases the claimed slot; a collaborator
    /// failure leaves the record `Qualified`, so a later trigger can
    /// retry safely.
    fn grant(
        &self,
        key: CampaignKey,
        user: UserId,
        bypass_capacity: bool,
    ) -> Result<GrantOutcome, EngineError> {
        let pair_lock = self.grant_lock(key, user);
        let _guard = pair_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let (campaign, amount) = {
            let mut state = self.write_state();
            let EngineState { campaigns, records } = &mut *state;

            let record = records
                .get_mut(&(key, user))
                .ok_or(EngineError::CampaignNotFound)?;

            if record.status != QualificationStatus::Qualified {
                // Another trigger settled this pair while we waited.
                warn!(%user, "grant abandoned; record no longer awaiting a grant");
                return Err(EngineError::AlreadyAwarded);
            }

            let row = campaigns.get_mut(key).ok_or(EngineError::CampaignNotFound)?;

            if !bypass_capacity && row.capacity_exhausted() {
                record.status = QualificationStatus::Disqualified;
                record.notes = Some("maximum qualifiers limit reached".to_string());

                let campaign_name = row.name.clone();
                drop(state);

                info!(%user, campaign = %campaign_name, "record disqualified; campaign at capacity");

                self.notifier.notify(
                    user,
                    &Notification::Disqualified {
                        campaign: campaign_name,
                    },
                );

                return Ok(GrantOutcome::CapacityExhausted);
            }

            let amount = row
                .reward
                .amount_for(row.current_qualifiers, row.max_qualifiers);

            // Claim the slot before any collaborator call.
            row.current_qualifiers += 1;

            (row.clone(), amount)
        };

        let description = format!("Achievement: {}", campaign.name);

        let entry = match self
            .rewards
            .record_reward(user, &campaign.name, amount, &description)
        {
            Ok(entry) => entry,
            Err(error) => {
                self.release_capacity_slot(key);
                return Err(error.into());
            }
        };

        if campaign.reward.is_cash()
            && amount > Decimal::ZERO
            && let Err(error) = self.wallet.credit(user, amount, campaign.reward.kind())
        {
            warn!(%user, campaign = %campaign.name, %error, "wallet credit failed; grant rolled back");

            if let Err(void_error) = self.rewards.void_reward(entry) {
                warn!(%user, %void_error, "could not void reward entry after abort");
            }

            self.release_capacity_slot(key);

            return Err(error.into());
        }

        if let Some(error) = self.commit_grant(key, user, amount, campaign.reward.kind()) {
            self.abort_after_credit(entry);
            return Err(error);
        }

        info!(%user, campaign = %campaign.name, %amount, "reward granted");

        self.notifier.notify(
            user,
            &Notification::RewardGranted {
                campaign: campaign.name.clone(),
                amount,
            },
        );

        Ok(GrantOutcome::Granted(amount))
    }

    /// Flip the record to `Awarded` and settle the campaign counters.
    ///
    /// Returns the abort reason if the record left `Qualified` while the
    /// collaborators ran: the settled outcome stands, never this grant's,
    /// and the claimed capacity slot is released.
    fn commit_grant(
        &self,
        key: CampaignKey,
        user: UserId,
        amount: Decimal,
        kind: RewardKind,
    ) -> Option<EngineError> {
        let now = self.clock.now();
        let mut state = self.write_state();
        let EngineState { campaigns, records } = &mut *state;
        let row = campaigns.get_mut(key);

        match (records.get_mut(&(key, user)), row) {
            (Some(record), Some(row)) if record.status == QualificationStatus::Qualified => {
                record.status = QualificationStatus::Awarded;
                record.awarded_at = Some(now);
                record.reward_amount = Some(amount);
                record.reward_kind = Some(kind);

                row.total_paid_out += amount;

                None
            }
            (Some(record), row) => {
                warn!(%user, status = ?record.status, "grant aborted at commit; record settled concurrently");

                if let Some(row) = row {
                    row.current_qualifiers = row.current_qualifiers.saturating_sub(1);
                }

                Some(EngineError::AlreadyAwarded)
            }
            (None, row) => {
                if let Some(row) = row {
                    row.current_qualifiers = row.current_qualifiers.saturating_sub(1);
                }

                Some(EngineError::CampaignNotFound)
            }
        }
    }

    fn abort_after_credit(&self, entry: crate::ledger::RewardEntryId) {
        if let Err(void_error) = self.rewards.void_reward(entry) {
            warn!(%void_error, "could not void reward entry after abort");
        }
    }

    fn release_capacity_slot(&self, key: CampaignKey) {
        let mut state = self.write_state();

        if let Some(campaign) = state.campaigns.get_mut(key) {
            campaign.current_qualifiers = campaign.current_qualifiers.saturating_sub(1);
        }
    }

    fn disqualify(&self, key: CampaignKey, user: UserId, note: &str) {
        let now = self.clock.now();

        let campaign_name = {
            let mut state = self.write_state();

            let Some(campaign) = state.campaigns.get(key) else {
                return;
            };

            let name = campaign.name.clone();

            let record = state
                .records
                .entry((key, user))
                .or_insert_with(|| QualificationRecord::new(key, user, now));

            if record.status.is_terminal() {
                return;
            }

            record.status = QualificationStatus::Disqualified;
            record.notes = Some(note.to_string());

            name
        };

        info!(%user, campaign = %campaign_name, note, "record disqualified");

        self.notifier.notify(
            user,
            &Notification::Disqualified {
                campaign: campaign_name,
            },
        );
    }

    fn grant_lock(&self, key: CampaignKey, user: UserId) -> Arc<Mutex<()>> {
        let mut locks = self
            .grant_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        locks.entry((key, user)).or_default().clone()
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}
