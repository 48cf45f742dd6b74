//! Laurel prelude.
//!
//! Convenience exports for common library consumers.

pub use crate::{
    campaigns::{
        Campaign, CampaignError, CampaignKey, CampaignStatus, WindowMode,
        criteria::{CriteriaError, CriteriaSet, GroupRatio},
        rewards::{RewardKind, RewardSpec},
        schedule::StatusRoll,
    },
    clock::{Clock, SystemClock},
    directory::{Club, Rank, ReferralDirectory, UserId, UserProfile, UserStatus},
    engine::{
        CheckOutcome, EngineBuilder, EngineError, Evaluation, QualificationEngine, Trigger,
    },
    leaderboard::LeaderboardEntry,
    ledger::{
        CollaboratorError, Notification, Notifier, NoopNotifier, RewardEntryId, RewardLedger,
        TransactionLedger, Wallet,
    },
    progress::{LegVolume, ProgressCalculator, ProgressSnapshot},
    qualification::{ManualOverride, QualificationRecord, QualificationStatus},
    window::QualificationWindow,
};
