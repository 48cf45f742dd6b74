//! Qualification records
//!
//! The per-(user, campaign) progress and outcome ledger. Exactly one
//! record exists per pair; it is upserted on every evaluation, never
//! duplicated and never deleted. `Awarded` and `Disqualified` are
//! terminal: once reached, later evaluations leave the record alone.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::{
    campaigns::{CampaignKey, rewards::RewardKind},
    directory::UserId,
    progress::ProgressSnapshot,
};

/// Lifecycle status of a qualification record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualificationStatus {
    /// Record exists but has never been evaluated with any progress.
    Pending,

    /// Evaluated at least once, criteria not yet met.
    InProgress,

    /// All criteria met; reward grant pending or retrying.
    Qualified,

    /// Reward granted. Terminal.
    Awarded,

    /// Removed from contention (campaign capacity exhausted). Terminal.
    Disqualified,
}

impl QualificationStatus {
    /// Whether the record can never change status again.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Awarded | Self::Disqualified)
    }

    /// Whether the user has crossed the threshold (qualified or better).
    ///
    /// Achieved records are never recomputed or downgraded: a user who
    /// later slips below a threshold keeps the achievement.
    #[must_use]
    pub fn is_achieved(self) -> bool {
        matches!(self, Self::Qualified | Self::Awarded)
    }
}

impl std::fmt::Display for QualificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Qualified => "QUALIFIED",
            Self::Awarded => "AWARDED",
            Self::Disqualified => "DISQUALIFIED",
        };

        f.write_str(label)
    }
}

/// Record of a manual override by an administrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualOverride {
    /// Administrator who forced the qualification.
    pub actor: UserId,

    /// Stated reason.
    pub reason: String,
}

/// The per-(user, campaign) progress and outcome record.
#[derive(Debug, Clone)]
pub struct QualificationRecord {
    /// Campaign this record tracks.
    pub campaign: CampaignKey,

    /// User this record tracks.
    pub user: UserId,

    /// Lifecycle status.
    pub status: QualificationStatus,

    /// Last computed metrics.
    pub snapshot: ProgressSnapshot,

    /// Score used for leaderboard ordering.
    pub leaderboard_score: Decimal,

    /// When the user first made progress towards this campaign.
    pub first_activity_at: DateTime<Utc>,

    /// When all criteria were first met. Never cleared.
    pub qualified_at: Option<DateTime<Utc>>,

    /// When the reward was granted. Set if and only if status is
    /// [`QualificationStatus::Awarded`]; never cleared.
    pub awarded_at: Option<DateTime<Utc>>,

    /// When the user's window closes (join-anchored campaigns).
    pub expires_at: Option<DateTime<Utc>>,

    /// Resolved reward amount, once granted.
    pub reward_amount: Option<Decimal>,

    /// Reward kind, once granted.
    pub reward_kind: Option<RewardKind>,

    /// Present when an administrator forced the qualification.
    pub manual_override: Option<ManualOverride>,

    /// System-generated notes (e.g. the disqualification reason).
    pub notes: Option<String>,
}

impl QualificationRecord {
    /// Create a fresh record for a pair, before its first evaluation.
    #[must_use]
    pub fn new(campaign: CampaignKey, user: UserId, now: DateTime<Utc>) -> Self {
        Self {
            campaign,
            user,
            status: QualificationStatus::Pending,
            snapshot: ProgressSnapshot::default(),
            leaderboard_score: Decimal::ZERO,
            first_activity_at: now,
            qualified_at: None,
            awarded_at: None,
            expires_at: None,
            reward_amount: None,
            reward_kind: None,
            manual_override: None,
            notes: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_are_awarded_and_disqualified() {
        assert!(QualificationStatus::Awarded.is_terminal(), "awarded is terminal");
        assert!(
            QualificationStatus::Disqualified.is_terminal(),
            "disqualified is terminal"
        );
        assert!(!QualificationStatus::Qualified.is_terminal(), "qualified can still move");
        assert!(!QualificationStatus::InProgress.is_terminal(), "in progress can still move");
    }

    #[test]
    fn achieved_states_are_qualified_and_awarded() {
        assert!(QualificationStatus::Qualified.is_achieved(), "qualified is achieved");
        assert!(QualificationStatus::Awarded.is_achieved(), "awarded is achieved");
        assert!(!QualificationStatus::Pending.is_achieved(), "pending is not achieved");
        assert!(
            !QualificationStatus::Disqualified.is_achieved(),
            "disqualified is not achieved"
        );
    }

    #[test]
    fn fresh_records_start_pending_with_no_stamps() {
        let record = QualificationRecord::new(
            CampaignKey::default(),
            UserId(1),
            DateTime::<Utc>::MIN_UTC,
        );

        assert_eq!(record.status, QualificationStatus::Pending);
        assert!(record.qualified_at.is_none(), "not yet qualified");
        assert!(record.awarded_at.is_none(), "not yet awarded");
        assert!(record.manual_override.is_none(), "no override");
    }
}
