//! Campaigns
//!
//! A campaign is a time-boxed incentive definition: an eligibility window,
//! a sparse criteria set, a reward specification, an optional qualifier
//! capacity, and the running counters the award unit maintains.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use thiserror::Error;

use crate::campaigns::{criteria::CriteriaError, criteria::CriteriaSet, rewards::RewardSpec};

pub mod criteria;
pub mod rewards;
pub mod schedule;

new_key_type! {
    /// Key of an engine-owned campaign.
    pub struct CampaignKey;
}

/// Errors raised when validating a campaign definition.
#[derive(Debug, Error)]
pub enum CampaignError {
    /// The resolved window would not end after it starts.
    #[error("campaign window must end after it starts ({start} is not before {end})")]
    WindowOrder {
        /// Configured start instant.
        start: DateTime<Utc>,
        /// Configured end instant.
        end: DateTime<Utc>,
    },

    /// A capacity of zero qualifiers makes the campaign unwinnable.
    #[error("max_qualifiers must be at least 1 when set")]
    ZeroCapacity,

    /// An invalid criteria threshold.
    #[error(transparent)]
    Criteria(#[from] CriteriaError),
}

/// How a campaign's eligibility window is anchored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WindowMode {
    /// Fixed calendar window: the campaign's own start and end.
    FixedDates,

    /// Per-user window starting at the user's join instant.
    FromJoinDate,
}

/// Lifecycle status of a campaign.
///
/// Transitions are monotonic and driven only by wall-clock comparison
/// against the resolved window; they are never reversed except by explicit
/// admin action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CampaignStatus {
    /// Created but not yet scheduled.
    Draft,
    /// Scheduled; start date not yet reached.
    Upcoming,
    /// Window open; eligible for evaluation.
    Active,
    /// Window closed.
    Expired,
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Draft => "DRAFT",
            Self::Upcoming => "UPCOMING",
            Self::Active => "ACTIVE",
            Self::Expired => "EXPIRED",
        };

        f.write_str(label)
    }
}

fn default_visible() -> bool {
    true
}

fn default_status() -> CampaignStatus {
    CampaignStatus::Draft
}

/// A time-boxed incentive definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Campaign {
    /// Display name, also used in reward-ledger descriptions.
    pub name: String,

    /// Optional description shown to users.
    #[serde(default)]
    pub description: Option<String>,

    /// How the eligibility window is anchored.
    pub window_mode: WindowMode,

    /// Window start (used when [`WindowMode::FixedDates`], and as the
    /// fallback when a user profile is unavailable).
    pub start: DateTime<Utc>,

    /// Window end, exclusive.
    pub end: DateTime<Utc>,

    /// Window length in days for [`WindowMode::FromJoinDate`]; defaults to
    /// 60 when unset.
    #[serde(default)]
    pub relative_days: Option<i64>,

    /// The thresholds a user must meet.
    pub criteria: CriteriaSet,

    /// What a qualifier is paid.
    pub reward: RewardSpec,

    /// Maximum number of users who can qualify; `None` means unlimited.
    #[serde(default)]
    pub max_qualifiers: Option<u32>,

    /// Lifecycle status.
    #[serde(default = "default_status")]
    pub status: CampaignStatus,

    /// Whether the batch check loop considers this campaign.
    #[serde(default = "default_visible")]
    pub visible: bool,

    /// Number of users who have been granted the reward.
    ///
    /// Mutated exclusively inside the award atomic unit.
    #[serde(default)]
    pub current_qualifiers: u32,

    /// Total amount paid out so far.
    ///
    /// Mutated exclusively inside the award atomic unit.
    #[serde(default)]
    pub total_paid_out: Decimal,
}

impl Campaign {
    /// Validate the definition.
    ///
    /// # Errors
    ///
    /// Returns a [`CampaignError`] if the window is not strictly ordered,
    /// the capacity is zero, or a criteria threshold is invalid.
    pub fn validate(&self) -> Result<(), CampaignError> {
        if self.end <= self.start {
            return Err(CampaignError::WindowOrder {
                start: self.start,
                end: self.end,
            });
        }

        if self.max_qualifiers == Some(0) {
            return Err(CampaignError::ZeroCapacity);
        }

        self.criteria.validate()?;

        Ok(())
    }

    /// Whether the batch check loop should evaluate this campaign.
    #[must_use]
    pub fn open_for_evaluation(&self) -> bool {
        self.status == CampaignStatus::Active && self.visible
    }

    /// Whether the qualifier capacity has been reached.
    #[must_use]
    pub fn capacity_exhausted(&self) -> bool {
        self.max_qualifiers
            .is_some_and(|max| self.current_qualifiers >= max)
    }
}

#[cfg(test)]
mod tests {
    use testresult::TestResult;

    use super::*;

    fn campaign(start: &str, end: &str) -> TestResult<Campaign> {
        Ok(Campaign {
            name: "Spring Sprint".to_string(),
            description: None,
            window_mode: WindowMode::FixedDates,
            start: start.parse()?,
            end: end.parse()?,
            relative_days: None,
            criteria: CriteriaSet {
                sales_volume: Some(Decimal::from(100_000)),
                ..CriteriaSet::default()
            },
            reward: RewardSpec::Fixed {
                amount: Decimal::from(500),
            },
            max_qualifiers: None,
            status: CampaignStatus::Active,
            visible: true,
            current_qualifiers: 0,
            total_paid_out: Decimal::ZERO,
        })
    }

    #[test]
    fn valid_campaign_passes_validation() -> TestResult {
        let campaign = campaign("2026-03-01T00:00:00Z", "2026-06-01T00:00:00Z")?;

        campaign.validate()?;

        Ok(())
    }

    #[test]
    fn window_must_end_after_it_starts() -> TestResult {
        let campaign = campaign("2026-06-01T00:00:00Z", "2026-03-01T00:00:00Z")?;

        assert!(matches!(
            campaign.validate(),
            Err(CampaignError::WindowOrder { .. })
        ));

        let degenerate = campaign_with_equal_dates()?;

        assert!(matches!(
            degenerate.validate(),
            Err(CampaignError::WindowOrder { .. })
        ));

        Ok(())
    }

    fn campaign_with_equal_dates() -> TestResult<Campaign> {
        campaign("2026-03-01T00:00:00Z", "2026-03-01T00:00:00Z")
    }

    #[test]
    fn zero_capacity_is_rejected() -> TestResult {
        let mut campaign = campaign("2026-03-01T00:00:00Z", "2026-06-01T00:00:00Z")?;
        campaign.max_qualifiers = Some(0);

        assert!(matches!(
            campaign.validate(),
            Err(CampaignError::ZeroCapacity)
        ));

        Ok(())
    }

    #[test]
    fn capacity_exhaustion_compares_counters() -> TestResult {
        let mut campaign = campaign("2026-03-01T00:00:00Z", "2026-06-01T00:00:00Z")?;

        assert!(!campaign.capacity_exhausted(), "no capacity set");

        campaign.max_qualifiers = Some(5);
        campaign.current_qualifiers = 4;

        assert!(!campaign.capacity_exhausted(), "below capacity");

        campaign.current_qualifiers = 5;

        assert!(campaign.capacity_exhausted(), "at capacity");

        Ok(())
    }

    #[test]
    fn invisible_or_inactive_campaigns_are_closed_for_evaluation() -> TestResult {
        let mut campaign = campaign("2026-03-01T00:00:00Z", "2026-06-01T00:00:00Z")?;

        assert!(campaign.open_for_evaluation(), "active and visible");

        campaign.visible = false;

        assert!(!campaign.open_for_evaluation(), "invisible");

        campaign.visible = true;
        campaign.status = CampaignStatus::Expired;

        assert!(!campaign.open_for_evaluation(), "expired");

        Ok(())
    }

    #[test]
    fn campaign_deserializes_from_yaml_with_defaults() -> TestResult {
        let yaml = r#"
name: Founders Dash
window_mode: FIXED_DATES
start: 2026-01-01T00:00:00Z
end: 2026-02-01T00:00:00Z
criteria:
  direct_referrals: 3
reward:
  kind: FIXED
  amount: 500
"#;

        let campaign: Campaign = serde_norway::from_str(yaml)?;

        assert_eq!(campaign.status, CampaignStatus::Draft);
        assert!(campaign.visible, "visible by default");
        assert_eq!(campaign.current_qualifiers, 0);
        assert_eq!(campaign.criteria.direct_referrals, Some(3));

        Ok(())
    }
}
