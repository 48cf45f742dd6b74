//! Campaign lifecycle scheduling
//!
//! Promotes campaigns between statuses from wall-clock time, at date
//! precision: `Upcoming` becomes `Active` once the start date is reached,
//! `Active` becomes `Expired` once the end date has passed. Re-running
//! with the same clock has no observable effect.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::campaigns::{Campaign, CampaignStatus};

/// Outcome of one scheduler pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusRoll {
    /// Campaigns promoted `Upcoming` to `Active`.
    pub activated: u32,

    /// Campaigns demoted `Active` to `Expired`.
    pub expired: u32,
}

/// Roll campaign statuses forward against `now`.
///
/// Draft campaigns are never touched; scheduling one is an explicit admin
/// action.
pub fn roll_statuses<'a, I>(campaigns: I, now: DateTime<Utc>) -> StatusRoll
where
    I: IntoIterator<Item = &'a mut Campaign>,
{
    let today = now.date_naive();
    let mut roll = StatusRoll::default();

    for campaign in campaigns {
        match campaign.status {
            CampaignStatus::Upcoming if campaign.start.date_naive() <= today => {
                campaign.status = CampaignStatus::Active;
                roll.activated += 1;

                info!(campaign = %campaign.name, "campaign activated");
            }
            CampaignStatus::Active if campaign.end.date_naive() < today => {
                campaign.status = CampaignStatus::Expired;
                roll.expired += 1;

                info!(campaign = %campaign.name, "campaign expired");
            }
            _ => {}
        }
    }

    roll
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use testresult::TestResult;

    use crate::campaigns::{WindowMode, criteria::CriteriaSet, rewards::RewardSpec};

    use super::*;

    fn campaign(status: CampaignStatus, start: &str, end: &str) -> TestResult<Campaign> {
        Ok(Campaign {
            name: "Roll Test".to_string(),
            description: None,
            window_mode: WindowMode::FixedDates,
            start: start.parse()?,
            end: end.parse()?,
            relative_days: None,
            criteria: CriteriaSet {
                sales_volume: Some(Decimal::from(1_000)),
                ..CriteriaSet::default()
            },
            reward: RewardSpec::Fixed {
                amount: Decimal::from(100),
            },
            max_qualifiers: None,
            status,
            visible: true,
            current_qualifiers: 0,
            total_paid_out: Decimal::ZERO,
        })
    }

    #[test]
    fn upcoming_activates_once_start_date_reached() -> TestResult {
        let mut upcoming = campaign(
            CampaignStatus::Upcoming,
            "2026-03-01T00:00:00Z",
            "2026-06-01T00:00:00Z",
        )?;

        let roll = roll_statuses([&mut upcoming], "2026-03-01T09:30:00Z".parse()?);

        assert_eq!(upcoming.status, CampaignStatus::Active);
        assert_eq!(roll, StatusRoll { activated: 1, expired: 0 });

        Ok(())
    }

    #[test]
    fn active_expires_only_after_end_date_has_passed() -> TestResult {
        let mut active = campaign(
            CampaignStatus::Active,
            "2026-03-01T00:00:00Z",
            "2026-06-01T00:00:00Z",
        )?;

        // End date itself still counts as open.
        let roll = roll_statuses([&mut active], "2026-06-01T23:00:00Z".parse()?);

        assert_eq!(active.status, CampaignStatus::Active);
        assert_eq!(roll, StatusRoll::default());

        let roll = roll_statuses([&mut active], "2026-06-02T00:00:00Z".parse()?);

        assert_eq!(active.status, CampaignStatus::Expired);
        assert_eq!(roll, StatusRoll { activated: 0, expired: 1 });

        Ok(())
    }

    #[test]
    fn rolling_is_idempotent() -> TestResult {
        let mut campaign = campaign(
            CampaignStatus::Upcoming,
            "2026-03-01T00:00:00Z",
            "2026-06-01T00:00:00Z",
        )?;

        let now = "2026-04-15T12:00:00Z".parse()?;

        let first = roll_statuses([&mut campaign], now);
        let second = roll_statuses([&mut campaign], now);

        assert_eq!(campaign.status, CampaignStatus::Active);
        assert_eq!(first, StatusRoll { activated: 1, expired: 0 });
        assert_eq!(second, StatusRoll::default());

        Ok(())
    }

    #[test]
    fn draft_campaigns_are_never_scheduled() -> TestResult {
        let mut draft = campaign(
            CampaignStatus::Draft,
            "2026-03-01T00:00:00Z",
            "2026-06-01T00:00:00Z",
        )?;

        let roll = roll_statuses([&mut draft], "2026-04-15T00:00:00Z".parse()?);

        assert_eq!(draft.status, CampaignStatus::Draft);
        assert_eq!(roll, StatusRoll::default());

        Ok(())
    }
}
