//! Qualification criteria
//!
//! A campaign configures a sparse set of optional thresholds; the
//! evaluator is a pure predicate over a progress snapshot. An empty set is
//! unconfigured and can never be satisfied. Unknown criteria keys are
//! rejected at deserialization time rather than silently ignored.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::{
    directory::{Club, Rank},
    progress::{LegVolume, ProgressSnapshot},
};

/// Errors raised when validating a criteria set.
#[derive(Debug, Error)]
pub enum CriteriaError {
    /// A numeric threshold was zero or negative.
    #[error("criterion `{criterion}` must have a strictly positive threshold")]
    NonPositiveThreshold {
        /// Name of the offending criterion.
        criterion: &'static str,
    },
}

/// Required volume split across a user's top three legs, in percent.
///
/// The classic configuration is 40:40:20. Each of the top three legs'
/// share of their combined volume must reach the required percentage,
/// minus a fixed five-point tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct GroupRatio {
    /// Required share of the strongest leg, in percent.
    pub leg1: Decimal,

    /// Required share of the second leg, in percent.
    pub leg2: Decimal,

    /// Required share of the third leg, in percent.
    pub leg3: Decimal,
}

impl Default for GroupRatio {
    fn default() -> Self {
        Self {
            leg1: Decimal::from(40),
            leg2: Decimal::from(40),
            leg3: Decimal::from(20),
        }
    }
}

/// Fixed tolerance subtracted from each required leg share, in percentage points.
fn ratio_tolerance() -> Decimal {
    Decimal::from(5)
}

impl GroupRatio {
    /// Whether the given descending leg volumes satisfy this ratio.
    ///
    /// Fewer than three legs, or three legs with no volume, automatically
    /// fail.
    #[must_use]
    pub fn met_by(&self, legs: &[LegVolume]) -> bool {
        let top: SmallVec<[Decimal; 3]> = legs.iter().take(3).map(|leg| leg.volume).collect();

        if top.len() < 3 {
            return false;
        }

        let total: Decimal = top.iter().copied().sum();

        if total <= Decimal::ZERO {
            return false;
        }

        let tolerance = ratio_tolerance();

        top.iter()
            .zip([self.leg1, self.leg2, self.leg3])
            .all(|(volume, required)| {
                volume * Decimal::ONE_HUNDRED / total >= required - tolerance
            })
    }
}

/// Sparse set of qualification thresholds.
///
/// Absent criteria are not evaluated and not computed by the progress
/// calculator. All present criteria must pass (logical AND); a snapshot
/// missing a value a criterion needs (e.g. no rank recorded) fails that
/// criterion, never passes it vacuously.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CriteriaSet {
    /// Minimum personal qualifying sales volume inside the window.
    pub sales_volume: Option<Decimal>,

    /// Minimum count of direct referrals who joined inside the window.
    pub direct_referrals: Option<u32>,

    /// Minimum qualifying volume across the depth-capped downline.
    pub team_volume: Option<Decimal>,

    /// Required volume split across the top three legs.
    pub group_ratio: Option<GroupRatio>,

    /// Minimum achievement rank.
    pub min_rank: Option<Rank>,

    /// Minimum club membership.
    pub min_club: Option<Club>,

    /// Minimum count of qualifying bookings inside the window.
    pub booking_count: Option<u32>,
}

impl CriteriaSet {
    /// Whether no criterion is configured at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sales_volume.is_none()
            && self.direct_referrals.is_none()
            && self.team_volume.is_none()
            && self.group_ratio.is_none()
            && self.min_rank.is_none()
            && self.min_club.is_none()
            && self.booking_count.is_none()
    }

    /// Validate threshold values.
    ///
    /// # Errors
    ///
    /// Returns [`CriteriaError::NonPositiveThreshold`] if any configured
    /// numeric threshold is zero or negative.
    pub fn validate(&self) -> Result<(), CriteriaError> {
        if self.sales_volume.is_some_and(|v| v <= Decimal::ZERO) {
            return Err(CriteriaError::NonPositiveThreshold {
                criterion: "sales_volume",
            });
        }

        if self.direct_referrals.is_some_and(|v| v == 0) {
            return Err(CriteriaError::NonPositiveThreshold {
                criterion: "direct_referrals",
            });
        }

        if self.team_volume.is_some_and(|v| v <= Decimal::ZERO) {
            return Err(CriteriaError::NonPositiveThreshold {
                criterion: "team_volume",
            });
        }

        if let Some(ratio) = self.group_ratio
            && (ratio.leg1 <= Decimal::ZERO
                || ratio.leg2 <= Decimal::ZERO
                || ratio.leg3 <= Decimal::ZERO)
        {
            return Err(CriteriaError::NonPositiveThreshold {
                criterion: "group_ratio",
            });
        }

        if self.booking_count.is_some_and(|v| v == 0) {
            return Err(CriteriaError::NonPositiveThreshold {
                criterion: "booking_count",
            });
        }

        Ok(())
    }

    /// Evaluate the snapshot against every configured criterion.
    ///
    /// An empty criteria set is unconfigured, not "always true", and never
    /// passes.
    #[must_use]
    pub fn met_by(&self, snapshot: &ProgressSnapshot) -> bool {
        if self.is_empty() {
            return false;
        }

        if self
            .sales_volume
            .is_some_and(|required| snapshot.sales_volume < required)
        {
            return false;
        }

        if self
            .direct_referrals
            .is_some_and(|required| snapshot.direct_referrals < required)
        {
            return false;
        }

        if self
            .team_volume
            .is_some_and(|required| snapshot.team_volume < required)
        {
            return false;
        }

        if let Some(ratio) = &self.group_ratio
            && !ratio.met_by(&snapshot.leg_volumes)
        {
            return false;
        }

        if let Some(required) = self.min_rank {
            match snapshot.current_rank {
                Some(rank) if rank >= required => {}
                _ => return false,
            }
        }

        if let Some(required) = self.min_club {
            match snapshot.current_club {
                Some(club) if club >= required => {}
                _ => return false,
            }
        }

        if self
            .booking_count
            .is_some_and(|required| snapshot.booking_count < required)
        {
            return false;
        }

        true
    }
}
