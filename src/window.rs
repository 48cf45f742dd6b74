//! Eligibility windows
//!
//! Resolves the half-open `[start, end)` instant range over which a
//! campaign's metrics are measured for a given user.

use chrono::{DateTime, Duration, Utc};

use crate::{
    campaigns::{Campaign, WindowMode},
    directory::UserProfile,
};

/// Window length, in days, for join-anchored campaigns with no explicit length.
pub const DEFAULT_RELATIVE_DAYS: i64 = 60;

/// The half-open instant range `[start, end)` a user is measured over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualificationWindow {
    /// Inclusive start.
    pub start: DateTime<Utc>,

    /// Exclusive end.
    pub end: DateTime<Utc>,
}

impl QualificationWindow {
    /// Resolve the window for `campaign` and an optional user profile.
    ///
    /// Fixed-date campaigns return their own start and end unmodified.
    /// Join-anchored campaigns measure from the user's join instant for
    /// `relative_days` days (default 60); when the profile is unavailable
    /// they fall back to the campaign dates. There are no error
    /// conditions.
    #[must_use]
    pub fn resolve(campaign: &Campaign, profile: Option<&UserProfile>) -> Self {
        match (campaign.window_mode, profile) {
            (WindowMode::FromJoinDate, Some(profile)) => {
                let days = campaign.relative_days.unwrap_or(DEFAULT_RELATIVE_DAYS);

                Self {
                    start: profile.joined_at,
                    end: profile.joined_at + Duration::days(days),
                }
            }
            (WindowMode::FixedDates | WindowMode::FromJoinDate, _) => Self {
                start: campaign.start,
                end: campaign.end,
            },
        }
    }

    /// Whether `instant` falls inside the window.
    #[must_use]
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}
