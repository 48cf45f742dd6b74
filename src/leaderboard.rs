//! Leaderboard ranking
//!
//! Orders qualification records by a composite score for display and
//! tie-break. The weights and the referral scaling constant are fixed
//! policy, not configuration.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use decimal_percentage::Percentage;
use rust_decimal::Decimal;
use tabled::{Table, Tabled};

use crate::{
    directory::UserId,
    progress::ProgressSnapshot,
    qualification::{QualificationRecord, QualificationStatus},
};

/// Each direct referral is worth this much raw score before weighting.
const REFERRAL_SCALE: u32 = 100_000;

/// Composite leaderboard score for a snapshot.
///
/// `0.4 × sales volume + 0.3 × (direct referrals × 100 000) + 0.3 × team
/// volume`.
#[must_use]
pub fn score(snapshot: &ProgressSnapshot) -> Decimal {
    let sales = Percentage::from(0.4) * snapshot.sales_volume;
    let referrals = Percentage::from(0.3)
        * (Decimal::from(snapshot.direct_referrals) * Decimal::from(REFERRAL_SCALE));
    let team = Percentage::from(0.3) * snapshot.team_volume;

    sales + referrals + team
}

/// One ranked row of a campaign leaderboard.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub position: usize,

    /// Ranked user.
    pub user: UserId,

    /// The record's status at query time.
    pub status: QualificationStatus,

    /// Overall progress percentage from the last snapshot.
    pub overall_progress: Decimal,

    /// Composite score the ordering is based on.
    pub score: Decimal,

    /// When the user qualified, if they have.
    pub qualified_at: Option<DateTime<Utc>>,

    /// Granted reward amount, if awarded.
    pub reward_amount: Option<Decimal>,
}

/// Deterministic leaderboard ordering.
///
/// Descending score; ties broken by earlier qualification, then earlier
/// first activity, then user id, so repeated queries always agree.
fn compare(a: &QualificationRecord, b: &QualificationRecord) -> Ordering {
    b.leaderboard_score
        .cmp(&a.leaderboard_score)
        .then_with(|| match (a.qualified_at, b.qualified_at) {
            (Some(left), Some(right)) => left.cmp(&right),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.first_activity_at.cmp(&b.first_activity_at))
        .then_with(|| a.user.cmp(&b.user))
}

/// Rank `records` and keep the top `limit`.
#[must_use]
pub fn rank<'a, I>(records: I, limit: usize) -> Vec<LeaderboardEntry>
where
    I: IntoIterator<Item = &'a QualificationRecord>,
{
    let mut records: Vec<&QualificationRecord> = records.into_iter().collect();

    records.sort_by(|a, b| compare(a, b));

    records
        .into_iter()
        .take(limit)
        .enumerate()
        .map(|(idx, record)| LeaderboardEntry {
            position: idx + 1,
            user: record.user,
            status: record.status,
            overall_progress: record.snapshot.overall_progress,
            score: record.leaderboard_score,
            qualified_at: record.qualified_at,
            reward_amount: record.reward_amount,
        })
        .collect()
}

/// A user's position: one more than the number of records with a strictly
/// greater score. Users without a record have no position.
#[must_use]
pub fn position<'a, I>(records: I, user: UserId) -> Option<usize>
where
    I: IntoIterator<Item = &'a QualificationRecord>,
{
    let mut greater = 0_usize;
    let mut found = false;

    let mut own_score = Decimal::ZERO;
    let mut candidates: Vec<&QualificationRecord> = Vec::new();

    for record in records {
        if record.user == user {
            own_score = record.leaderboard_score;
            found = true;
        } else {
            candidates.push(record);
        }
    }

    if !found {
        return None;
    }

    for record in candidates {
        if record.leaderboard_score > own_score {
            greater += 1;
        }
    }

    Some(greater + 1)
}

#[derive(Tabled)]
struct LeaderboardRow {
    #[tabled(rename = "#")]
    position: usize,
    user: String,
    status: String,
    #[tabled(rename = "progress %")]
    progress: String,
    score: String,
}

/// Render ranked entries as a text table.
#[must_use]
pub fn render(entries: &[LeaderboardEntry]) -> String {
    let rows = entries.iter().map(|entry| LeaderboardRow {
        position: entry.position,
        user: entry.user.to_string(),
        status: entry.status.to_string(),
        progress: entry.overall_progress.round_dp(2).to_string(),
        score: entry.score.round_dp(2).to_string(),
    });

    Table::new(rows).to_string()
}
