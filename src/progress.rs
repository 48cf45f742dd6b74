//! Downline progress
//!
//! Walks the referral graph from a user, bounded by a depth cap,
//! aggregating qualifying volumes from the transaction ledger into the
//! per-user progress snapshot for a campaign. Only criteria the campaign
//! actually configures are computed.

use std::collections::VecDeque;

use rust_decimal::Decimal;
use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use crate::{
    campaigns::Campaign,
    directory::{Club, Rank, ReferralDirectory, UserId, UserStatus},
    ledger::TransactionLedger,
    window::QualificationWindow,
};

/// Default hard cap on downline traversal depth.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Qualifying volume of the subtree rooted at one direct referral.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegVolume {
    /// The direct referral the leg is rooted at.
    pub user: UserId,

    /// The leg's own volume plus its entire (depth-capped) downline's.
    pub volume: Decimal,
}

/// The metrics a user has accumulated towards one campaign.
///
/// Recomputed on demand; only persisted as part of the qualification
/// record that owns it. Metrics for criteria the campaign does not
/// configure stay at their zero defaults.
#[derive(Debug, Clone, Default)]
pub struct ProgressSnapshot {
    /// Personal qualifying sales volume inside the window.
    pub sales_volume: Decimal,

    /// Direct referrals who joined inside the window, excluding blocked accounts.
    pub direct_referrals: u32,

    /// Qualifying volume across the depth-capped downline.
    pub team_volume: Decimal,

    /// Per-leg volumes, strongest first.
    pub leg_volumes: SmallVec<[LegVolume; 4]>,

    /// Qualifying bookings inside the window.
    pub booking_count: u32,

    /// The user's rank at computation time.
    pub current_rank: Option<Rank>,

    /// The user's club at computation time.
    pub current_club: Option<Club>,

    /// Percentage of the sales-volume requirement met, capped at 100.
    pub sales_progress: Decimal,

    /// Percentage of the direct-referral requirement met, capped at 100.
    pub referral_progress: Decimal,

    /// Percentage of the team-volume requirement met, capped at 100.
    pub team_volume_progress: Decimal,

    /// Arithmetic mean of the non-zero percentage metrics.
    pub overall_progress: Decimal,
}

/// Percentage of `required` reached by `current`, capped at 100.
fn percent_towards(current: Decimal, required: Decimal) -> Decimal {
    if required <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    (current * Decimal::ONE_HUNDRED / required).min(Decimal::ONE_HUNDRED)
}

/// Computes progress snapshots from the referral directory and the
/// transaction ledger.
pub struct ProgressCalculator<'a> {
    directory: &'a dyn ReferralDirectory,
    ledger: &'a dyn TransactionLedger,
    max_depth: usize,
}

impl std::fmt::Debug for ProgressCalculator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressCalculator")
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

impl<'a> ProgressCalculator<'a> {
    /// Create a calculator with the default depth cap.
    #[must_use]
    pub fn new(directory: &'a dyn ReferralDirectory, ledger: &'a dyn TransactionLedger) -> Self {
        Self {
            directory,
            ledger,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Override the traversal depth cap.
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Every user below `user`, breadth-first, bounded by the depth cap.
    ///
    /// A visited set guards against malformed graphs (cycles, duplicate
    /// parentage); the cap silently truncates deeper levels, so volumes
    /// computed from the result are a lower bound, never an error.
    #[must_use]
    pub fn downline(&self, user: UserId) -> Vec<UserId> {
        let mut downline = Vec::new();
        let mut visited = FxHashSet::default();
        let mut queue = VecDeque::new();

        visited.insert(user);
        queue.push_back((user, 0_usize));

        while let Some((current, depth)) = queue.pop_front() {
            if depth >= self.max_depth {
                continue;
            }

            for child in self.directory.direct_children(current) {
                if visited.insert(child) {
                    downline.push(child);
                    queue.push_back((child, depth + 1));
                }
            }
        }

        downline
    }

    /// Qualifying volume of `root` itself plus its entire downline.
    fn subtree_volume(&self, root: UserId, window: &QualificationWindow) -> Decimal {
        let mut members = self.downline(root);
        members.push(root);

        self.ledger.sum_qualifying(&members, window)
    }

    /// Compute the progress snapshot for `user` against `campaign`.
    ///
    /// Criteria the campaign does not configure are skipped entirely to
    /// avoid needless ledger traffic.
    #[must_use]
    pub fn snapshot(
        &self,
        user: UserId,
        campaign: &Campaign,
        window: &QualificationWindow,
    ) -> ProgressSnapshot {
        let criteria = &campaign.criteria;
        let mut snapshot = ProgressSnapshot::default();

        if let Some(profile) = self.directory.profile(user) {
            snapshot.current_rank = profile.rank;
            snapshot.current_club = profile.club;
        }

        if let Some(required) = criteria.sales_volume {
            snapshot.sales_volume = self.ledger.sum_qualifying(&[user], window);
            snapshot.sales_progress = percent_towards(snapshot.sales_volume, required);
        }

        if let Some(required) = criteria.direct_referrals {
            snapshot.direct_referrals = self
                .directory
                .direct_children(user)
                .into_iter()
                .filter_map(|child| self.directory.profile(child))
                .filter(|profile| {
                    profile.status != UserStatus::Blocked && window.contains(profile.joined_at)
                })
                .count()
                .try_into()
                .unwrap_or(u32::MAX);

            snapshot.referral_progress = percent_towards(
                Decimal::from(snapshot.direct_referrals),
                Decimal::from(required),
            );
        }

        if let Some(required) = criteria.team_volume {
            let downline = self.downline(user);
            snapshot.team_volume = self.ledger.sum_qualifying(&downline, window);
            snapshot.team_volume_progress = percent_towards(snapshot.team_volume, required);
        }

        if criteria.group_ratio.is_some() {
            let mut legs: SmallVec<[LegVolume; 4]> = self
                .directory
                .direct_children(user)
                .into_iter()
                .map(|child| LegVolume {
                    user: child,
                    volume: self.subtree_volume(child, window),
                })
                .collect();

            legs.sort_by(|a, b| b.volume.cmp(&a.volume).then(a.user.cmp(&b.user)));
            snapshot.leg_volumes = legs;
        }

        if criteria.booking_count.is_some() {
            snapshot.booking_count = self.ledger.count_qualifying(user, window);
        }

        let triggered: SmallVec<[Decimal; 3]> = [
            snapshot.sales_progress,
            snapshot.referral_progress,
            snapshot.team_volume_progress,
        ]
        .into_iter()
        .filter(|percent| *percent > Decimal::ZERO)
        .collect();

        if !triggered.is_empty() {
            snapshot.overall_progress =
                triggered.iter().copied().sum::<Decimal>() / Decimal::from(triggered.len() as u64);
        }

        snapshot
    }
}
