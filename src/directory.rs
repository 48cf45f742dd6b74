//! Referral directory
//!
//! Collaborator contract for the referral network: who a user directly
//! recruited, and the profile attributes the engine reads (join instant,
//! rank, club, account status).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a user in the referral network.
///
/// Users are owned by the external directory; the engine only ever holds
/// their ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user:{}", self.0)
    }
}

/// Achievement rank hierarchy, lowest to highest.
///
/// Variant order defines the ordinal comparison used by rank criteria.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Rank {
    /// Entry rank for every new member.
    Starter,
    /// Bronze rank.
    Bronze,
    /// Silver rank.
    Silver,
    /// Gold rank.
    Gold,
    /// Platinum rank.
    Platinum,
    /// Diamond rank.
    Diamond,
    /// Crown, the highest rank.
    Crown,
}

/// Club membership hierarchy, lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Club {
    /// No club membership.
    None,
    /// Silver club.
    Silver,
    /// Gold club.
    Gold,
    /// Diamond club.
    Diamond,
}

/// Account status as reported by the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserStatus {
    /// Account in good standing.
    Active,
    /// Dormant account; still counts towards referral metrics.
    Inactive,
    /// Terminally blocked account, excluded from referral counts.
    Blocked,
}

/// The profile attributes the engine reads for a user.
#[derive(Debug, Clone)]
pub struct UserProfile {
    /// Instant the user joined the network.
    pub joined_at: DateTime<Utc>,

    /// Current achievement rank, if any has been assigned.
    pub rank: Option<Rank>,

    /// Current club membership, if any has been assigned.
    pub club: Option<Club>,

    /// The user who recruited this one, if any.
    pub referred_by: Option<UserId>,

    /// Account status.
    pub status: UserStatus,
}

/// Read-only access to the referral network.
///
/// Implementations are expected to be cheap to query; the downline walk
/// calls [`direct_children`](ReferralDirectory::direct_children) once per
/// visited user.
pub trait ReferralDirectory {
    /// Users directly recruited by `user`.
    fn direct_children(&self, user: UserId) -> Vec<UserId>;

    /// Profile for `user`, or `None` if the directory does not know them.
    fn profile(&self, user: UserId) -> Option<UserProfile>;
}
