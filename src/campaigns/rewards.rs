//! Reward specifications
//!
//! Pure mapping from a campaign's reward configuration and its running
//! counters to a concrete payable amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The kind of reward a campaign pays, without its configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardKind {
    /// Fixed cash amount.
    Fixed,
    /// Configured cash amount with campaign-defined percentage semantics.
    Percentage,
    /// Equal share of a fixed pool.
    PoolShare,
    /// Non-cash item.
    Item,
}

/// Reward configuration of a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RewardSpec {
    /// Fixed cash amount, unconditional.
    Fixed {
        /// Amount paid to every qualifier.
        amount: Decimal,
    },

    /// A configured cash amount.
    ///
    /// The percentage semantics are campaign-defined and opaque here: the
    /// configured amount is treated as already resolved, not recomputed
    /// from sales.
    Percentage {
        /// Resolved amount paid to every qualifier.
        amount: Decimal,
    },

    /// Equal share of a fixed pool.
    ///
    /// The per-person share is an estimate while the qualifier count is
    /// still growing; already-awarded members are never rebalanced.
    PoolShare {
        /// Total pool to divide among qualifiers.
        pool_total: Decimal,
    },

    /// Non-cash reward; resolves to a zero amount and no wallet credit.
    Item {
        /// What the qualifier receives.
        description: String,
    },
}

impl RewardSpec {
    /// The kind of this reward.
    #[must_use]
    pub fn kind(&self) -> RewardKind {
        match self {
            Self::Fixed { .. } => RewardKind::Fixed,
            Self::Percentage { .. } => RewardKind::Percentage,
            Self::PoolShare { .. } => RewardKind::PoolShare,
            Self::Item { .. } => RewardKind::Item,
        }
    }

    /// Whether a granted reward credits the user's wallet.
    #[must_use]
    pub fn is_cash(&self) -> bool {
        !matches!(self, Self::Item { .. })
    }

    /// Resolve the payable amount given the campaign's current counters.
    ///
    /// For pool shares, `estimated_qualifiers` is `max_qualifiers` when a
    /// capacity is set, otherwise `current_qualifiers + 1` — i.e. assume
    /// the current grant is the last one.
    #[must_use]
    pub fn amount_for(&self, current_qualifiers: u32, max_qualifiers: Option<u32>) -> Decimal {
        match self {
            Self::Fixed { amount } | Self::Percentage { amount } => *amount,
            Self::PoolShare { pool_total } => {
                let estimated = max_qualifiers.unwrap_or(current_qualifiers + 1);

                if estimated == 0 {
                    return Decimal::ZERO;
                }

                pool_total / Decimal::from(estimated)
            }
            Self::Item { .. } => Decimal::ZERO,
        }
    }
}
