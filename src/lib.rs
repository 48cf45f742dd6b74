//! Laurel
//!
//! Laurel is a campaign qualification and reward engine for
//! referral-driven platforms: time-boxed incentive campaigns, multi-metric
//! qualification criteria over a referral graph, an at-most-once reward
//! grant protocol and deterministic leaderboards.

pub mod campaigns;
pub mod clock;
pub mod directory;
pub mod engine;
pub mod fixtures;
pub mod leaderboard;
pub mod ledger;
pub mod prelude;
pub mod progress;
pub mod qualification;
pub mod window;
