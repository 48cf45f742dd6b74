//! Fixtures
//!
//! YAML-defined campaign sets plus in-memory implementations of every
//! collaborator contract, for tests, demos and local experiments.

use std::{fs, path::PathBuf};

use thiserror::Error;

use crate::{
    campaigns::{Campaign, CampaignError},
    directory::UserId,
};

pub mod ledger;
pub mod network;

pub use ledger::{
    FixedClock, InMemoryLedger, InMemoryRewardLedger, InMemoryWallet, RecordingNotifier,
    RewardEntry, TransactionStatus, WalletCredit,
};
pub use network::InMemoryNetwork;

/// Fixture parsing and construction errors.
#[derive(Debug, Error)]
pub enum FixtureError {
    /// IO error reading fixture files.
    #[error("failed to read fixture file: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error.
    #[error("failed to parse YAML: {0}")]
    Yaml(#[from] serde_norway::Error),

    /// A loaded campaign failed validation.
    #[error(transparent)]
    Campaign(#[from] CampaignError),

    /// A user id referenced someone the network does not contain.
    #[error("unknown user {0}")]
    UnknownUser(UserId),

    /// A user id was added twice.
    #[error("duplicate user {0}")]
    DuplicateUser(UserId),
}

#[derive(Debug, serde::Deserialize)]
struct CampaignsFile {
    campaigns: Vec<Campaign>,
}

/// Loader for named campaign fixture sets.
#[derive(Debug)]
pub struct Fixture {
    base_path: PathBuf,
}

impl Fixture {
    /// Create a loader with the default base path.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base_path("./fixtures")
    }

    /// Create a loader with a custom base path.
    pub fn with_base_path(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    /// Load and validate the campaign set `name`.
    ///
    /// Reads `{base_path}/campaigns/{name}.yml`. Unknown criteria keys and
    /// malformed windows are rejected, not ignored.
    ///
    /// # Errors
    ///
    /// Returns a [`FixtureError`] if the file cannot be read or parsed, or
    /// if any campaign in it fails validation.
    pub fn load_campaigns(&self, name: &str) -> Result<Vec<Campaign>, FixtureError> {
        let file_path = self.base_path.join("campaigns").join(format!("{name}.yml"));
        let contents = fs::read_to_string(&file_path)?;
        let file: CampaignsFile = serde_norway::from_str(&contents)?;

        for campaign in &file.campaigns {
            campaign.validate()?;
        }

        Ok(file.campaigns)
    }
}

impl Default for Fixture {
    fn default() -> Self {
        Self::new()
    }
}
