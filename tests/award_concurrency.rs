//! Concurrent triggers racing the grant protocol: the reward must be
//! granted at most once no matter how the race resolves.

use std::sync::{Arc, Barrier};

use rust_decimal::Decimal;
use testresult::TestResult;

use laurel::{
    fixtures::{FixedClock, InMemoryLedger, InMemoryNetwork, InMemoryRewardLedger, InMemoryWallet},
    prelude::*,
};

const NOW: &str = "2026-03-15T12:00:00Z";
const IN_WINDOW: &str = "2026-03-10T00:00:00Z";

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Missing(&'static str);

/// Wallet that parks every credit between two rendezvous points, holding
/// the grant unit open so another evaluation can race it.
struct GatedWallet {
    entered: Barrier,
    release: Barrier,
    inner: InMemoryWallet,
}

impl Wallet for GatedWallet {
    fn credit(
        &self,
        user: UserId,
        amount: Decimal,
        kind: RewardKind,
    ) -> Result<(), CollaboratorError> {
        self.entered.wait();
        self.release.wait();
        self.inner.credit(user, amount, kind)
    }
}

fn sales_campaign(threshold: u64) -> TestResult<Campaign> {
    Ok(Campaign {
        name: "Race Sprint".to_string(),
        description: None,
        window_mode: WindowMode::FixedDates,
        start: "2026-03-01T00:00:00Z".parse()?,
        end: "2026-06-01T00:00:00Z".parse()?,
        relative_days: None,
        criteria: CriteriaSet {
            sales_volume: Some(Decimal::from(threshold)),
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
fn racing_evaluations_grant_exactly_once() -> TestResult {
    let network = Arc::new(InMemoryNetwork::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let wallet = Arc::new(InMemoryWallet::new());
    let rewards = Arc::new(InMemoryRewardLedger::new());
    let clock = Arc::new(FixedClock::new(NOW.parse()?));

    let engine = QualificationEngine::builder(
        network.clone(),
        ledger.clone(),
        wallet.clone(),
        rewards.clone(),
    )
    .clock(clock)
    .build();

    let user = UserId(1);

    network.add_user(user, "2026-01-01T00:00:00Z".parse()?, None)?;
    ledger.push(user, Decimal::from(10_000), IN_WINDOW.parse()?);

    let key = engine.add_campaign(sales_campaign(1_000)?)?;

    // Simulate an investment trigger, a referral trigger and a manual
    // refresh all landing at once.
    let awarded = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    matches!(
                        engine.evaluate_campaign(user, key),
                        Ok(Evaluation::Awarded { .. })
                    )
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(false))
            .filter(|&awarded| awarded)
            .count()
    });

    assert_eq!(awarded, 1, "exactly one racer wins the grant");
    assert_eq!(wallet.credit_count(user), 1);
    assert_eq!(wallet.balance(user), Decimal::from(500));
    assert_eq!(rewards.active_entries(user).len(), 1);

    let campaign = engine.campaign(key).ok_or(Missing("campaign should exist"))?;

    assert_eq!(campaign.current_qualifiers, 1);
    assert_eq!(campaign.total_paid_out, Decimal::from(500));

    let record = engine.record(key, user).ok_or(Missing("record should exist"))?;

    assert_eq!(record.status, QualificationStatus::Awarded);

    Ok(())
}

#[test]
fn racing_batch_checks_grant_exactly_once_per_campaign() -> TestResult {
    let network = Arc::new(InMemoryNetwork::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let wallet = Arc::new(InMemoryWallet::new());
    let rewards = Arc::new(InMemoryRewardLedger::new());
    let clock = Arc::new(FixedClock::new(NOW.parse()?));

    let engine = QualificationEngine::builder(
        network.clone(),
        ledger.clone(),
        wallet.clone(),
        rewards.clone(),
    )
    .clock(clock)
    .build();

    let user = UserId(1);

    network.add_user(user, "2026-01-01T00:00:00Z".parse()?, None)?;
    ledger.push(user, Decimal::from(10_000), IN_WINDOW.parse()?);

    engine.add_campaign(sales_campaign(1_000)?)?;
    engine.add_campaign(sales_campaign(5_000)?)?;

    let total_qualified: u32 = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    engine
                        .check_and_update_qualification(user, Trigger::ManualRefresh)
                        .qualified
                })
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap_or(0))
            .sum()
    });

    assert_eq!(total_qualified, 2, "one grant per campaign across all racers");
    assert_eq!(wallet.credit_count(user), 2);
    assert_eq!(rewards.active_entries(user).len(), 2);

    Ok(())
}

#[test]
fn capacity_holds_while_a_grant_is_in_flight() -> TestResult {
    let network = Arc::new(InMemoryNetwork::new());
    let ledger = Arc::new(InMemoryLedger::new());
    let wallet = Arc::new(GatedWallet {
        entered: Barrier::new(2),
        release: Barrier::new(2),
        inner: InMemoryWallet::new(),
    });
    let rewards = Arc::new(InMemoryRewardLedger::new());
    let clock = Arc::new(FixedClock::new(NOW.parse()?));

    let engine = QualificationEngine::builder(
        network.clone(),
        ledger.clone(),
        wallet.clone(),
        rewards.clone(),
    )
    .clock(clock)
    .build();

    for id in 1..=2 {
        network.add_user(UserId(id), "2026-01-01T00:00:00Z".parse()?, None)?;
        ledger.push(UserId(id), Decimal::from(10_000), IN_WINDOW.parse()?);
    }

    let mut capped = sales_campaign(1_000)?;
    capped.max_qualifiers = Some(1);

    let key = engine.add_campaign(capped)?;

    // The first user's grant claims the only slot and then parks inside
    // the wallet call; the second user is evaluated while that grant is
    // still in flight.
    let (winner_awarded, second) = std::thread::scope(|scope| {
        let handle = scope.spawn(|| {
            matches!(
                engine.evaluate_campaign(UserId(1), key),
                Ok(Evaluation::Awarded { .. })
            )
        });

        wallet.entered.wait();
        let second = engine.evaluate_campaign(UserId(2), key);
        wallet.release.wait();

        (handle.join().unwrap_or(false), second)
    });

    assert!(winner_awarded, "the in-flight grant completes normally");
    assert_eq!(second?, Evaluation::Disqualified);

    let campaign = engine.campaign(key).ok_or(Missing("campaign should exist"))?;

    assert_eq!(campaign.current_qualifiers, 1, "capacity never overshoots");
    assert_eq!(campaign.total_paid_out, Decimal::from(500));

    let overflow = engine
        .record(key, UserId(2))
        .ok_or(Missing("record should exist"))?;

    assert_eq!(overflow.status, QualificationStatus::Disqualified);
    assert_eq!(
        overflow.notes.as_deref(),
        Some("maximum qualifiers limit reached")
    );
    assert_eq!(wallet.inner.credit_count(UserId(2)), 0);
    assert!(rewards.active_entries(UserId(2)).is_empty());
    assert_eq!(wallet.inner.balance(UserId(1)), Decimal::from(500));

    Ok(())
}
