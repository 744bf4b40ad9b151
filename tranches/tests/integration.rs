//! Tranches pool end-to-end scenarios
//!
//! 1. Senior cap, posted results and principal settlement
//! 2. Time-weighted reward claims
//! 3. Atomic exit
//! 4. Reward administration and read surface
//! 5. Results posting window
//! 6. Custody conservation and 18-decimal balances

use epoch_core::{
    CustodyVault, EpochClock, FungibleAsset, LedgerError, ProtocolConfig, Role, RoleRegistry,
    Timestamp, TokenLedger, TranchesConfig, Vault, DEFAULT_EPOCH_DURATION, DEFAULT_JUNIOR_WINDOW,
};
use epoch_tranches::*;

const START: Timestamp = 1_000_000;
const POOL: &str = "tranches-pool";
const CUSTODY: &str = "custody";
const REWARDS: &str = "community-vault";
const ORACLE: &str = "oracle";
const DAO: &str = "dao";

type Pool = TranchesPool<TokenLedger, Vault, RoleRegistry>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tranches_config(rewards_per_epoch: u128) -> TranchesConfig {
    TranchesConfig {
        pool_address: POOL.to_string(),
        staked_asset: "USDC".to_string(),
        reward_asset: "REWARD".to_string(),
        reward_vault: REWARDS.to_string(),
        rewards_per_epoch,
        senior_ratio: 5,
    }
}

fn funded_ledger() -> TokenLedger {
    let mut ledger = TokenLedger::new();
    for user in ["alice", "bob", "carol", "dave"] {
        ledger.mint("USDC", user, 100_000).unwrap();
        ledger.approve("USDC", user, POOL, 100_000).unwrap();
    }
    ledger.mint("REWARD", REWARDS, 1_000_000).unwrap();
    ledger.approve("REWARD", REWARDS, POOL, 1_000_000).unwrap();
    ledger
}

fn roles() -> RoleRegistry {
    let mut roles = RoleRegistry::new();
    roles.grant(Role::ResultsPoster, ORACLE);
    roles.grant(Role::RewardsManager, DAO);
    roles
}

fn setup_with_clock(clock: EpochClock, rewards_per_epoch: u128) -> Pool {
    init_logging();
    TranchesPool::new(
        tranches_config(rewards_per_epoch),
        clock,
        funded_ledger(),
        Vault::new(CUSTODY),
        roles(),
    )
    .expect("pool construction")
}

/// Weekly epochs with a one-day junior window.
fn setup() -> Pool {
    setup_with_clock(
        EpochClock::new(START, DEFAULT_EPOCH_DURATION).with_junior_window(DEFAULT_JUNIOR_WINDOW),
        600,
    )
}

/// 1000-second epochs with a 200-second junior window, for exact weights.
fn setup_short() -> Pool {
    setup_with_clock(EpochClock::new(START, 1_000).with_junior_window(200), 1_900)
}

#[test]
fn test_capital_structure_and_settlement() {
    let mut pool = setup();
    let junior_time = START + 10;
    let senior_time = START + DEFAULT_JUNIOR_WINDOW + 10;
    let settle_time = START + DEFAULT_EPOCH_DURATION + 10;

    assert!(pool.is_junior_period(junior_time));
    pool.deposit("alice", 1_000, Tranche::Junior, junior_time).unwrap();
    assert_eq!(pool.epoch_data(1).staked.junior, 1_000);

    assert!(!pool.is_junior_period(senior_time));
    pool.deposit("bob", 5_000, Tranche::Senior, senior_time).unwrap();
    assert_eq!(pool.senior_capacity(1), 0);

    assert_eq!(
        pool.deposit("carol", 1, Tranche::Senior, senior_time),
        Err(TranchesError::SeniorLimitReached {
            requested: 1,
            staked: 5_000,
            limit: 5_000
        })
    );
    assert_eq!(pool.ledger().balance_of("USDC", "carol"), 100_000);
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), 6_000);

    assert!(pool.is_junior_period(settle_time));
    pool.post_results(ORACLE, 1, 1_005, 4_995, settle_time).unwrap();

    assert_eq!(
        pool.withdraw("alice", 1, Tranche::Junior, settle_time).unwrap(),
        1_005
    );
    assert_eq!(
        pool.withdraw("bob", 1, Tranche::Senior, settle_time).unwrap(),
        4_995
    );
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), 0);
    assert_eq!(pool.ledger().balance_of("USDC", CUSTODY), 0);
    assert_eq!(pool.ledger().balance_of("USDC", "alice"), 100_005);
    assert_eq!(pool.ledger().balance_of("USDC", "bob"), 99_995);

    assert_eq!(
        pool.withdraw("alice", 1, Tranche::Junior, settle_time),
        Err(TranchesError::NothingToWithdraw {
            epoch: 1,
            tranche: Tranche::Junior
        })
    );
}

#[test]
fn test_withdraw_requires_posted_results() {
    let mut pool = setup_short();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 100).unwrap();

    assert_eq!(
        pool.withdraw("alice", 1, Tranche::Junior, START + 1_100),
        Err(TranchesError::ResultsNotPosted { epoch: 1 })
    );
    assert_eq!(
        pool.claim_reward("alice", 1, Tranche::Junior, START + 1_100),
        Err(TranchesError::ResultsNotPosted { epoch: 1 })
    );
    assert_eq!(pool.user_balance("alice", 1, Tranche::Junior), 1_000);
}

#[test]
fn test_rewards_follow_time_weighted_stake() {
    let mut pool = setup_short();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 100).unwrap();
    pool.deposit("bob", 2_000, Tranche::Senior, START + 500).unwrap();

    let data = pool.epoch_data(1);
    assert_eq!(data.weighted, TrancheSides::new(900, 1_000));

    let now = START + 1_050;
    pool.post_results(ORACLE, 1, 1_500, 1_500, now).unwrap();
    assert_eq!(pool.available_reward("alice", 1, Tranche::Junior).unwrap(), 900);

    assert_eq!(
        pool.claim_reward("alice", 1, Tranche::Junior, now).unwrap(),
        900
    );
    assert_eq!(pool.claim_reward("alice", 1, Tranche::Junior, now).unwrap(), 0);
    assert_eq!(pool.available_reward("alice", 1, Tranche::Junior).unwrap(), 0);

    // principal withdrawal does not affect the reward key
    assert_eq!(
        pool.withdraw("bob", 1, Tranche::Senior, now).unwrap(),
        1_500
    );
    assert_eq!(
        pool.claim_reward("bob", 1, Tranche::Senior, now).unwrap(),
        1_000
    );
    assert_eq!(pool.ledger().balance_of("REWARD", "alice"), 900);
    assert_eq!(pool.ledger().balance_of("REWARD", "bob"), 1_000);

    // no position, no reward
    assert_eq!(
        pool.claim_reward("carol", 1, Tranche::Senior, now).unwrap(),
        0
    );
}

#[test]
fn test_exit_is_atomic() {
    let mut pool = setup_short();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 100).unwrap();
    pool.post_results(ORACLE, 1, 1_000, 0, START + 1_050).unwrap();

    pool.ledger_mut().approve("REWARD", REWARDS, POOL, 0).unwrap();
    let result = pool.exit("alice", 1, Tranche::Junior, START + 1_060);
    assert!(matches!(
        result,
        Err(TranchesError::Ledger(LedgerError::InsufficientAllowance { .. }))
    ));
    assert_eq!(pool.user_balance("alice", 1, Tranche::Junior), 1_000);
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), 1_000);
    assert!(!pool.is_locked());

    pool.ledger_mut()
        .approve("REWARD", REWARDS, POOL, 1_000_000)
        .unwrap();
    assert_eq!(
        pool.exit("alice", 1, Tranche::Junior, START + 1_060).unwrap(),
        (1_000, 1_900)
    );
    assert_eq!(pool.user_balance("alice", 1, Tranche::Junior), 0);
}

#[test]
fn test_results_posted_only_in_following_junior_window() {
    let mut pool = setup_short();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 100).unwrap();

    // senior window of epoch 2
    assert_eq!(
        pool.post_results(ORACLE, 1, 1_000, 0, START + 1_250),
        Err(TranchesError::PostingWindowClosed { epoch: 1, next: 2 })
    );
    // senior window of epoch 4
    assert_eq!(
        pool.post_results(ORACLE, 1, 1_000, 0, START + 3_500),
        Err(TranchesError::PostingWindowClosed { epoch: 1, next: 2 })
    );
    assert_eq!(
        pool.withdraw("alice", 1, Tranche::Junior, START + 3_500),
        Err(TranchesError::ResultsNotPosted { epoch: 1 })
    );
    assert!(!pool.is_locked());

    pool.post_results(ORACLE, 1, 1_000, 0, START + 1_199).unwrap();
    assert!(pool.epoch_data(1).posted_results);
}

#[test]
fn test_uneven_results_never_pay_out_more_than_staked() {
    let mut pool = setup_short();
    for user in ["alice", "bob"] {
        pool.deposit(user, 1_000, Tranche::Junior, START + 100).unwrap();
    }
    pool.deposit("carol", 1_001, Tranche::Junior, START + 150).unwrap();
    pool.deposit("dave", 7_000, Tranche::Senior, START + 500).unwrap();

    let staked = pool.epoch_data(1).staked;
    assert_eq!(staked, TrancheSides::new(3_001, 7_000));
    let total_staked = staked.total().unwrap();
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), total_staked);

    pool.post_results(ORACLE, 1, 3_334, 6_667, START + 1_050).unwrap();

    let mut paid = 0;
    for (user, tranche, expected) in [
        ("alice", Tranche::Junior, 1_110),
        ("bob", Tranche::Junior, 1_110),
        ("carol", Tranche::Junior, 1_112),
        ("dave", Tranche::Senior, 6_666),
    ] {
        let amount = pool.withdraw(user, 1, tranche, START + 1_060).unwrap();
        assert_eq!(amount, expected, "{} withdrawal", user);
        paid += amount;
    }

    assert!(paid <= total_staked);
    // rounding dust stays in custody
    assert_eq!(total_staked - paid, 3);
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), 3);
    assert_eq!(pool.ledger().balance_of("USDC", CUSTODY), 3);
}

#[test]
fn test_eighteen_decimal_balances() {
    init_logging();
    let token: u128 = 1_000_000_000_000_000_000;
    let mut ledger = TokenLedger::new();
    for (user, amount) in [("alice", 1_000 * token), ("bob", 5_000 * token)] {
        ledger.mint("USDC", user, amount).unwrap();
        ledger.approve("USDC", user, POOL, amount).unwrap();
    }
    ledger.mint("REWARD", REWARDS, 1_000_000 * token).unwrap();
    ledger.approve("REWARD", REWARDS, POOL, 1_000_000 * token).unwrap();
    let mut pool = TranchesPool::new(
        tranches_config(3_400 * token),
        EpochClock::new(START, 1_000).with_junior_window(200),
        ledger,
        Vault::new(CUSTODY),
        roles(),
    )
    .expect("pool construction");

    pool.deposit("alice", 1_000 * token, Tranche::Junior, START + 100).unwrap();
    pool.deposit("bob", 5_000 * token, Tranche::Senior, START + 500).unwrap();
    assert_eq!(pool.senior_capacity(1), 0);
    assert_eq!(
        pool.epoch_data(1).weighted,
        TrancheSides::new(900 * token, 2_500 * token)
    );

    pool.post_results(ORACLE, 1, 1_005 * token, 4_995 * token, START + 1_050).unwrap();
    assert_eq!(
        pool.exit("alice", 1, Tranche::Junior, START + 1_060).unwrap(),
        (1_005 * token, 900 * token)
    );
    assert_eq!(
        pool.exit("bob", 1, Tranche::Senior, START + 1_060).unwrap(),
        (4_995 * token, 2_500 * token)
    );
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), 0);
    assert_eq!(pool.ledger().balance_of("USDC", "alice"), 1_005 * token);
}

#[test]
fn test_epochs_settle_independently() {
    let mut pool = setup_short();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 100).unwrap();
    pool.deposit("alice", 2_000, Tranche::Junior, START + 1_100).unwrap();

    assert_eq!(pool.epoch_data(1).staked.junior, 1_000);
    assert_eq!(pool.epoch_data(2).staked.junior, 2_000);

    pool.post_results(ORACLE, 1, 1_000, 0, START + 1_150).unwrap();
    assert_eq!(
        pool.post_results(ORACLE, 2, 2_000, 0, START + 1_150),
        Err(TranchesError::EpochNotFinalized {
            epoch: 2,
            current: 2
        })
    );
    assert_eq!(
        pool.withdraw("alice", 1, Tranche::Junior, START + 1_150).unwrap(),
        1_000
    );
    assert_eq!(pool.user_balance("alice", 2, Tranche::Junior), 2_000);
    assert_eq!(pool.vault().get_balance(POOL, "USDC"), 2_000);
}

#[test]
fn test_reward_budget_fixed_at_post_time() {
    let mut pool = setup_short();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 100).unwrap();
    pool.deposit("alice", 1_000, Tranche::Junior, START + 1_100).unwrap();

    assert_eq!(
        pool.change_rewards_per_epoch("mallory", 1),
        Err(TranchesError::Unauthorized {
            role: Role::RewardsManager,
            account: "mallory".to_string()
        })
    );
    assert!(matches!(
        pool.post_results("mallory", 1, 1_000, 0, START + 1_150),
        Err(TranchesError::Unauthorized {
            role: Role::ResultsPoster,
            ..
        })
    ));

    pool.post_results(ORACLE, 1, 1_000, 0, START + 1_150).unwrap();
    pool.change_rewards_per_epoch(DAO, 100).unwrap();
    assert_eq!(pool.rewards_per_epoch(), 100);
    pool.post_results(ORACLE, 2, 1_000, 0, START + 2_150).unwrap();

    assert_eq!(pool.epoch_data(1).reward_budget, 1_900);
    assert_eq!(pool.epoch_data(2).reward_budget, 100);
}

#[test]
fn test_report_and_config() {
    let content = r#"
[clock]
epoch_start = "2026-01-05T00:00:00Z"
epoch_duration_secs = 1000
junior_window_secs = 200

[tranches]
pool_address = "tranches-pool"
staked_asset = "USDC"
reward_asset = "REWARD"
reward_vault = "community-vault"
rewards_per_epoch = 1900
"#;
    init_logging();
    let config = ProtocolConfig::parse(content).unwrap();
    let clock = EpochClock::from_config(&config.clock).unwrap();
    let start = clock.epoch_start();
    assert_eq!(clock.junior_window(), 200);

    let mut pool = TranchesPool::new(
        config.tranches.unwrap(),
        clock,
        funded_ledger(),
        Vault::new(CUSTODY),
        roles(),
    )
    .unwrap();
    pool.deposit("alice", 1_000, Tranche::Junior, start + 100).unwrap();

    let report = pool.report(start + 100);
    assert_eq!(report.current_epoch, 1);
    assert!(report.junior_period);
    assert_eq!(report.current_staked, TrancheSides::new(1_000, 0));
    assert_eq!(report.senior_capacity, 5_000);
    assert_eq!(report.custody_balance, 1_000);

    let json = pool.report_json(start + 100).unwrap();
    assert!(json.contains("\"senior_capacity\": 5000"));
    assert!(json.contains("\"junior_period\": true"));
}
