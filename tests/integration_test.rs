// ========================================
// INTEGRATION TESTS FOR BONDLINE
// ========================================
//
// Test Scenarios:
// 1. Validator Set Selection & Displacement
// 2. Undelegation Maturity Across Blocks
// 3. Downtime Slash, Jail & Recovery
// 4. Double-Sign Evidence Reaching Unbonding Entries
// 5. Full Slash & Pruning
// 6. Database Persistence & Recovery (sled)
//
// Usage:
//   cargo test --test integration_test -- --nocapture
//
// ========================================

use bdl_core::bank::Bank;
use bdl_core::params::Params;
use bdl_core::sled_store::SledStore;
use bdl_core::store::{KvStore, MemStore};
use bdl_core::{Coin, Dec, BONDED_POOL, NATIVE_DENOM, NOT_BONDED_POOL};
use bdl_staking::types::consensus_address;
use bdl_staking::{BondStatus, Context, Description, Keeper, PowerUpdate};

fn native(amount: u128) -> Coin {
    Coin::new(NATIVE_DENOM, amount)
}

fn params() -> Params {
    Params {
        unbonding_time_secs: 100,
        max_validators: 3,
        initial_validators: 3,
        blocks_per_extra_validator: 0,
        max_entries: 7,
        max_delegations: 4,
        power_reduction: 1,
        signed_blocks_window: 10,
        min_signed_per_window: Dec::percent(50),
        ..Params::default()
    }
}

fn balance(ctx: &Context, keeper: &Keeper, account: &str) -> u128 {
    keeper.bank.balance(&*ctx.store, account, NATIVE_DENOM).unwrap()
}

fn cons(ctx: &Context, keeper: &Keeper, operator: &str) -> String {
    let v = keeper.must_get_validator(ctx, operator).unwrap();
    consensus_address(&v.consensus_pubkey).unwrap()
}

fn powers(updates: &[PowerUpdate]) -> Vec<(String, u64)> {
    let mut out: Vec<_> = updates.iter().map(|u| (u.operator.clone(), u.power)).collect();
    out.sort();
    out
}

/// Params, four funded validators (a > b > c > d) and the first end_block.
fn genesis(store: &mut dyn KvStore, keeper: &Keeper) -> Vec<PowerUpdate> {
    let mut ctx = Context::new(store, 1, 0);
    keeper.set_params(&mut ctx, &params()).unwrap();
    for (op, stake) in [("a", 1_000u128), ("b", 900), ("c", 800), ("d", 100)] {
        keeper.bank.mint(ctx.store, op, &native(stake)).unwrap();
        keeper
            .declare_candidate(
                &mut ctx,
                op,
                &hex::encode(op.as_bytes()),
                op,
                Dec::percent(10),
                Description {
                    moniker: op.to_uppercase(),
                    ..Description::default()
                },
                native(stake),
            )
            .unwrap();
        keeper.set_online(&mut ctx, op).unwrap();
    }
    for who in ["alice", "bob"] {
        keeper.bank.mint(ctx.store, who, &native(1_000)).unwrap();
    }
    keeper.end_block(&mut ctx).unwrap()
}

// ========================================
// TEST 1: VALIDATOR SET SELECTION & DISPLACEMENT
// ========================================
#[test]
fn test_validator_set_selection_and_displacement() {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    let updates = genesis(&mut store, &keeper);
    assert_eq!(
        powers(&updates),
        vec![("a".into(), 1_000), ("b".into(), 900), ("c".into(), 800)]
    );

    let mut ctx = Context::new(&mut store, 2, 5);
    assert_eq!(
        keeper.must_get_validator(&ctx, "d").unwrap().status,
        BondStatus::Unbonded
    );

    // d overtakes c
    keeper.delegate(&mut ctx, "alice", "d", native(750)).unwrap();
    let updates = keeper.end_block(&mut ctx).unwrap();
    assert_eq!(powers(&updates), vec![("c".into(), 0), ("d".into(), 850)]);

    let c = keeper.must_get_validator(&ctx, "c").unwrap();
    assert_eq!(c.status, BondStatus::Unbonding);
    assert_eq!(c.unbonding_completion_time, 105);
    assert_eq!(balance(&ctx, &keeper, BONDED_POOL), 2_750);
    assert_eq!(balance(&ctx, &keeper, NOT_BONDED_POOL), 800);

    // the set is stable without further messages
    ctx.height = 3;
    assert!(keeper.end_block(&mut ctx).unwrap().is_empty());

    ctx.height = 4;
    ctx.time = 105;
    keeper.end_block(&mut ctx).unwrap();
    assert_eq!(
        keeper.must_get_validator(&ctx, "c").unwrap().status,
        BondStatus::Unbonded
    );
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
    println!("✅ displaced validator finished unbonding at t=105");
}

// ========================================
// TEST 2: UNDELEGATION MATURITY ACROSS BLOCKS
// ========================================
#[test]
fn test_undelegation_matures_after_unbonding_time() {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    genesis(&mut store, &keeper);

    let mut ctx = Context::new(&mut store, 2, 0);
    keeper.delegate(&mut ctx, "alice", "a", native(300)).unwrap();
    keeper.end_block(&mut ctx).unwrap();
    assert_eq!(balance(&ctx, &keeper, "alice"), 700);

    ctx.height = 3;
    ctx.time = 10;
    let completion = keeper.undelegate(&mut ctx, "alice", "a", native(100)).unwrap();
    assert_eq!(completion, 110);
    let updates = keeper.end_block(&mut ctx).unwrap();
    assert_eq!(powers(&updates), vec![("a".into(), 1_200)]);

    ctx.height = 4;
    ctx.time = 109;
    keeper.end_block(&mut ctx).unwrap();
    assert_eq!(balance(&ctx, &keeper, "alice"), 700);
    assert!(keeper.get_unbonding(&ctx, "alice", "a").unwrap().is_some());

    ctx.height = 5;
    ctx.time = 110;
    keeper.end_block(&mut ctx).unwrap();
    assert_eq!(balance(&ctx, &keeper, "alice"), 800);
    assert!(keeper.get_unbonding(&ctx, "alice", "a").unwrap().is_none());
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
}

// ========================================
// TEST 3: DOWNTIME SLASH, JAIL & RECOVERY
// ========================================
#[test]
fn test_downtime_slash_jail_and_recovery() {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    genesis(&mut store, &keeper);

    let mut ctx = Context::new(&mut store, 2, 0);
    let b = cons(&ctx, &keeper, "b");
    let mut tripped = None;
    for height in 2..=13 {
        ctx.height = height;
        ctx.time = height * 5;
        if let Some(event) = keeper.handle_validator_signature(&mut ctx, &b, false).unwrap() {
            tripped = Some(event);
        }
        keeper.end_block(&mut ctx).unwrap();
    }

    // window of 10 starting at height 2, more than 5 misses
    let event = tripped.expect("downtime slash");
    assert_eq!(event.height, 13);
    assert_eq!(event.infraction_height, 12);
    assert_eq!(event.burned_stake, 9);

    let v = keeper.must_get_validator(&ctx, "b").unwrap();
    assert!(v.jailed);
    assert_eq!(v.tokens, 891);
    assert_eq!(v.status, BondStatus::Unbonding);
    assert!(keeper.last_validator_powers(&ctx).unwrap().get("b").is_none());
    assert_eq!(keeper.slash_events(&ctx, "b").unwrap(), vec![event]);

    // jailed validators no longer accrue misses
    ctx.height = 14;
    assert!(keeper.handle_validator_signature(&mut ctx, &b, false).unwrap().is_none());

    keeper.unjail(&mut ctx, "b").unwrap();
    keeper.set_online(&mut ctx, "b").unwrap();
    let updates = keeper.end_block(&mut ctx).unwrap();
    assert_eq!(powers(&updates), vec![("b".into(), 891), ("d".into(), 0)]);
    assert_eq!(
        keeper.must_get_validator(&ctx, "b").unwrap().status,
        BondStatus::Bonded
    );
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
}

// ========================================
// TEST 4: DOUBLE-SIGN EVIDENCE REACHING UNBONDING ENTRIES
// ========================================
#[test]
fn test_double_sign_slashes_unbonding_entries() {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    genesis(&mut store, &keeper);

    let mut ctx = Context::new(&mut store, 2, 0);
    keeper.delegate(&mut ctx, "bob", "b", native(200)).unwrap();
    keeper.end_block(&mut ctx).unwrap();

    ctx.height = 5;
    ctx.time = 20;
    keeper.undelegate(&mut ctx, "bob", "b", native(100)).unwrap();
    keeper.end_block(&mut ctx).unwrap();

    ctx.height = 6;
    ctx.time = 25;
    let b = cons(&ctx, &keeper, "b");
    let event = keeper.handle_double_sign(&mut ctx, &b, 4).unwrap().unwrap();
    // 5% of 900 self + 100 remaining, and of the 100 unbonding
    assert_eq!(event.burned_stake, 50);
    assert_eq!(event.burned_unbonding, 5);
    assert!(keeper.must_get_validator(&ctx, "b").unwrap().jailed);

    let updates = keeper.end_block(&mut ctx).unwrap();
    assert!(updates.contains(&PowerUpdate {
        operator: "b".into(),
        consensus_pubkey: hex::encode("b"),
        power: 0,
    }));

    ctx.height = 7;
    ctx.time = 120;
    keeper.end_block(&mut ctx).unwrap();
    assert_eq!(balance(&ctx, &keeper, "bob"), 800 + 95);
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
}

// ========================================
// TEST 5: FULL SLASH & PRUNING
// ========================================
#[test]
fn test_full_slash_prunes_validator() {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    genesis(&mut store, &keeper);

    let mut ctx = Context::new(&mut store, 2, 0);
    let supply = keeper.bank.supply(&*ctx.store, NATIVE_DENOM).unwrap();
    let c = cons(&ctx, &keeper, "c");
    let event = keeper.slash(&mut ctx, &c, 2, Dec::percent(100)).unwrap().unwrap();
    assert_eq!(event.burned_stake, 800);
    assert_eq!(keeper.bank.supply(&*ctx.store, NATIVE_DENOM).unwrap(), supply - 800);

    let updates = keeper.end_block(&mut ctx).unwrap();
    assert_eq!(powers(&updates), vec![("c".into(), 0), ("d".into(), 100)]);
    assert_eq!(
        keeper.must_get_validator(&ctx, "c").unwrap().status,
        BondStatus::Unbonded
    );

    ctx.height = 3;
    keeper.end_block(&mut ctx).unwrap();
    assert!(keeper.get_validator(&ctx, "c").unwrap().is_none());
    assert!(keeper.delegations_of_validator(&ctx, "c").unwrap().is_empty());
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
}

// ========================================
// TEST 6: DATABASE PERSISTENCE & RECOVERY
// ========================================
#[test]
fn test_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let keeper = Keeper::new();
    let before = {
        let mut store = SledStore::open(dir.path()).unwrap();
        genesis(&mut store, &keeper);
        let mut ctx = Context::new(&mut store, 2, 10);
        keeper.delegate(&mut ctx, "alice", "c", native(400)).unwrap();
        keeper.undelegate(&mut ctx, "alice", "c", native(50)).unwrap();
        keeper.end_block(&mut ctx).unwrap();
        let powers = keeper.last_validator_powers(&ctx).unwrap();
        store.flush().unwrap();
        powers
    };

    let mut store = SledStore::open(dir.path()).unwrap();
    let mut ctx = Context::new(&mut store, 3, 20);
    assert_eq!(keeper.params(&ctx).unwrap(), params());
    assert_eq!(keeper.last_validator_powers(&ctx).unwrap(), before);
    assert_eq!(keeper.must_get_validator(&ctx, "c").unwrap().tokens, 1_150);
    assert_eq!(keeper.get_unbonding(&ctx, "alice", "c").unwrap().unwrap().entries.len(), 1);
    assert!(keeper.end_block(&mut ctx).unwrap().is_empty());
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
    println!("✅ {} keys restored from disk", store.len());
}
