// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PROPERTY-BASED TESTS — bdl-staking
//
// Random sequences of delegate / undelegate / slash / end-of-block steps
// against a small validator set, staking native coin, a curve coin and
// NFT sub-tokens. After every step:
// - each validator's tokens equal the sum of its delegation bases
// - pools hold exactly what delegations and unbonding entries claim
// - every denom's balances add up to its supply, which only slashing shrinks
// After every end-of-block step the size caps hold too.
// Run: cargo test --release -p bdl-staking --test prop_staking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bdl_core::bank::Bank;
use bdl_core::coins::{CoinInfo, CoinRegistry};
use bdl_core::nft::StoreNftRegistry;
use bdl_core::params::Params;
use bdl_core::store::MemStore;
use bdl_core::{Coin, Dec, BONDED_POOL, NATIVE_DENOM, NFT_RESERVE_POOL, NOT_BONDED_POOL};
use bdl_staking::types::consensus_address;
use bdl_staking::{BondStatus, Context, Description, Keeper};
use proptest::prelude::*;

const VALIDATORS: [&str; 4] = ["val0", "val1", "val2", "val3"];
const DELEGATORS: [&str; 5] = ["del0", "del1", "del2", "del3", "del4"];
const START_BALANCE: u128 = 10_000;
const CURVE_DENOM: &str = "curv";
const CURVE_BALANCE: u128 = 2_000;
const NFT_DENOM: &str = "art";
const SUB_TOKENS: [u64; 3] = [1, 2, 3];
const SUB_TOKEN_RESERVE: u128 = 50;

#[derive(Debug, Clone)]
enum Op {
    Delegate { who: usize, to: usize, amount: u128 },
    Undelegate { who: usize, from: usize, amount: u128 },
    DelegateCurve { who: usize, to: usize, amount: u128 },
    UndelegateCurve { who: usize, from: usize, amount: u128 },
    DelegateNft { who: usize, to: usize, ids: Vec<u64> },
    UndelegateNft { who: usize, from: usize, ids: Vec<u64> },
    Slash { target: usize, percent: u64, back: u64 },
    EndBlock { advance: u64 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..DELEGATORS.len(), 0..VALIDATORS.len(), 1u128..3_000)
            .prop_map(|(who, to, amount)| Op::Delegate { who, to, amount }),
        (0..DELEGATORS.len(), 0..VALIDATORS.len(), 1u128..3_000)
            .prop_map(|(who, from, amount)| Op::Undelegate { who, from, amount }),
        (0..DELEGATORS.len(), 0..VALIDATORS.len(), 1u128..800)
            .prop_map(|(who, to, amount)| Op::DelegateCurve { who, to, amount }),
        (0..DELEGATORS.len(), 0..VALIDATORS.len(), 1u128..800)
            .prop_map(|(who, from, amount)| Op::UndelegateCurve { who, from, amount }),
        (0..DELEGATORS.len(), 0..VALIDATORS.len(), sub_token_subset())
            .prop_map(|(who, to, ids)| Op::DelegateNft { who, to, ids }),
        (0..DELEGATORS.len(), 0..VALIDATORS.len(), sub_token_subset())
            .prop_map(|(who, from, ids)| Op::UndelegateNft { who, from, ids }),
        (0..VALIDATORS.len(), 0u64..=100, 0u64..3)
            .prop_map(|(target, percent, back)| Op::Slash { target, percent, back }),
        (0u64..80).prop_map(|advance| Op::EndBlock { advance }),
    ]
}

fn sub_token_subset() -> impl Strategy<Value = Vec<u64>> {
    prop::sample::subsequence(SUB_TOKENS.to_vec(), 1..=SUB_TOKENS.len())
}

fn token_of(who: usize) -> String {
    format!("piece-{}", who)
}

fn params() -> Params {
    Params {
        unbonding_time_secs: 100,
        max_validators: 3,
        max_entries: 4,
        max_delegations: 4,
        power_reduction: 1,
        initial_validators: 3,
        blocks_per_extra_validator: 0,
        ..Params::default()
    }
}

fn native(amount: u128) -> Coin {
    Coin::new(NATIVE_DENOM, amount)
}

fn genesis(store: &mut MemStore, keeper: &Keeper) {
    let mut ctx = Context::new(store, 1, 0);
    keeper.set_params(&mut ctx, &params()).unwrap();
    for (i, op) in VALIDATORS.iter().enumerate() {
        keeper.bank.mint(ctx.store, op, &native(START_BALANCE)).unwrap();
        keeper
            .declare_candidate(
                &mut ctx,
                op,
                &hex::encode(op.as_bytes()),
                op,
                Dec::percent(10),
                Description::default(),
                native(500 + 100 * i as u128),
            )
            .unwrap();
        keeper.set_online(&mut ctx, op).unwrap();
    }
    for (i, d) in DELEGATORS.iter().enumerate() {
        keeper.bank.mint(ctx.store, d, &native(START_BALANCE)).unwrap();
        keeper.bank.mint(ctx.store, d, &Coin::new(CURVE_DENOM, CURVE_BALANCE)).unwrap();
        StoreNftRegistry
            .issue(
                ctx.store,
                &keeper.bank,
                NFT_DENOM,
                &token_of(i),
                d,
                &SUB_TOKENS,
                &native(SUB_TOKEN_RESERVE),
            )
            .unwrap();
    }
    let curve = CoinInfo {
        denom: CURVE_DENOM.to_string(),
        crr: 50,
        reserve: 5_000,
        supply: CURVE_BALANCE * DELEGATORS.len() as u128,
    };
    keeper.coins.set_coin(ctx.store, &curve).unwrap();
    keeper.end_block(&mut ctx).unwrap();
}

fn held(ctx: &Context, keeper: &Keeper, denom: &str) -> u128 {
    VALIDATORS
        .iter()
        .chain(DELEGATORS.iter())
        .chain([BONDED_POOL, NOT_BONDED_POOL, NFT_RESERVE_POOL].iter())
        .map(|a| keeper.bank.balance(&*ctx.store, a, denom).unwrap())
        .sum()
}

fn supplies(ctx: &Context, keeper: &Keeper) -> [u128; 2] {
    [NATIVE_DENOM, CURVE_DENOM].map(|denom| keeper.bank.supply(&*ctx.store, denom).unwrap())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// PROPERTY: stake accounting holds after every step of any sequence
    #[test]
    fn prop_accounting_invariants(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let mut store = MemStore::new();
        let keeper = Keeper::new();
        genesis(&mut store, &keeper);

        let mut height = 1u64;
        let mut time = 0u64;
        let mut supply = {
            let ctx = Context::new(&mut store, height, time);
            supplies(&ctx, &keeper)
        };

        for op in ops {
            let mut ctx = Context::new(&mut store, height, time);
            let slashing = matches!(op, Op::Slash { .. });
            let closing = matches!(op, Op::EndBlock { .. });
            match op {
                Op::Delegate { who, to, amount } => {
                    // validation failures are fine; they must not mutate
                    let _ = keeper.delegate(&mut ctx, DELEGATORS[who], VALIDATORS[to], native(amount));
                }
                Op::Undelegate { who, from, amount } => {
                    let _ = keeper.undelegate(&mut ctx, DELEGATORS[who], VALIDATORS[from], native(amount));
                }
                Op::DelegateCurve { who, to, amount } => {
                    let coin = Coin::new(CURVE_DENOM, amount);
                    let _ = keeper.delegate(&mut ctx, DELEGATORS[who], VALIDATORS[to], coin);
                }
                Op::UndelegateCurve { who, from, amount } => {
                    let coin = Coin::new(CURVE_DENOM, amount);
                    let _ = keeper.undelegate(&mut ctx, DELEGATORS[who], VALIDATORS[from], coin);
                }
                Op::DelegateNft { who, to, ids } => {
                    let _ = keeper.delegate_nft(
                        &mut ctx,
                        DELEGATORS[who],
                        VALIDATORS[to],
                        NFT_DENOM,
                        &token_of(who),
                        ids,
                    );
                }
                Op::UndelegateNft { who, from, ids } => {
                    let _ = keeper.undelegate_nft(
                        &mut ctx,
                        DELEGATORS[who],
                        VALIDATORS[from],
                        NFT_DENOM,
                        &token_of(who),
                        ids,
                    );
                }
                Op::Slash { target, percent, back } => {
                    let Some(v) = keeper.get_validator(&ctx, VALIDATORS[target]).unwrap() else {
                        continue;
                    };
                    if v.status == BondStatus::Unbonded {
                        continue;
                    }
                    let cons = consensus_address(&v.consensus_pubkey).unwrap();
                    let before = v.tokens;
                    let factor = Dec::percent(percent);
                    keeper
                        .slash(&mut ctx, &cons, height.saturating_sub(back), factor)
                        .unwrap()
                        .unwrap();
                    // PROPERTY: slash never increases tokens or burns beyond its share
                    let after = keeper.must_get_validator(&ctx, VALIDATORS[target]).unwrap().tokens;
                    prop_assert!(after <= before);
                    prop_assert!(before - after <= factor.mul_trunc(before));
                }
                Op::EndBlock { advance } => {
                    height += 1;
                    time += advance;
                    ctx.height = height;
                    ctx.time = time;
                    let updates = keeper.end_block(&mut ctx).unwrap();
                    let bonded = keeper.bonded_validators(&ctx).unwrap();
                    // PROPERTY: bonded set never exceeds its cap
                    prop_assert!(bonded.len() <= params().validator_cap(height) as usize);
                    prop_assert!(updates.len() <= VALIDATORS.len());
                }
            }

            let broken = if closing {
                keeper.check_transition_invariants(&ctx).unwrap()
            } else {
                keeper.check_invariants(&ctx).unwrap()
            };
            prop_assert!(broken.is_empty(), "broken invariants: {:?}", broken);

            // PROPERTY: no coin appears or vanishes outside a slash
            let now = supplies(&ctx, &keeper);
            prop_assert_eq!(held(&ctx, &keeper, NATIVE_DENOM), now[0]);
            prop_assert_eq!(held(&ctx, &keeper, CURVE_DENOM), now[1]);
            for (before, after) in supply.iter().zip(now.iter()) {
                if slashing {
                    prop_assert!(after <= before);
                } else {
                    prop_assert_eq!(after, before);
                }
            }
            supply = now;
        }
    }

    /// PROPERTY: re-running end_block on committed state is a no-op
    #[test]
    fn prop_end_block_idempotent(stakes in prop::collection::vec(1u128..5_000, 1..4)) {
        let mut store = MemStore::new();
        let keeper = Keeper::new();
        genesis(&mut store, &keeper);
        let mut ctx = Context::new(&mut store, 2, 10);
        for (i, amount) in stakes.iter().enumerate() {
            keeper.delegate(&mut ctx, DELEGATORS[i], VALIDATORS[i], native(*amount)).unwrap();
        }
        keeper.end_block(&mut ctx).unwrap();
        let bonded_pool = keeper.bank.balance(&*ctx.store, BONDED_POOL, NATIVE_DENOM).unwrap();
        prop_assert!(keeper.end_block(&mut ctx).unwrap().is_empty());
        prop_assert_eq!(
            keeper.bank.balance(&*ctx.store, BONDED_POOL, NATIVE_DENOM).unwrap(),
            bonded_pool
        );
    }

    /// PROPERTY: eviction keeps exactly the highest-valued delegations
    #[test]
    fn prop_eviction_keeps_top(amounts in prop::collection::vec(1u128..5_000, 4..=5)) {
        let mut store = MemStore::new();
        let keeper = Keeper::new();
        genesis(&mut store, &keeper);
        let mut ctx = Context::new(&mut store, 2, 0);
        for (i, amount) in amounts.iter().enumerate() {
            keeper.delegate(&mut ctx, DELEGATORS[i], "val0", native(*amount)).unwrap();
        }
        let mut all: Vec<u128> = keeper
            .delegations_of_validator(&ctx, "val0")
            .unwrap()
            .iter()
            .map(|d| d.base())
            .collect();
        all.sort_unstable_by(|a, b| b.cmp(a));
        all.truncate(params().max_delegations as usize);

        keeper.end_block(&mut ctx).unwrap();
        let mut kept: Vec<u128> = keeper
            .delegations_of_validator(&ctx, "val0")
            .unwrap()
            .iter()
            .map(|d| d.base())
            .collect();
        kept.sort_unstable_by(|a, b| b.cmp(a));
        prop_assert_eq!(kept, all);
        prop_assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
    }
}

// Five stake-1 delegations beside the self-delegation push a validator one
// over its cap of four; nothing is evicted until the block closes.
#[test]
fn test_delegation_cap_waits_for_end_block() {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    genesis(&mut store, &keeper);
    let mut ctx = Context::new(&mut store, 1, 0);
    for d in &DELEGATORS[..4] {
        keeper.delegate(&mut ctx, d, "val0", native(1)).unwrap();
    }
    assert!(keeper.check_invariants(&ctx).unwrap().is_empty());
    assert_eq!(keeper.check_transition_invariants(&ctx).unwrap().len(), 1);

    ctx.height = 2;
    keeper.end_block(&mut ctx).unwrap();
    assert!(keeper.check_transition_invariants(&ctx).unwrap().is_empty());
    assert_eq!(keeper.delegations_of_validator(&ctx, "val0").unwrap().len(), 4);
}
