// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BENCHMARK SUITE — bdl-staking
//
// end_block over growing validator sets (recompute, eviction, ranking and
// reward payout all run there) plus the per-message delegate path.
// Run: cargo bench -p bdl-staking
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bdl_core::bank::Bank;
use bdl_core::params::Params;
use bdl_core::store::MemStore;
use bdl_core::{Coin, Dec, NATIVE_DENOM};
use bdl_staking::{Context, Description, Keeper};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

fn native(amount: u128) -> Coin {
    Coin::new(NATIVE_DENOM, amount)
}

fn populated(validators: usize, delegators_each: usize) -> (MemStore, Keeper) {
    let mut store = MemStore::new();
    let keeper = Keeper::new();
    {
        let mut ctx = Context::new(&mut store, 1, 0);
        let params = Params {
            power_reduction: 1,
            max_validators: 50,
            blocks_per_extra_validator: 0,
            initial_validators: 50,
            ..Params::default()
        };
        keeper.set_params(&mut ctx, &params).unwrap();
        for i in 0..validators {
            let op = format!("val{:04}", i);
            keeper.bank.mint(ctx.store, &op, &native(1_000)).unwrap();
            keeper
                .declare_candidate(
                    &mut ctx,
                    &op,
                    &hex::encode(op.as_bytes()),
                    &op,
                    Dec::percent(5),
                    Description::default(),
                    native(100 + i as u128),
                )
                .unwrap();
            keeper.set_online(&mut ctx, &op).unwrap();
            for j in 0..delegators_each {
                let who = format!("del{:04}-{:02}", i, j);
                keeper.bank.mint(ctx.store, &who, &native(100)).unwrap();
                keeper.delegate(&mut ctx, &who, &op, native(10 + j as u128)).unwrap();
            }
        }
        keeper.end_block(&mut ctx).unwrap();
    }
    (store, keeper)
}

fn bench_end_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("end_block");
    group.sample_size(20);
    for n in [10usize, 50, 200] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || populated(n, 5),
                |(mut store, keeper)| {
                    let mut ctx = Context::new(&mut store, 2, 10);
                    keeper.add_accum_reward(&mut ctx, "val0000", 1_000).unwrap();
                    black_box(keeper.end_block(&mut ctx).unwrap())
                },
                BatchSize::LargeInput,
            )
        });
    }
    group.finish();
}

fn bench_delegate(c: &mut Criterion) {
    c.bench_function("delegate_existing_record", |b| {
        b.iter_batched(
            || populated(10, 3),
            |(mut store, keeper)| {
                let mut ctx = Context::new(&mut store, 2, 10);
                black_box(
                    keeper
                        .delegate(&mut ctx, "del0003-00", "val0003", native(5))
                        .unwrap(),
                )
            },
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_end_block, bench_delegate);
criterion_main!(benches);
