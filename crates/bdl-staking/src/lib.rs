// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - VALIDATOR & DELEGATION ENGINE
//
// Deterministic, single-threaded staking state machine:
// - validator registry with a power-ranked index
// - fungible, curve-coin and NFT-collateral delegations with eviction
// - delegator and validator unbonding queues
// - proportional slashing, jailing and liveness tracking
// - per-block validator set transition and reward payout
//
// All state lives in one `KvStore`. Public operations run inside a cache
// overlay and commit as a single batch, so a failed operation writes nothing.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use bdl_core::bank::{Bank, StoreBank};
use bdl_core::coins::{CoinRegistry, StoreCoinRegistry};
use bdl_core::nft::{NftRegistry, StoreNftRegistry};
use bdl_core::params::Params;
use bdl_core::store::{atomically, load, save, KvStore};
use bdl_core::{Result, StakingError};

pub mod delegation;
pub mod invariants;
pub mod keys;
pub mod liveness;
pub mod migrations;
pub mod msgs;
pub mod power_index;
pub mod queries;
pub mod registry;
pub mod rewards;
pub mod slashing;
pub mod transition;
pub mod types;
pub mod unbonding;

pub use delegation::DelegationSource;
pub use migrations::Migration;
pub use slashing::SlashEvent;
pub use types::{
    BondStatus, Delegation, Description, FungibleDelegation, NftDelegation, PowerUpdate,
    UnbondingDelegation, UnbondingEntry, Validator,
};

/// Block-scoped view of the store. `height` and `time` (unix seconds) are
/// those of the block being processed.
pub struct Context<'a> {
    pub store: &'a mut dyn KvStore,
    pub height: u64,
    pub time: u64,
}

impl<'a> Context<'a> {
    pub fn new(store: &'a mut dyn KvStore, height: u64, time: u64) -> Self {
        Context {
            store,
            height,
            time,
        }
    }

    /// Run `f` on a cache over this context's store; commit only on `Ok`.
    pub fn atomically<T, F>(&mut self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Context<'_>) -> Result<T>,
    {
        let (height, time) = (self.height, self.time);
        atomically(&mut *self.store, |store| {
            let mut inner = Context {
                store,
                height,
                time,
            };
            f(&mut inner)
        })
    }
}

/// Staking keeper. Collaborators share the context's store so their writes
/// join the staking commit unit.
pub struct Keeper<B = StoreBank, C = StoreCoinRegistry, N = StoreNftRegistry> {
    pub bank: B,
    pub coins: C,
    pub nft: N,
    migrations: Vec<Migration>,
}

impl Keeper {
    pub fn new() -> Self {
        Keeper::with_collaborators(StoreBank, StoreCoinRegistry, StoreNftRegistry)
    }
}

impl Default for Keeper {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    pub fn with_collaborators(bank: B, coins: C, nft: N) -> Self {
        Keeper {
            bank,
            coins,
            nft,
            migrations: Vec::new(),
        }
    }

    pub fn register_migration(&mut self, migration: Migration) {
        self.migrations.push(migration);
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    pub fn params(&self, ctx: &Context) -> Result<Params> {
        load(&*ctx.store, &keys::params())?
            .ok_or_else(|| StakingError::Corrupted("staking params not initialized".into()))
    }

    /// Genesis or governance parameter update.
    pub fn set_params(&self, ctx: &mut Context, params: &Params) -> Result<()> {
        params.validate()?;
        save(ctx.store, &keys::params(), params)
    }
}


#[cfg(test)]
mod tests {
    use super::testutil::*;
    use super::*;
    use bdl_core::store::MemStore;

    #[test]
    fn test_params_round_trip() {
        let (mut store, keeper) = setup();
        let ctx = Context::new(&mut store, 1, 0);
        assert_eq!(keeper.params(&ctx).unwrap(), test_params());
    }

    #[test]
    fn test_missing_params_is_fatal() {
        let mut store = MemStore::new();
        let ctx = Context::new(&mut store, 1, 0);
        let err = Keeper::new().params(&ctx).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (mut store, keeper) = setup();
        let mut ctx = Context::new(&mut store, 1, 0);
        let bad = Params {
            max_validators: 0,
            ..test_params()
        };
        assert!(keeper.set_params(&mut ctx, &bad).is_err());
        assert_eq!(keeper.params(&ctx).unwrap(), test_params());
    }

    #[test]
    fn test_context_atomically_rolls_back() {
        let (mut store, keeper) = setup();
        let mut ctx = Context::new(&mut store, 1, 0);
        let res: Result<()> = ctx.atomically(|inner| {
            fund(inner, &keeper, "alice", 10);
            Err(StakingError::NonPositiveAmount)
        });
        assert!(res.is_err());
        assert_eq!(balance(&ctx, &keeper, "alice"), 0);
    }
}
