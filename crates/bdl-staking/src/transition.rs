// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - VALIDATOR SET TRANSITION
//
// Runs once at the end of every block, after all transactions:
//   1. due migrations
//   2. matured delegator unbondings
//   3. matured validator unbondings (Unbonding -> Unbonded)
//   4. reward payout
//   5. removal of empty Unbonded validators left from earlier blocks
//   6. revaluation, eviction, ranking and the bonded-set diff
//
// The pass is total: any error aborts the block. It is also safe to re-run
// on the same state, since pool moves only happen on status changes.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::keys;
use crate::types::{BondStatus, Delegation, LastPower, PowerUpdate, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::{decode, read_str, save};
use bdl_core::{Result, StakingError, BONDED_POOL, NOT_BONDED_POOL};
use log::{debug, info};
use std::collections::BTreeMap;

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    /// Full end-of-block pass. Returns the power updates for consensus.
    pub fn end_block(&self, ctx: &mut Context) -> Result<Vec<PowerUpdate>> {
        ctx.atomically(|inner| {
            self.run_migrations(inner)?;
            let completed = self.dequeue_mature_unbondings(inner)?;
            let matured = self.dequeue_mature_validators(inner)?;
            self.apply_pay_rewards(inner)?;
            let pruned = self.prune_empty_validators(inner)?;
            let updates = self.apply_validator_set_updates(inner)?;
            debug!(
                "end of block {}: {} unbondings, {} validators matured, {} pruned, {} power updates",
                inner.height,
                completed,
                matured.len(),
                pruned,
                updates.len()
            );
            Ok(updates)
        })
        .map_err(StakingError::fatal)
    }

    /// Recompute the bonded set and return every changed voting power.
    pub fn apply_and_return_validator_set_updates(&self, ctx: &mut Context) -> Result<Vec<PowerUpdate>> {
        ctx.atomically(|inner| self.apply_validator_set_updates(inner))
            .map_err(StakingError::fatal)
    }

    /// Operators of the last committed bonded set with their powers.
    pub fn last_validator_powers(&self, ctx: &Context) -> Result<BTreeMap<String, LastPower>> {
        let mut out = BTreeMap::new();
        for (key, value) in ctx.store.scan_prefix(&[keys::LAST_POWER])? {
            let operator = read_str(&key, 1)
                .ok_or_else(|| StakingError::Corrupted("malformed last-power key".into()))?;
            out.insert(operator, decode::<LastPower>(&value)?);
        }
        Ok(out)
    }

    pub(crate) fn apply_validator_set_updates(&self, ctx: &mut Context) -> Result<Vec<PowerUpdate>> {
        let params = self.params(ctx)?;
        let cap = params.validator_cap(ctx.height) as usize;

        for mut v in self.all_validators(ctx)? {
            if v.jailed {
                continue;
            }
            self.recompute_tokens(ctx, &params, &mut v)?;
            self.evict_excess_delegations(ctx, &params, &mut v)?;
        }

        let mut bonded: Vec<Validator> = Vec::new();
        for operator in self.validators_by_power(ctx)? {
            if bonded.len() == cap {
                break;
            }
            let v = self.get_validator(ctx, &operator)?.ok_or_else(|| {
                StakingError::Corrupted(format!("power index names missing validator {}", operator))
            })?;
            if v.jailed {
                return Err(StakingError::InvariantViolation(format!(
                    "jailed validator {} in power index",
                    operator
                )));
            }
            if !v.is_rankable() {
                continue;
            }
            if v.potential_power(params.power_reduction) == 0 {
                break;
            }
            bonded.push(v);
        }

        let mut last = self.last_validator_powers(ctx)?;
        let mut updates = Vec::new();

        for mut v in bonded {
            if !v.is_bonded() {
                self.bond_validator(ctx, &mut v)?;
            }
            let power = v.potential_power(params.power_reduction);
            let previous = last.remove(&v.operator).map(|lp| lp.power);
            if previous != Some(power) {
                updates.push(PowerUpdate {
                    operator: v.operator.clone(),
                    consensus_pubkey: v.consensus_pubkey.clone(),
                    power,
                });
                save(
                    ctx.store,
                    &keys::last_power(&v.operator),
                    &LastPower {
                        consensus_pubkey: v.consensus_pubkey.clone(),
                        power,
                    },
                )?;
            }
        }

        // Whatever is left in `last` fell out of the set.
        for (operator, lp) in last {
            let mut v = self.get_validator(ctx, &operator)?.ok_or_else(|| {
                StakingError::Corrupted(format!("last power names missing validator {}", operator))
            })?;
            self.unbond_validator(ctx, &params, &mut v)?;
            ctx.store.delete(&keys::last_power(&operator))?;
            updates.push(PowerUpdate {
                operator,
                consensus_pubkey: lp.consensus_pubkey,
                power: 0,
            });
        }
        Ok(updates)
    }

    fn bond_validator(&self, ctx: &mut Context, v: &mut Validator) -> Result<()> {
        self.move_delegations_between_pools(ctx, &v.operator, NOT_BONDED_POOL, BONDED_POOL)?;
        if v.status == BondStatus::Unbonding {
            self.delete_validator_queue(ctx, v)?;
        }
        v.status = BondStatus::Bonded;
        self.set_validator(ctx, v)?;
        info!("validator {} bonded with {} tokens", v.operator, v.tokens);
        Ok(())
    }

    fn unbond_validator(&self, ctx: &mut Context, params: &bdl_core::params::Params, v: &mut Validator) -> Result<()> {
        if v.status != BondStatus::Bonded {
            return Err(StakingError::InvariantViolation(format!(
                "validator {} left the set without being bonded",
                v.operator
            )));
        }
        self.move_delegations_between_pools(ctx, &v.operator, BONDED_POOL, NOT_BONDED_POOL)?;
        if v.tokens == 0 {
            v.status = BondStatus::Unbonded;
            info!("validator {} left the set with no tokens", v.operator);
        } else {
            v.status = BondStatus::Unbonding;
            v.unbonding_height = ctx.height;
            v.unbonding_completion_time = ctx.time.saturating_add(params.unbonding_time_secs);
            self.insert_validator_queue(ctx, v)?;
            info!(
                "validator {} unbonding until {}",
                v.operator, v.unbonding_completion_time
            );
        }
        self.set_validator(ctx, v)
    }

    /// Remove Unbonded validators holding no tokens, handing back whatever
    /// principal their leftover delegation records still escrow.
    pub(crate) fn prune_empty_validators(&self, ctx: &mut Context) -> Result<usize> {
        let mut pruned = 0;
        for v in self.all_validators(ctx)? {
            if v.status != BondStatus::Unbonded || v.tokens != 0 {
                continue;
            }
            for d in self.delegations_of_validator(ctx, &v.operator)? {
                match &d {
                    Delegation::Fungible(f) => {
                        self.bank.transfer(ctx.store, v.pool(), &f.delegator, &f.coin)?
                    }
                    Delegation::Nft(n) => self.nft.transfer_sub_tokens(
                        ctx.store,
                        &n.denom,
                        &n.token_id,
                        v.pool(),
                        &n.delegator,
                        &n.sub_token_ids,
                    )?,
                }
                self.remove_delegation(ctx, &d)?;
            }
            self.remove_validator(ctx, &v.operator)?;
            pruned += 1;
        }
        Ok(pruned)
    }
}
