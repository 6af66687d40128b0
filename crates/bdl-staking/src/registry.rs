// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - VALIDATOR REGISTRY
//
// Validator records keyed by operator, a consensus-address lookup, and the
// power index kept in step with every token change.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::keys;
use crate::power_index::PowerIndex;
use crate::types::{BondStatus, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::{load, load_all, save};
use bdl_core::{Result, StakingError};
use log::info;

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    pub fn get_validator(&self, ctx: &Context, operator: &str) -> Result<Option<Validator>> {
        load(&*ctx.store, &keys::validator(operator))
    }

    pub fn must_get_validator(&self, ctx: &Context, operator: &str) -> Result<Validator> {
        self.get_validator(ctx, operator)?
            .ok_or_else(|| StakingError::ValidatorNotFound(operator.to_string()))
    }

    pub fn get_validator_by_consensus_addr(
        &self,
        ctx: &Context,
        cons_addr: &str,
    ) -> Result<Option<Validator>> {
        let operator: Option<String> = load(&*ctx.store, &keys::validator_by_cons(cons_addr))?;
        match operator {
            Some(op) => {
                let v = self.get_validator(ctx, &op)?;
                if v.is_none() {
                    return Err(StakingError::Corrupted(format!(
                        "consensus address {} points at missing validator {}",
                        cons_addr, op
                    )));
                }
                Ok(v)
            }
            None => Ok(None),
        }
    }

    /// Write the record and its consensus-address lookup. Does not touch the
    /// power index; token changes go through `set_validator_tokens`.
    pub fn set_validator(&self, ctx: &mut Context, v: &Validator) -> Result<()> {
        save(ctx.store, &keys::validator(&v.operator), v)?;
        save(
            ctx.store,
            &keys::validator_by_cons(&v.consensus_address),
            &v.operator,
        )
    }

    /// Only an Unbonded validator holding no tokens can be removed.
    pub fn remove_validator(&self, ctx: &mut Context, operator: &str) -> Result<()> {
        let v = self.must_get_validator(ctx, operator)?;
        if v.status != BondStatus::Unbonded || v.tokens != 0 {
            return Err(StakingError::ValidatorNotRemovable(operator.to_string()));
        }
        PowerIndex::delete(ctx.store, &v)?;
        ctx.store.delete(&keys::validator_by_cons(&v.consensus_address))?;
        ctx.store.delete(&keys::validator(operator))?;
        ctx.store.delete(&keys::last_power(operator))?;
        info!("validator {} removed from registry", operator);
        Ok(())
    }

    pub fn all_validators(&self, ctx: &Context) -> Result<Vec<Validator>> {
        load_all(&*ctx.store, &[keys::VALIDATOR])
    }

    /// Operators in power order, highest first.
    pub fn validators_by_power(&self, ctx: &Context) -> Result<Vec<String>> {
        PowerIndex::ranked(&*ctx.store)
    }

    /// Replace `tokens`, re-keying the power index entry. Jailed validators
    /// stay out of the index.
    pub fn set_validator_tokens(&self, ctx: &mut Context, v: &mut Validator, tokens: u128) -> Result<()> {
        if !v.jailed {
            PowerIndex::delete(ctx.store, v)?;
        }
        if tokens != v.tokens {
            v.bond_height = ctx.height;
        }
        v.tokens = tokens;
        if !v.jailed {
            PowerIndex::insert(ctx.store, v)?;
        }
        self.set_validator(ctx, v)
    }

    /// Remove `v` if it is Unbonded with no tokens and no delegation records
    /// left. Returns whether it was removed.
    pub(crate) fn remove_if_empty(&self, ctx: &mut Context, v: &Validator) -> Result<bool> {
        if v.status != BondStatus::Unbonded || v.tokens != 0 {
            return Ok(false);
        }
        if !ctx
            .store
            .scan_prefix(&keys::delegations_of_validator(&v.operator))?
            .is_empty()
        {
            return Ok(false);
        }
        self.remove_validator(ctx, &v.operator)?;
        Ok(true)
    }
}
