//! Whole-state consistency checks, run by tests and optionally by a node.
//! Each broken rule is reported as one message.
//!
//! `check_invariants` holds at every commit point, including between
//! transactions. The size caps (delegations per validator, bonded set) are
//! only restored by `end_block`, so they live in
//! `check_transition_invariants`.

use crate::keys;
use crate::types::{Delegation, UnbondingDelegation, UnbondingEntry};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::load_all;
use bdl_core::{Result, StakingError, BONDED_POOL, NOT_BONDED_POOL};
use std::collections::BTreeMap;

type Totals = BTreeMap<String, u128>;

fn add(totals: &mut Totals, denom: &str, amount: u128) {
    *totals.entry(denom.to_string()).or_default() += amount;
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    pub fn check_invariants(&self, ctx: &Context) -> Result<Vec<String>> {
        let params = self.params(ctx)?;
        let mut broken = Vec::new();
        let mut bonded_expect = Totals::new();
        let mut not_bonded_expect = Totals::new();

        let indexed = self.validators_by_power(ctx)?;
        for v in self.all_validators(ctx)? {
            if v.is_bonded() && v.jailed {
                broken.push(format!("validator {} is bonded while jailed", v.operator));
            }
            let is_indexed = indexed.contains(&v.operator);
            if v.jailed == is_indexed {
                broken.push(format!(
                    "validator {} jailed={} but power-indexed={}",
                    v.operator, v.jailed, is_indexed
                ));
            }

            let delegations = self.delegations_of_validator(ctx, &v.operator)?;
            let sum: u128 = delegations.iter().map(Delegation::base).sum();
            if sum != v.tokens {
                broken.push(format!(
                    "validator {} tokens {} != delegation bases {}",
                    v.operator, v.tokens, sum
                ));
            }
            for d in &delegations {
                match d {
                    Delegation::Fungible(f) => {
                        let totals = if v.is_bonded() {
                            &mut bonded_expect
                        } else {
                            &mut not_bonded_expect
                        };
                        add(totals, &f.coin.denom, f.coin.amount);
                    }
                    Delegation::Nft(n) => {
                        for &id in &n.sub_token_ids {
                            let owner = self
                                .nft
                                .sub_token(&*ctx.store, &n.denom, &n.token_id, id)?
                                .map(|t| t.owner);
                            if owner.as_deref() != Some(v.pool()) {
                                broken.push(format!(
                                    "sub-token {}/{}/{} delegated to {} is held by {:?}",
                                    n.denom, n.token_id, id, v.operator, owner
                                ));
                            }
                        }
                    }
                }
            }
        }

        let unbondings: Vec<UnbondingDelegation> = load_all(&*ctx.store, &[keys::UNBONDING])?;
        for ubd in &unbondings {
            for entry in &ubd.entries {
                match entry {
                    UnbondingEntry::Fungible { balance, .. } => {
                        add(&mut not_bonded_expect, &balance.denom, balance.amount)
                    }
                    UnbondingEntry::Nft {
                        denom,
                        token_id,
                        sub_token_ids,
                        ..
                    } => {
                        for &id in sub_token_ids {
                            let owner = self
                                .nft
                                .sub_token(&*ctx.store, denom, token_id, id)?
                                .map(|t| t.owner);
                            if owner.as_deref() != Some(NOT_BONDED_POOL) {
                                broken.push(format!(
                                    "unbonding sub-token {}/{}/{} is held by {:?}",
                                    denom, token_id, id, owner
                                ));
                            }
                        }
                    }
                }
            }
        }

        for (pool, expect) in [(BONDED_POOL, &bonded_expect), (NOT_BONDED_POOL, &not_bonded_expect)] {
            let mut denoms: Vec<&str> = expect.keys().map(String::as_str).collect();
            if !expect.contains_key(&params.bond_denom) {
                denoms.push(&params.bond_denom);
            }
            for denom in denoms {
                let want = expect.get(denom).copied().unwrap_or(0);
                let have = self.bank.balance(&*ctx.store, pool, denom)?;
                if have != want {
                    broken.push(format!("{} holds {}{} but backs {}{}", pool, have, denom, want, denom));
                }
            }
        }
        Ok(broken)
    }

    /// `check_invariants` plus the caps `end_block` enforces. Only meaningful
    /// right after an `end_block` at `ctx.height`.
    pub fn check_transition_invariants(&self, ctx: &Context) -> Result<Vec<String>> {
        let params = self.params(ctx)?;
        let mut broken = self.check_invariants(ctx)?;
        let mut bonded_count = 0usize;
        for v in self.all_validators(ctx)? {
            if v.is_bonded() {
                bonded_count += 1;
            }
            if v.jailed {
                continue;
            }
            let held = self.delegations_of_validator(ctx, &v.operator)?.len();
            if held > params.max_delegations as usize {
                broken.push(format!(
                    "validator {} holds {} delegations over the cap of {}",
                    v.operator, held, params.max_delegations
                ));
            }
        }
        let cap = params.validator_cap(ctx.height) as usize;
        if bonded_count > cap {
            broken.push(format!("{} bonded validators over the cap of {}", bonded_count, cap));
        }
        Ok(broken)
    }

    /// `check_invariants` as a fatal error carrying every report.
    pub fn assert_invariants(&self, ctx: &Context) -> Result<()> {
        into_violation(self.check_invariants(ctx)?)
    }

    pub fn assert_transition_invariants(&self, ctx: &Context) -> Result<()> {
        into_violation(self.check_transition_invariants(ctx)?)
    }
}

fn into_violation(broken: Vec<String>) -> Result<()> {
    if broken.is_empty() {
        Ok(())
    } else {
        Err(StakingError::InvariantViolation(broken.join("; ")))
    }
}
