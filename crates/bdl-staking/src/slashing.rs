// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - SLASHING ENGINE
//
// Proportional punishment of a validator's stake and of the unbonding
// entries that were still at risk when the infraction happened.
//
// Protocol misuse (negative factor, future infraction, slashing an Unbonded
// validator) is fatal: block processing must stop rather than commit.
// Every slash leaves a `SlashEvent` behind for audit.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::keys;
use crate::power_index::PowerIndex;
use crate::types::{BondStatus, Delegation, UnbondingEntry, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::formula;
use bdl_core::nft::NftRegistry;
use bdl_core::params::Params;
use bdl_core::store::{load_all, save, Key};
use bdl_core::{mul_div, Coin, Dec, Result, StakingError, NOT_BONDED_POOL};
use log::{info, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlashEvent {
    pub height: u64,
    pub operator: String,
    pub infraction_height: u64,
    pub factor: Dec,
    /// `floor(tokens * factor)` at the time of the slash.
    pub slash_amount: u128,
    /// Stake-equivalent value removed from live delegations.
    pub burned_stake: u128,
    /// Coin burned from unbonding entries, in raw units.
    pub burned_unbonding: u128,
}

/// Split `total` across `weights` proportionally, never giving a slot more
/// than its weight. `total` must not exceed the weight sum.
fn split_pro_rata(total: u128, weights: &[u128]) -> Vec<u128> {
    let sum: u128 = weights.iter().sum();
    if sum == 0 || total == 0 {
        return vec![0; weights.len()];
    }
    let mut shares: Vec<u128> = weights
        .iter()
        .map(|&w| mul_div(total, w, sum).unwrap_or(w).min(w))
        .collect();
    let mut rest = total.saturating_sub(shares.iter().sum());
    for (share, &w) in shares.iter_mut().zip(weights) {
        if rest == 0 {
            break;
        }
        let room = (w - *share).min(rest);
        *share += room;
        rest -= room;
    }
    shares
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    /// Slash the validator behind `cons_addr` by `factor` for an infraction
    /// at `infraction_height`. Commits atomically; every error is fatal.
    pub fn slash(
        &self,
        ctx: &mut Context,
        cons_addr: &str,
        infraction_height: u64,
        factor: Dec,
    ) -> Result<Option<SlashEvent>> {
        ctx.atomically(|inner| self.apply_slash(inner, cons_addr, infraction_height, factor))
            .map_err(StakingError::fatal)
    }

    pub(crate) fn apply_slash(
        &self,
        ctx: &mut Context,
        cons_addr: &str,
        infraction_height: u64,
        factor: Dec,
    ) -> Result<Option<SlashEvent>> {
        if factor.is_negative() {
            return Err(StakingError::NegativeSlashFactor(factor.to_string()));
        }
        if infraction_height > ctx.height {
            return Err(StakingError::FutureInfraction {
                infraction: infraction_height,
                current: ctx.height,
            });
        }
        let Some(mut validator) = self.get_validator_by_consensus_addr(ctx, cons_addr)? else {
            warn!("slash of unknown consensus address {} ignored", cons_addr);
            return Ok(None);
        };
        if validator.status == BondStatus::Unbonded {
            return Err(StakingError::SlashUnbonded(validator.operator));
        }

        let params = self.params(ctx)?;
        let before = validator.tokens;
        let slash_amount = factor.mul_trunc(before);

        self.slash_delegations(ctx, &params, &mut validator, factor)?;

        // Nothing can have started unbonding from an infraction in this block.
        let burned_unbonding = if infraction_height < ctx.height {
            self.slash_unbondings(ctx, &params, &validator.operator, infraction_height, factor)?
        } else {
            0
        };

        let event = SlashEvent {
            height: ctx.height,
            operator: validator.operator.clone(),
            infraction_height,
            factor,
            slash_amount,
            burned_stake: before - validator.tokens,
            burned_unbonding,
        };
        self.record_slash_event(ctx, &event)?;
        info!(
            "slashed {} by {}: stake -{} unbonding -{}",
            event.operator, factor, event.burned_stake, event.burned_unbonding
        );
        Ok(Some(event))
    }

    /// Burn `coin` out of `pool`, first pulling the matching reserve out of
    /// its curve so the remaining supply keeps its price.
    fn burn_from_pool(&self, ctx: &mut Context, params: &Params, pool: &str, coin: &Coin) -> Result<()> {
        if coin.is_zero() {
            return Ok(());
        }
        if coin.denom != params.bond_denom {
            self.shrink_curve(ctx, coin)?;
        }
        self.bank.burn(ctx.store, pool, coin)
    }

    fn shrink_curve(&self, ctx: &mut Context, coin: &Coin) -> Result<()> {
        let mut info = self.coins.get_coin(&*ctx.store, &coin.denom)?;
        let reserve_out = formula::sale_return(info.supply, info.reserve, info.crr, coin.amount);
        info.supply = info.supply.saturating_sub(coin.amount);
        info.reserve = info.reserve.saturating_sub(reserve_out);
        self.coins.set_coin(ctx.store, &info)
    }

    fn slash_delegations(
        &self,
        ctx: &mut Context,
        params: &Params,
        validator: &mut Validator,
        factor: Dec,
    ) -> Result<()> {
        let pool = validator.pool();
        let mut tokens = validator.tokens;
        for d in self.delegations_of_validator(ctx, &validator.operator)? {
            let old_base = d.base();
            let updated = match d {
                Delegation::Fungible(mut f) => {
                    let burn = factor.mul_trunc(f.coin.amount).min(f.coin.amount);
                    let burned = Coin::new(f.coin.denom.clone(), burn);
                    self.burn_from_pool(ctx, params, pool, &burned)?;
                    f.coin.amount -= burn;
                    f.base = self.slashed_base(ctx, params, &f.coin, old_base, factor)?;
                    Delegation::Fungible(f)
                }
                Delegation::Nft(mut n) => {
                    let mut burned = 0u128;
                    for &id in &n.sub_token_ids {
                        let reserve = self.nft.reserve(&*ctx.store, &n.denom, &n.token_id, id)?;
                        let burn = factor.mul_trunc(reserve.amount).min(reserve.amount);
                        if burn == 0 {
                            continue;
                        }
                        if reserve.denom != params.bond_denom {
                            self.shrink_curve(ctx, &Coin::new(reserve.denom.clone(), burn))?;
                        }
                        self.nft.reduce_reserve(ctx.store, &self.bank, &n.denom, &n.token_id, id, burn)?;
                        burned += burn;
                    }
                    n.coin.amount = n.coin.amount.saturating_sub(burned);
                    n.base = self.slashed_base(ctx, params, &n.coin, old_base, factor)?;
                    Delegation::Nft(n)
                }
            };
            tokens = tokens
                .checked_sub(old_base - updated.base())
                .ok_or_else(|| StakingError::InvariantViolation("slash below zero tokens".into()))?;
            self.set_delegation(ctx, &updated)?;
        }
        self.set_validator_tokens(ctx, validator, tokens)
    }

    /// Value of what is left after a burn, bounded so a single delegation
    /// never loses more than `factor` of its cached base.
    fn slashed_base(&self, ctx: &Context, params: &Params, left: &Coin, old_base: u128, factor: Dec) -> Result<u128> {
        let valued = self.base_value(ctx, params, left)?;
        let floor = old_base - factor.mul_trunc(old_base).min(old_base);
        Ok(valued.max(floor).min(old_base))
    }

    /// Burn from entries created at or after `infraction_height` that are
    /// still pending. Returns the raw amount burned.
    fn slash_unbondings(
        &self,
        ctx: &mut Context,
        params: &Params,
        operator: &str,
        infraction_height: u64,
        factor: Dec,
    ) -> Result<u128> {
        let now = ctx.time;
        let mut total = 0u128;
        for mut ubd in self.unbondings_of_validator(ctx, operator)? {
            let mut changed = false;
            for entry in ubd.entries.iter_mut() {
                if entry.creation_height() < infraction_height || entry.is_mature(now) {
                    continue;
                }
                let burned = match entry {
                    UnbondingEntry::Fungible {
                        initial_balance,
                        balance,
                        ..
                    } => {
                        let burn = factor.mul_trunc(initial_balance.amount).min(balance.amount);
                        let coin = Coin::new(balance.denom.clone(), burn);
                        self.burn_from_pool(ctx, params, NOT_BONDED_POOL, &coin)?;
                        balance.amount -= burn;
                        burn
                    }
                    UnbondingEntry::Nft {
                        denom,
                        token_id,
                        sub_token_ids,
                        initial_balance,
                        balance,
                        ..
                    } => {
                        let burn = factor.mul_trunc(initial_balance.amount).min(balance.amount);
                        let mut reserves = Vec::with_capacity(sub_token_ids.len());
                        for &id in sub_token_ids.iter() {
                            reserves.push(self.nft.reserve(&*ctx.store, denom, token_id, id)?.amount);
                        }
                        let burn = burn.min(reserves.iter().sum());
                        let shares = split_pro_rata(burn, &reserves);
                        for (&id, &share) in sub_token_ids.iter().zip(&shares) {
                            if balance.denom != params.bond_denom && share > 0 {
                                self.shrink_curve(ctx, &Coin::new(balance.denom.clone(), share))?;
                            }
                            self.nft.reduce_reserve(ctx.store, &self.bank, denom, token_id, id, share)?;
                        }
                        balance.amount -= burn;
                        burn
                    }
                };
                if burned > 0 {
                    total += burned;
                    changed = true;
                }
            }
            if changed {
                self.set_unbonding(ctx, &ubd)?;
            }
        }
        Ok(total)
    }

    fn record_slash_event(&self, ctx: &mut Context, event: &SlashEvent) -> Result<()> {
        let at_height = Key::new(keys::SLASH_EVENT)
            .str(&event.operator)
            .u64(event.height)
            .build();
        let seq = ctx.store.scan_prefix(&at_height)?.len() as u64;
        save(
            ctx.store,
            &keys::slash_event(&event.operator, event.height, seq),
            event,
        )
    }

    pub fn slash_events(&self, ctx: &Context, operator: &str) -> Result<Vec<SlashEvent>> {
        load_all(&*ctx.store, &keys::slash_events_of(operator))
    }

    // ─────────────────────────────────────────────────────────────────
    // JAIL
    // ─────────────────────────────────────────────────────────────────

    pub(crate) fn jail_validator(&self, ctx: &mut Context, v: &mut Validator) -> Result<()> {
        if v.jailed {
            return Err(StakingError::ValidatorJailed(v.operator.clone()));
        }
        PowerIndex::delete(ctx.store, v)?;
        v.jailed = true;
        v.online = false;
        self.set_validator(ctx, v)?;
        info!("validator {} jailed", v.operator);
        Ok(())
    }

    /// Clears the flag only; the validator must come back online and win a
    /// slot in a later transition pass to bond again.
    pub(crate) fn unjail_validator(&self, ctx: &mut Context, v: &mut Validator) -> Result<()> {
        if !v.jailed {
            return Err(StakingError::ValidatorNotJailed(v.operator.clone()));
        }
        v.jailed = false;
        PowerIndex::insert(ctx.store, v)?;
        self.set_validator(ctx, v)?;
        info!("validator {} unjailed", v.operator);
        Ok(())
    }

    /// Jail the validator behind `cons_addr`. Unknown addresses are ignored.
    pub fn jail(&self, ctx: &mut Context, cons_addr: &str) -> Result<()> {
        ctx.atomically(|inner| {
            match self.get_validator_by_consensus_addr(inner, cons_addr)? {
                Some(mut v) => self.jail_validator(inner, &mut v),
                None => Ok(()),
            }
        })
    }
}
