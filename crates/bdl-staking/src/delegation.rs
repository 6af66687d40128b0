// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - DELEGATION LEDGER
//
// Fungible and NFT-collateral delegations, each caching its stake-equivalent
// value (`base`). A validator's tokens are always the sum of those caches:
// every mutation applies `tokens = tokens - old_base + new_base`.
//
// - native coin counts at face value
// - curve coins count at their sale return against the live curve
// - an NFT delegation counts at its sub-tokens' aggregate reserve
//
// Over-subscribed validators are trimmed by `evict_excess_delegations`, run
// from the end-of-block pass, never from the delegate path.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::keys;
use crate::types::{Delegation, FungibleDelegation, NftDelegation, UnbondingEntry, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::formula;
use bdl_core::nft::NftRegistry;
use bdl_core::params::Params;
use bdl_core::store::{decode, load, save};
use bdl_core::{Coin, Result, StakingError, BONDED_POOL, NOT_BONDED_POOL};
use log::info;

/// Where delegated principal comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegationSource {
    /// The delegator's free balance.
    Account,
    /// Already escrowed in a pool; `bonded` names which one.
    Pool { bonded: bool },
}

impl DelegationSource {
    fn account<'a>(&self, delegator: &'a str) -> &'a str {
        match self {
            DelegationSource::Account => delegator,
            DelegationSource::Pool { bonded: true } => BONDED_POOL,
            DelegationSource::Pool { bonded: false } => NOT_BONDED_POOL,
        }
    }
}

fn rebase(tokens: u128, old_base: u128, new_base: u128) -> Result<u128> {
    tokens
        .checked_sub(old_base)
        .and_then(|t| t.checked_add(new_base))
        .ok_or_else(|| {
            StakingError::InvariantViolation(format!(
                "validator tokens {} below delegation base {}",
                tokens, old_base
            ))
        })
}

fn check_sub_token_ids(ids: &[u64]) -> Result<Vec<u64>> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    if sorted.is_empty() || sorted.len() != ids.len() {
        return Err(StakingError::InvalidSubTokens);
    }
    Ok(sorted)
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    /// Stake-equivalent value of `coin` in the bond denom.
    pub fn base_value(&self, ctx: &Context, params: &Params, coin: &Coin) -> Result<u128> {
        if coin.denom == params.bond_denom || coin.is_zero() {
            return Ok(coin.amount);
        }
        let info = self.coins.get_coin(&*ctx.store, &coin.denom)?;
        Ok(formula::sale_return(info.supply, info.reserve, info.crr, coin.amount))
    }

    // ─────────────────────────────────────────────────────────────────
    // RECORDS
    // ─────────────────────────────────────────────────────────────────

    pub fn get_delegation(
        &self,
        ctx: &Context,
        delegator: &str,
        validator: &str,
        denom: &str,
    ) -> Result<Option<FungibleDelegation>> {
        load(&*ctx.store, &keys::delegation(delegator, validator, denom))
    }

    pub fn get_nft_delegation(
        &self,
        ctx: &Context,
        delegator: &str,
        validator: &str,
        token_id: &str,
        denom: &str,
    ) -> Result<Option<NftDelegation>> {
        load(
            &*ctx.store,
            &keys::nft_delegation(delegator, validator, token_id, denom),
        )
    }

    pub(crate) fn set_delegation(&self, ctx: &mut Context, d: &Delegation) -> Result<()> {
        let (primary, index) = match d {
            Delegation::Fungible(f) => {
                save(
                    ctx.store,
                    &keys::delegation(&f.delegator, &f.validator, &f.coin.denom),
                    f,
                )?;
                (
                    keys::delegation(&f.delegator, &f.validator, &f.coin.denom),
                    keys::delegation_by_validator(&f.validator, &f.delegator, &f.coin.denom),
                )
            }
            Delegation::Nft(n) => {
                save(
                    ctx.store,
                    &keys::nft_delegation(&n.delegator, &n.validator, &n.token_id, &n.denom),
                    n,
                )?;
                (
                    keys::nft_delegation(&n.delegator, &n.validator, &n.token_id, &n.denom),
                    keys::nft_delegation_by_validator(
                        &n.validator,
                        &n.delegator,
                        &n.token_id,
                        &n.denom,
                    ),
                )
            }
        };
        ctx.store.set(&index, primary)
    }

    pub(crate) fn remove_delegation(&self, ctx: &mut Context, d: &Delegation) -> Result<()> {
        match d {
            Delegation::Fungible(f) => {
                ctx.store
                    .delete(&keys::delegation(&f.delegator, &f.validator, &f.coin.denom))?;
                ctx.store.delete(&keys::delegation_by_validator(
                    &f.validator,
                    &f.delegator,
                    &f.coin.denom,
                ))
            }
            Delegation::Nft(n) => {
                ctx.store.delete(&keys::nft_delegation(
                    &n.delegator,
                    &n.validator,
                    &n.token_id,
                    &n.denom,
                ))?;
                ctx.store.delete(&keys::nft_delegation_by_validator(
                    &n.validator,
                    &n.delegator,
                    &n.token_id,
                    &n.denom,
                ))
            }
        }
    }

    /// Every delegation to `validator`, fungible and NFT, in index key order.
    pub fn delegations_of_validator(&self, ctx: &Context, validator: &str) -> Result<Vec<Delegation>> {
        let mut out = Vec::new();
        for (_, primary) in ctx
            .store
            .scan_prefix(&keys::delegations_of_validator(validator))?
        {
            let bytes = ctx.store.get(&primary)?.ok_or_else(|| {
                StakingError::Corrupted(format!("dangling delegation index for {}", validator))
            })?;
            let d = match primary.first() {
                Some(&keys::DELEGATION) => Delegation::Fungible(decode(&bytes)?),
                Some(&keys::NFT_DELEGATION) => Delegation::Nft(decode(&bytes)?),
                _ => {
                    return Err(StakingError::Corrupted(
                        "delegation index points outside delegation records".into(),
                    ))
                }
            };
            out.push(d);
        }
        Ok(out)
    }

    pub fn delegations_of_delegator(&self, ctx: &Context, delegator: &str) -> Result<Vec<Delegation>> {
        let fungible_prefix = bdl_core::store::Key::new(keys::DELEGATION).str(delegator).build();
        let nft_prefix = bdl_core::store::Key::new(keys::NFT_DELEGATION).str(delegator).build();
        let mut out = Vec::new();
        for (_, v) in ctx.store.scan_prefix(&fungible_prefix)? {
            out.push(Delegation::Fungible(decode(&v)?));
        }
        for (_, v) in ctx.store.scan_prefix(&nft_prefix)? {
            out.push(Delegation::Nft(decode(&v)?));
        }
        Ok(out)
    }

    // ─────────────────────────────────────────────────────────────────
    // FUNGIBLE
    // ─────────────────────────────────────────────────────────────────

    /// Add `coin` to the delegator's delegation and the validator's tokens.
    /// Returns the stake-equivalent value credited.
    pub fn delegate_coin(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        coin: &Coin,
        validator: &mut Validator,
        source: DelegationSource,
    ) -> Result<u128> {
        let existing = self.get_delegation(ctx, delegator, &validator.operator, &coin.denom)?;
        let total = match &existing {
            Some(d) => d
                .coin
                .checked_add(coin.amount)
                .ok_or(StakingError::Overflow("delegation amount"))?,
            None => coin.clone(),
        };
        let new_base = self.base_value(ctx, params, &total)?;
        let old_base = existing.as_ref().map_or(0, |d| d.base);
        let tokens = rebase(validator.tokens, old_base, new_base)?;

        self.bank
            .transfer(ctx.store, source.account(delegator), validator.pool(), coin)?;

        let record = FungibleDelegation {
            delegator: delegator.to_string(),
            validator: validator.operator.clone(),
            coin: total,
            base: new_base,
        };
        self.set_delegation(ctx, &Delegation::Fungible(record))?;
        self.set_validator_tokens(ctx, validator, tokens)?;
        Ok(new_base.saturating_sub(old_base))
    }

    /// Remove `coin` from a delegation, keeping the coin in its pool.
    /// Returns the stake-equivalent value removed. May remove the validator
    /// if this emptied an Unbonded one.
    pub fn unbond_coin(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        validator: &mut Validator,
        coin: &Coin,
    ) -> Result<u128> {
        let mut d = self
            .get_delegation(ctx, delegator, &validator.operator, &coin.denom)?
            .ok_or_else(|| StakingError::DelegationNotFound {
                delegator: delegator.to_string(),
                denom: coin.denom.clone(),
            })?;
        if d.coin.amount < coin.amount {
            return Err(StakingError::InsufficientDelegation {
                have: d.coin.amount,
                requested: coin.amount,
            });
        }

        d.coin.amount -= coin.amount;
        let new_base = self.base_value(ctx, params, &d.coin)?;
        let old_base = d.base;
        let tokens = rebase(validator.tokens, old_base, new_base)?;
        d.base = new_base;

        let record = Delegation::Fungible(d);
        if record.coin().is_zero() {
            self.remove_delegation(ctx, &record)?;
        } else {
            self.set_delegation(ctx, &record)?;
        }
        self.set_validator_tokens(ctx, validator, tokens)?;
        self.remove_if_empty(ctx, validator)?;
        Ok(old_base.saturating_sub(new_base))
    }

    /// Unbond `coin` and queue it for release after the unbonding time.
    /// Returns the completion time.
    pub fn undelegate_coin(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        validator_addr: &str,
        coin: &Coin,
    ) -> Result<u64> {
        let mut validator = self.must_get_validator(ctx, validator_addr)?;
        self.check_entry_capacity(ctx, params, delegator, validator_addr)?;

        let was_bonded = validator.is_bonded();
        self.unbond_coin(ctx, params, delegator, &mut validator, coin)?;
        if was_bonded {
            self.bank
                .transfer(ctx.store, BONDED_POOL, NOT_BONDED_POOL, coin)?;
        }

        let completion_time = ctx.time.saturating_add(params.unbonding_time_secs);
        let entry = UnbondingEntry::Fungible {
            creation_height: ctx.height,
            completion_time,
            initial_balance: coin.clone(),
            balance: coin.clone(),
        };
        self.push_unbonding_entry(ctx, delegator, validator_addr, entry)?;
        Ok(completion_time)
    }

    /// Move part of a pending fungible unbonding entry back into the
    /// delegation it came from.
    pub fn cancel_unbonding_entry(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        validator_addr: &str,
        creation_height: u64,
        coin: &Coin,
    ) -> Result<u128> {
        let mut validator = self.must_get_validator(ctx, validator_addr)?;
        let mut ubd = self
            .get_unbonding(ctx, delegator, validator_addr)?
            .ok_or(StakingError::UnbondingEntryNotFound)?;

        let pos = ubd
            .entries
            .iter()
            .position(|e| {
                matches!(e, UnbondingEntry::Fungible { creation_height: h, balance, .. }
                    if *h == creation_height && balance.denom == coin.denom)
            })
            .ok_or(StakingError::UnbondingEntryNotFound)?;

        let emptied = match &mut ubd.entries[pos] {
            UnbondingEntry::Fungible {
                completion_time,
                initial_balance,
                balance,
                ..
            } => {
                if *completion_time <= ctx.time {
                    return Err(StakingError::UnbondingEntryMatured);
                }
                if balance.amount < coin.amount {
                    return Err(StakingError::InsufficientDelegation {
                        have: balance.amount,
                        requested: coin.amount,
                    });
                }
                balance.amount -= coin.amount;
                initial_balance.amount = initial_balance.amount.saturating_sub(coin.amount);
                balance.is_zero()
            }
            UnbondingEntry::Nft { .. } => return Err(StakingError::UnbondingEntryNotFound),
        };
        if emptied {
            ubd.entries.remove(pos);
        }
        self.set_unbonding(ctx, &ubd)?;

        self.delegate_coin(
            ctx,
            params,
            delegator,
            coin,
            &mut validator,
            DelegationSource::Pool { bonded: false },
        )
    }

    // ─────────────────────────────────────────────────────────────────
    // NFT COLLATERAL
    // ─────────────────────────────────────────────────────────────────

    fn sub_token_reserves(&self, ctx: &Context, denom: &str, token_id: &str, ids: &[u64]) -> Result<Coin> {
        let mut total: Option<Coin> = None;
        for &id in ids {
            let r = self.nft.reserve(&*ctx.store, denom, token_id, id)?;
            total = Some(match total {
                None => r,
                Some(t) if t.denom == r.denom => t
                    .checked_add(r.amount)
                    .ok_or(StakingError::Overflow("sub-token reserve"))?,
                Some(_) => return Err(StakingError::MixedReserveDenoms),
            });
        }
        total.ok_or(StakingError::InvalidSubTokens)
    }

    /// Delegate sub-tokens of one NFT. Returns the stake-equivalent value credited.
    #[allow(clippy::too_many_arguments)]
    pub fn delegate_sub_tokens(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        validator: &mut Validator,
        denom: &str,
        token_id: &str,
        ids: &[u64],
        source: DelegationSource,
    ) -> Result<u128> {
        let ids = check_sub_token_ids(ids)?;
        let added = self.sub_token_reserves(ctx, denom, token_id, &ids)?;

        let existing =
            self.get_nft_delegation(ctx, delegator, &validator.operator, token_id, denom)?;
        let (mut sub_token_ids, coin, old_base) = match existing {
            Some(d) => {
                if d.coin.denom != added.denom {
                    return Err(StakingError::MixedReserveDenoms);
                }
                if ids.iter().any(|id| d.sub_token_ids.contains(id)) {
                    return Err(StakingError::InvalidSubTokens);
                }
                let coin = d
                    .coin
                    .checked_add(added.amount)
                    .ok_or(StakingError::Overflow("nft delegation reserve"))?;
                (d.sub_token_ids, coin, d.base)
            }
            None => (Vec::new(), added, 0),
        };
        let new_base = self.base_value(ctx, params, &coin)?;
        let tokens = rebase(validator.tokens, old_base, new_base)?;

        self.nft.transfer_sub_tokens(
            ctx.store,
            denom,
            token_id,
            source.account(delegator),
            validator.pool(),
            &ids,
        )?;

        sub_token_ids.extend_from_slice(&ids);
        sub_token_ids.sort_unstable();
        let record = NftDelegation {
            delegator: delegator.to_string(),
            validator: validator.operator.clone(),
            denom: denom.to_string(),
            token_id: token_id.to_string(),
            sub_token_ids,
            coin,
            base: new_base,
        };
        self.set_delegation(ctx, &Delegation::Nft(record))?;
        self.set_validator_tokens(ctx, validator, tokens)?;
        Ok(new_base.saturating_sub(old_base))
    }

    /// Detach sub-tokens from an NFT delegation, leaving them in their pool.
    /// Returns the reserve that left the delegation.
    #[allow(clippy::too_many_arguments)]
    pub fn unbond_sub_tokens(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        validator: &mut Validator,
        denom: &str,
        token_id: &str,
        ids: &[u64],
    ) -> Result<Coin> {
        let ids = check_sub_token_ids(ids)?;
        let mut d = self
            .get_nft_delegation(ctx, delegator, &validator.operator, token_id, denom)?
            .ok_or_else(|| StakingError::DelegationNotFound {
                delegator: delegator.to_string(),
                denom: denom.to_string(),
            })?;
        if let Some(&missing) = ids.iter().find(|id| !d.sub_token_ids.contains(id)) {
            return Err(StakingError::SubTokenNotOwned {
                denom: denom.to_string(),
                token_id: token_id.to_string(),
                sub_token_id: missing,
                owner: delegator.to_string(),
            });
        }

        let removed = self.sub_token_reserves(ctx, denom, token_id, &ids)?;
        d.coin = d.coin.checked_sub(removed.amount).ok_or_else(|| {
            StakingError::InvariantViolation("nft delegation reserve below sub-token reserves".into())
        })?;
        d.sub_token_ids.retain(|id| !ids.contains(id));
        let new_base = if d.sub_token_ids.is_empty() {
            0
        } else {
            self.base_value(ctx, params, &d.coin)?
        };
        let tokens = rebase(validator.tokens, d.base, new_base)?;
        d.base = new_base;

        let record = Delegation::Nft(d);
        match &record {
            Delegation::Nft(n) if n.sub_token_ids.is_empty() => self.remove_delegation(ctx, &record)?,
            _ => self.set_delegation(ctx, &record)?,
        }
        self.set_validator_tokens(ctx, validator, tokens)?;
        self.remove_if_empty(ctx, validator)?;
        Ok(removed)
    }

    /// Unbond sub-tokens and queue them for return. Returns the completion time.
    #[allow(clippy::too_many_arguments)]
    pub fn undelegate_sub_tokens(
        &self,
        ctx: &mut Context,
        params: &Params,
        delegator: &str,
        validator_addr: &str,
        denom: &str,
        token_id: &str,
        ids: &[u64],
    ) -> Result<u64> {
        let mut validator = self.must_get_validator(ctx, validator_addr)?;
        self.check_entry_capacity(ctx, params, delegator, validator_addr)?;

        let was_bonded = validator.is_bonded();
        let removed = self.unbond_sub_tokens(
            ctx,
            params,
            delegator,
            &mut validator,
            denom,
            token_id,
            ids,
        )?;
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        if was_bonded {
            self.nft.transfer_sub_tokens(
                ctx.store,
                denom,
                token_id,
                BONDED_POOL,
                NOT_BONDED_POOL,
                &ids,
            )?;
        }

        let completion_time = ctx.time.saturating_add(params.unbonding_time_secs);
        let entry = UnbondingEntry::Nft {
            creation_height: ctx.height,
            completion_time,
            denom: denom.to_string(),
            token_id: token_id.to_string(),
            sub_token_ids: ids,
            initial_balance: removed.clone(),
            balance: removed,
        };
        self.push_unbonding_entry(ctx, delegator, validator_addr, entry)?;
        Ok(completion_time)
    }

    // ─────────────────────────────────────────────────────────────────
    // BLOCK-END MAINTENANCE
    // ─────────────────────────────────────────────────────────────────

    /// Refresh every cached base value of `validator` against current curves
    /// and reset its tokens to their sum.
    pub(crate) fn recompute_tokens(&self, ctx: &mut Context, params: &Params, validator: &mut Validator) -> Result<()> {
        let mut total: u128 = 0;
        for d in self.delegations_of_validator(ctx, &validator.operator)? {
            let fresh = self.base_value(ctx, params, d.coin())?;
            if fresh != d.base() {
                let updated = match d {
                    Delegation::Fungible(mut f) => {
                        f.base = fresh;
                        Delegation::Fungible(f)
                    }
                    Delegation::Nft(mut n) => {
                        n.base = fresh;
                        Delegation::Nft(n)
                    }
                };
                self.set_delegation(ctx, &updated)?;
            }
            total = total
                .checked_add(fresh)
                .ok_or(StakingError::Overflow("validator tokens"))?;
        }
        if total != validator.tokens {
            self.set_validator_tokens(ctx, validator, total)?;
        }
        Ok(())
    }

    /// Keep the `max_delegations` highest-value delegations of `validator`
    /// and return the principal of the rest straight to their delegators.
    /// Ties keep index key order. Returns the evicted records.
    pub(crate) fn evict_excess_delegations(
        &self,
        ctx: &mut Context,
        params: &Params,
        validator: &mut Validator,
    ) -> Result<Vec<Delegation>> {
        let mut all = self.delegations_of_validator(ctx, &validator.operator)?;
        let cap = params.max_delegations as usize;
        if all.len() <= cap {
            return Ok(Vec::new());
        }
        all.sort_by(|a, b| b.base().cmp(&a.base()));
        let evicted = all.split_off(cap);

        for d in &evicted {
            match d {
                Delegation::Fungible(f) => {
                    self.unbond_coin(ctx, params, &f.delegator, validator, &f.coin)?;
                    self.bank
                        .transfer(ctx.store, validator.pool(), &f.delegator, &f.coin)?;
                }
                Delegation::Nft(n) => {
                    self.unbond_sub_tokens(
                        ctx,
                        params,
                        &n.delegator,
                        validator,
                        &n.denom,
                        &n.token_id,
                        &n.sub_token_ids,
                    )?;
                    self.nft.transfer_sub_tokens(
                        ctx.store,
                        &n.denom,
                        &n.token_id,
                        validator.pool(),
                        &n.delegator,
                        &n.sub_token_ids,
                    )?;
                }
            }
            info!(
                "evicted delegation of {} from {} (base {})",
                d.delegator(),
                validator.operator,
                d.base()
            );
        }
        Ok(evicted)
    }

    /// Move the escrowed principal of every delegation to `validator` from
    /// one pool to the other.
    pub(crate) fn move_delegations_between_pools(
        &self,
        ctx: &mut Context,
        validator: &str,
        from: &str,
        to: &str,
    ) -> Result<()> {
        for d in self.delegations_of_validator(ctx, validator)? {
            match &d {
                Delegation::Fungible(f) => self.bank.transfer(ctx.store, from, to, &f.coin)?,
                Delegation::Nft(n) => self.nft.transfer_sub_tokens(
                    ctx.store,
                    &n.denom,
                    &n.token_id,
                    from,
                    to,
                    &n.sub_token_ids,
                )?,
            }
        }
        Ok(())
    }
}
