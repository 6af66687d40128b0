// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - TRANSACTION HANDLERS
//
// Entry points for user transactions. Each validates its inputs, then runs
// in its own commit unit: a rejected transaction leaves no trace.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::delegation::DelegationSource;
use crate::types::{consensus_address, BondStatus, Description, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::MAX_SEGMENT_LEN;
use bdl_core::{Coin, Dec, Result, StakingError};
use log::info;

fn require_address(field: &'static str, addr: &str) -> Result<()> {
    if addr.trim().is_empty() {
        return Err(StakingError::EmptyAddress(field));
    }
    require_bounded(field, addr)
}

/// Non-empty and short enough to sit in a store key.
fn require_segment(field: &'static str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(StakingError::EmptyField(field));
    }
    require_bounded(field, s)
}

fn require_bounded(field: &'static str, s: &str) -> Result<()> {
    if s.len() > MAX_SEGMENT_LEN {
        return Err(StakingError::SegmentTooLong {
            field,
            len: s.len(),
            max: MAX_SEGMENT_LEN,
        });
    }
    Ok(())
}

fn require_positive(coin: &Coin) -> Result<()> {
    if coin.is_zero() {
        return Err(StakingError::NonPositiveAmount);
    }
    require_segment("denom", &coin.denom)
}

fn require_commission(rate: Dec) -> Result<()> {
    if rate.is_negative() || rate > Dec::ONE {
        return Err(StakingError::InvalidCommission(rate.to_string()));
    }
    Ok(())
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    /// Register a new validator, self-delegating `stake` from the operator's
    /// account. It starts Unbonded and offline.
    #[allow(clippy::too_many_arguments)]
    pub fn declare_candidate(
        &self,
        ctx: &mut Context,
        operator: &str,
        consensus_pubkey: &str,
        reward_address: &str,
        commission: Dec,
        description: Description,
        stake: Coin,
    ) -> Result<()> {
        require_address("operator", operator)?;
        require_address("reward_address", reward_address)?;
        require_commission(commission)?;
        require_positive(&stake)?;
        let consensus_address = consensus_address(consensus_pubkey)?;

        ctx.atomically(|inner| {
            if self.get_validator(inner, operator)?.is_some() {
                return Err(StakingError::ValidatorExists(operator.to_string()));
            }
            if self
                .get_validator_by_consensus_addr(inner, &consensus_address)?
                .is_some()
            {
                return Err(StakingError::ConsensusKeyInUse(consensus_pubkey.to_string()));
            }
            let params = self.params(inner)?;
            let mut validator = Validator {
                operator: operator.to_string(),
                consensus_pubkey: consensus_pubkey.to_string(),
                consensus_address,
                reward_address: reward_address.to_string(),
                description,
                commission,
                tokens: 0,
                status: BondStatus::Unbonded,
                jailed: false,
                online: false,
                unbonding_height: 0,
                unbonding_completion_time: 0,
                bond_height: inner.height,
                accum_rewards: 0,
            };
            self.set_validator(inner, &validator)?;
            self.delegate_coin(
                inner,
                &params,
                operator,
                &stake,
                &mut validator,
                DelegationSource::Account,
            )?;
            info!("validator {} declared with {}", operator, stake);
            Ok(())
        })
    }

    pub fn edit_candidate(
        &self,
        ctx: &mut Context,
        operator: &str,
        reward_address: Option<&str>,
        commission: Option<Dec>,
        description: Option<Description>,
    ) -> Result<()> {
        require_address("operator", operator)?;
        if let Some(addr) = reward_address {
            require_address("reward_address", addr)?;
        }
        if let Some(rate) = commission {
            require_commission(rate)?;
        }
        ctx.atomically(|inner| {
            let mut v = self.must_get_validator(inner, operator)?;
            if let Some(addr) = reward_address {
                v.reward_address = addr.to_string();
            }
            if let Some(rate) = commission {
                v.commission = rate;
            }
            if let Some(d) = description {
                v.description = d;
            }
            self.set_validator(inner, &v)
        })
    }

    pub fn set_online(&self, ctx: &mut Context, operator: &str) -> Result<()> {
        require_address("operator", operator)?;
        ctx.atomically(|inner| {
            let mut v = self.must_get_validator(inner, operator)?;
            if v.jailed {
                return Err(StakingError::ValidatorJailed(operator.to_string()));
            }
            if v.online {
                return Err(StakingError::AlreadyOnline(operator.to_string()));
            }
            v.online = true;
            self.set_validator(inner, &v)
        })
    }

    pub fn set_offline(&self, ctx: &mut Context, operator: &str) -> Result<()> {
        require_address("operator", operator)?;
        ctx.atomically(|inner| {
            let mut v = self.must_get_validator(inner, operator)?;
            if !v.online {
                return Err(StakingError::AlreadyOffline(operator.to_string()));
            }
            v.online = false;
            self.set_validator(inner, &v)
        })
    }

    pub fn unjail(&self, ctx: &mut Context, operator: &str) -> Result<()> {
        require_address("operator", operator)?;
        ctx.atomically(|inner| {
            let mut v = self.must_get_validator(inner, operator)?;
            self.unjail_validator(inner, &mut v)
        })
    }

    // ─────────────────────────────────────────────────────────────────
    // DELEGATION
    // ─────────────────────────────────────────────────────────────────

    /// Returns the stake-equivalent value credited to the validator.
    pub fn delegate(&self, ctx: &mut Context, delegator: &str, validator: &str, coin: Coin) -> Result<u128> {
        require_address("delegator", delegator)?;
        require_address("validator", validator)?;
        require_positive(&coin)?;
        ctx.atomically(|inner| {
            let params = self.params(inner)?;
            let mut v = self.must_get_validator(inner, validator)?;
            self.delegate_coin(inner, &params, delegator, &coin, &mut v, DelegationSource::Account)
        })
    }

    /// Returns the completion time of the new unbonding entry.
    pub fn undelegate(&self, ctx: &mut Context, delegator: &str, validator: &str, coin: Coin) -> Result<u64> {
        require_address("delegator", delegator)?;
        require_address("validator", validator)?;
        require_positive(&coin)?;
        ctx.atomically(|inner| {
            let params = self.params(inner)?;
            self.undelegate_coin(inner, &params, delegator, validator, &coin)
        })
    }

    pub fn delegate_nft(
        &self,
        ctx: &mut Context,
        delegator: &str,
        validator: &str,
        denom: &str,
        token_id: &str,
        sub_token_ids: Vec<u64>,
    ) -> Result<u128> {
        require_address("delegator", delegator)?;
        require_address("validator", validator)?;
        require_segment("denom", denom)?;
        require_segment("token id", token_id)?;
        ctx.atomically(|inner| {
            let params = self.params(inner)?;
            let mut v = self.must_get_validator(inner, validator)?;
            self.delegate_sub_tokens(
                inner,
                &params,
                delegator,
                &mut v,
                denom,
                token_id,
                &sub_token_ids,
                DelegationSource::Account,
            )
        })
    }

    pub fn undelegate_nft(
        &self,
        ctx: &mut Context,
        delegator: &str,
        validator: &str,
        denom: &str,
        token_id: &str,
        sub_token_ids: Vec<u64>,
    ) -> Result<u64> {
        require_address("delegator", delegator)?;
        require_address("validator", validator)?;
        require_segment("denom", denom)?;
        require_segment("token id", token_id)?;
        ctx.atomically(|inner| {
            let params = self.params(inner)?;
            self.undelegate_sub_tokens(inner, &params, delegator, validator, denom, token_id, &sub_token_ids)
        })
    }

    /// Return part of a pending unbonding entry to its delegation.
    pub fn cancel_unbonding(
        &self,
        ctx: &mut Context,
        delegator: &str,
        validator: &str,
        creation_height: u64,
        coin: Coin,
    ) -> Result<u128> {
        require_address("delegator", delegator)?;
        require_address("validator", validator)?;
        require_positive(&coin)?;
        ctx.atomically(|inner| {
            let params = self.params(inner)?;
            self.cancel_unbonding_entry(inner, &params, delegator, validator, creation_height, &coin)
        })
    }
}
