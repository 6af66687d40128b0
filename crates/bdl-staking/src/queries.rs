//! Read-only views for RPC layers and tests.

use crate::keys;
use crate::types::{BondStatus, UnbondingDelegation, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::{load_all, Key};
use bdl_core::{Result, StakingError};

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    /// Bonded validators in power order.
    pub fn bonded_validators(&self, ctx: &Context) -> Result<Vec<Validator>> {
        let mut out = Vec::new();
        for operator in self.validators_by_power(ctx)? {
            let v = self.must_get_validator(ctx, &operator)?;
            if v.status == BondStatus::Bonded {
                out.push(v);
            }
        }
        Ok(out)
    }

    pub fn validators_with_status(&self, ctx: &Context, status: BondStatus) -> Result<Vec<Validator>> {
        Ok(self
            .all_validators(ctx)?
            .into_iter()
            .filter(|v| v.status == status)
            .collect())
    }

    /// Sum of tokens over Bonded validators.
    pub fn total_bonded_tokens(&self, ctx: &Context) -> Result<u128> {
        self.validators_with_status(ctx, BondStatus::Bonded)?
            .iter()
            .try_fold(0u128, |acc, v| {
                acc.checked_add(v.tokens)
                    .ok_or(StakingError::Overflow("total bonded tokens"))
            })
    }

    pub fn unbondings_of_delegator(&self, ctx: &Context, delegator: &str) -> Result<Vec<UnbondingDelegation>> {
        load_all(
            &*ctx.store,
            &Key::new(keys::UNBONDING).str(delegator).build(),
        )
    }
}
