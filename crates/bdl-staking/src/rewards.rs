//! Block reward accrual and payout.
//!
//! Rewards accrue per validator and are paid in the bond denom: the
//! commission share goes to the validator's reward address, the rest to its
//! delegators pro rata by stake-equivalent value. Truncation dust is dropped.

use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::{mul_div, Coin, Result, StakingError};
use log::debug;

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    /// Accrue `amount` of reward to `operator`, paid out by the next payout pass.
    pub fn add_accum_reward(&self, ctx: &mut Context, operator: &str, amount: u128) -> Result<()> {
        if amount == 0 {
            return Err(StakingError::NonPositiveAmount);
        }
        ctx.atomically(|inner| {
            let mut v = self.must_get_validator(inner, operator)?;
            v.accum_rewards = v
                .accum_rewards
                .checked_add(amount)
                .ok_or(StakingError::Overflow("accumulated rewards"))?;
            self.set_validator(inner, &v)
        })
    }

    /// Pay every accrued reward. Returns the total minted.
    pub fn pay_rewards(&self, ctx: &mut Context) -> Result<u128> {
        ctx.atomically(|inner| self.apply_pay_rewards(inner))
            .map_err(StakingError::fatal)
    }

    pub(crate) fn apply_pay_rewards(&self, ctx: &mut Context) -> Result<u128> {
        let bond_denom = self.params(ctx)?.bond_denom;
        let mut paid_total = 0u128;
        for mut v in self.all_validators(ctx)? {
            if v.accum_rewards == 0 {
                continue;
            }
            let reward = v.accum_rewards;
            let commission = v.commission.mul_trunc(reward).min(reward);
            self.bank
                .mint(ctx.store, &v.reward_address, &Coin::new(bond_denom.clone(), commission))?;
            let mut paid = commission;

            let remainder = reward - commission;
            if v.tokens > 0 {
                for d in self.delegations_of_validator(ctx, &v.operator)? {
                    let share = mul_div(remainder, d.base(), v.tokens).unwrap_or(0);
                    if share == 0 {
                        continue;
                    }
                    self.bank
                        .mint(ctx.store, d.delegator(), &Coin::new(bond_denom.clone(), share))?;
                    paid += share;
                }
            }

            debug!(
                "paid {} of {} reward for {} ({} commission)",
                paid, reward, v.operator, commission
            );
            paid_total += paid;
            v.accum_rewards = 0;
            self.set_validator(ctx, &v)?;
        }
        Ok(paid_total)
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::*;
    use crate::Context;
    use bdl_core::StakingError;

    #[test]
    fn test_commission_and_pro_rata_split() {
        let (mut store, keeper) = setup();
        let mut ctx = Context::new(&mut store, 1, 0);
        // commission 10%
        add_validator(&mut ctx, &keeper, "val", 60);
        fund(&mut ctx, &keeper, "alice", 30);
        fund(&mut ctx, &keeper, "bob", 10);
        keeper.delegate(&mut ctx, "alice", "val", native(30)).unwrap();
        keeper.delegate(&mut ctx, "bob", "val", native(10)).unwrap();

        keeper.add_accum_reward(&mut ctx, "val", 1_000).unwrap();
        let paid = keeper.pay_rewards(&mut ctx).unwrap();
        assert_eq!(paid, 1_000);
        // val: 100 commission + 900 * 60/100
        assert_eq!(balance(&ctx, &keeper, "val"), 100 + 540);
        assert_eq!(balance(&ctx, &keeper, "alice"), 270);
        assert_eq!(balance(&ctx, &keeper, "bob"), 90);
        assert_eq!(keeper.must_get_validator(&ctx, "val").unwrap().accum_rewards, 0);
    }

    #[test]
    fn test_dust_is_dropped_and_reward_reset() {
        let (mut store, keeper) = setup();
        let mut ctx = Context::new(&mut store, 1, 0);
        add_validator(&mut ctx, &keeper, "val", 3);
        fund(&mut ctx, &keeper, "alice", 1);
        keeper.delegate(&mut ctx, "alice", "val", native(1)).unwrap();
        keeper.add_accum_reward(&mut ctx, "val", 5).unwrap();
        // commission floor(0.5) = 0; shares floor(15/4) + floor(5/4)
        assert_eq!(keeper.pay_rewards(&mut ctx).unwrap(), 4);
        assert_eq!(balance(&ctx, &keeper, "alice"), 1);
        assert_eq!(keeper.pay_rewards(&mut ctx).unwrap(), 0);
    }

    #[test]
    fn test_reward_validation() {
        let (mut store, keeper) = setup();
        let mut ctx = Context::new(&mut store, 1, 0);
        assert_eq!(
            keeper.add_accum_reward(&mut ctx, "nobody", 1),
            Err(StakingError::ValidatorNotFound("nobody".into()))
        );
        assert_eq!(
            keeper.add_accum_reward(&mut ctx, "nobody", 0),
            Err(StakingError::NonPositiveAmount)
        );
    }
}
