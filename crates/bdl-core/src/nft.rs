// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - NFT COLLATERAL REGISTRY
//
// Only the subset staking needs: sub-token ownership, ownership transfer
// and the per-sub-token reserve that gives a sub-token its stake value.
// The reserve coin itself sits in NFT_RESERVE_POOL.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::bank::Bank;
use crate::error::{Result, StakingError};
use crate::store::{load, save, Key, KvStore};
use crate::{Coin, NFT_RESERVE_POOL};
use serde::{Deserialize, Serialize};

const PREFIX_SUB_TOKEN: u8 = 0x04;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubToken {
    pub owner: String,
    pub reserve: Coin,
}

pub trait NftRegistry {
    fn sub_token(
        &self,
        store: &dyn KvStore,
        denom: &str,
        token_id: &str,
        sub_token_id: u64,
    ) -> Result<Option<SubToken>>;

    /// Moves every id in `ids` from `from` to `to`, or none of them.
    fn transfer_sub_tokens(
        &self,
        store: &mut dyn KvStore,
        denom: &str,
        token_id: &str,
        from: &str,
        to: &str,
        ids: &[u64],
    ) -> Result<()>;

    /// Shrink a sub-token's reserve by `amount`, burning it from the reserve pool.
    fn reduce_reserve(
        &self,
        store: &mut dyn KvStore,
        bank: &dyn Bank,
        denom: &str,
        token_id: &str,
        sub_token_id: u64,
        amount: u128,
    ) -> Result<()>;

    fn reserve(&self, store: &dyn KvStore, denom: &str, token_id: &str, sub_token_id: u64) -> Result<Coin> {
        self.sub_token(store, denom, token_id, sub_token_id)?
            .map(|t| t.reserve)
            .ok_or_else(|| not_found(denom, token_id, sub_token_id))
    }
}

fn not_found(denom: &str, token_id: &str, sub_token_id: u64) -> StakingError {
    StakingError::SubTokenNotFound {
        denom: denom.to_string(),
        token_id: token_id.to_string(),
        sub_token_id,
    }
}

fn sub_token_key(denom: &str, token_id: &str, sub_token_id: u64) -> Vec<u8> {
    Key::new(PREFIX_SUB_TOKEN)
        .str(denom)
        .str(token_id)
        .u64(sub_token_id)
        .build()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StoreNftRegistry;

impl StoreNftRegistry {
    /// Create sub-tokens owned by `owner`, each backed by `reserve` minted
    /// into the reserve pool.
    pub fn issue(
        &self,
        store: &mut dyn KvStore,
        bank: &dyn Bank,
        denom: &str,
        token_id: &str,
        owner: &str,
        ids: &[u64],
        reserve: &Coin,
    ) -> Result<()> {
        for &id in ids {
            let key = sub_token_key(denom, token_id, id);
            if store.has(&key)? {
                return Err(StakingError::InvalidSubTokens);
            }
        }
        for &id in ids {
            let token = SubToken {
                owner: owner.to_string(),
                reserve: reserve.clone(),
            };
            save(store, &sub_token_key(denom, token_id, id), &token)?;
            bank.mint(store, NFT_RESERVE_POOL, reserve)?;
        }
        Ok(())
    }
}

impl NftRegistry for StoreNftRegistry {
    fn sub_token(
        &self,
        store: &dyn KvStore,
        denom: &str,
        token_id: &str,
        sub_token_id: u64,
    ) -> Result<Option<SubToken>> {
        load(store, &sub_token_key(denom, token_id, sub_token_id))
    }

    fn transfer_sub_tokens(
        &self,
        store: &mut dyn KvStore,
        denom: &str,
        token_id: &str,
        from: &str,
        to: &str,
        ids: &[u64],
    ) -> Result<()> {
        let mut tokens = Vec::with_capacity(ids.len());
        for &id in ids {
            let token = self
                .sub_token(store, denom, token_id, id)?
                .ok_or_else(|| not_found(denom, token_id, id))?;
            if token.owner != from {
                return Err(StakingError::SubTokenNotOwned {
                    denom: denom.to_string(),
                    token_id: token_id.to_string(),
                    sub_token_id: id,
                    owner: from.to_string(),
                });
            }
            tokens.push((id, token));
        }
        for (id, mut token) in tokens {
            token.owner = to.to_string();
            save(store, &sub_token_key(denom, token_id, id), &token)?;
        }
        Ok(())
    }

    fn reduce_reserve(
        &self,
        store: &mut dyn KvStore,
        bank: &dyn Bank,
        denom: &str,
        token_id: &str,
        sub_token_id: u64,
        amount: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Ok(());
        }
        let mut token = self
            .sub_token(store, denom, token_id, sub_token_id)?
            .ok_or_else(|| not_found(denom, token_id, sub_token_id))?;
        let burned = Coin::new(token.reserve.denom.clone(), amount);
        token.reserve = token
            .reserve
            .checked_sub(amount)
            .ok_or_else(|| StakingError::InvariantViolation("sub-token reserve underflow".into()))?;
        bank.burn(store, NFT_RESERVE_POOL, &burned)?;
        save(store, &sub_token_key(denom, token_id, sub_token_id), &token)
    }
}
