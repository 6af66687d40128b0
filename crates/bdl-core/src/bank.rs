// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - COIN LEDGER
//
// Account balances and per-denom supply. Module accounts (bonded pool,
// not-bonded pool, NFT reserve pool) are ordinary accounts here; the staking
// engine is the only writer to them.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::{Result, StakingError};
use crate::store::{load, save, Key, KvStore};
use crate::Coin;

const PREFIX_BALANCE: u8 = 0x01;
const PREFIX_SUPPLY: u8 = 0x02;

/// Coin ledger consumed by the staking engine. Every operation either fully
/// applies or returns an error before writing.
pub trait Bank {
    fn balance(&self, store: &dyn KvStore, account: &str, denom: &str) -> Result<u128>;
    fn supply(&self, store: &dyn KvStore, denom: &str) -> Result<u128>;
    fn credit(&self, store: &mut dyn KvStore, account: &str, coin: &Coin) -> Result<()>;
    fn debit(&self, store: &mut dyn KvStore, account: &str, coin: &Coin) -> Result<()>;

    fn transfer(&self, store: &mut dyn KvStore, from: &str, to: &str, coin: &Coin) -> Result<()> {
        if coin.is_zero() || from == to {
            return Ok(());
        }
        self.debit(store, from, coin)?;
        self.credit(store, to, coin)
    }

    /// Destroy `coin` held by `from`, shrinking supply.
    fn burn(&self, store: &mut dyn KvStore, from: &str, coin: &Coin) -> Result<()>;

    /// Create `coin` in `to`, growing supply.
    fn mint(&self, store: &mut dyn KvStore, to: &str, coin: &Coin) -> Result<()>;
}

/// Bank kept in the same store as staking state, so its writes share the
/// staking commit unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct StoreBank;

fn balance_key(account: &str, denom: &str) -> Vec<u8> {
    Key::new(PREFIX_BALANCE).str(account).str(denom).build()
}

fn supply_key(denom: &str) -> Vec<u8> {
    Key::new(PREFIX_SUPPLY).str(denom).build()
}

fn put_amount(store: &mut dyn KvStore, key: &[u8], amount: u128) -> Result<()> {
    if amount == 0 {
        store.delete(key)
    } else {
        save(store, key, &amount)
    }
}

impl Bank for StoreBank {
    fn balance(&self, store: &dyn KvStore, account: &str, denom: &str) -> Result<u128> {
        Ok(load(store, &balance_key(account, denom))?.unwrap_or(0))
    }

    fn supply(&self, store: &dyn KvStore, denom: &str) -> Result<u128> {
        Ok(load(store, &supply_key(denom))?.unwrap_or(0))
    }

    fn credit(&self, store: &mut dyn KvStore, account: &str, coin: &Coin) -> Result<()> {
        if coin.is_zero() {
            return Ok(());
        }
        let have = self.balance(store, account, &coin.denom)?;
        let next = have
            .checked_add(coin.amount)
            .ok_or(StakingError::Overflow("bank credit"))?;
        put_amount(store, &balance_key(account, &coin.denom), next)
    }

    fn debit(&self, store: &mut dyn KvStore, account: &str, coin: &Coin) -> Result<()> {
        if coin.is_zero() {
            return Ok(());
        }
        let have = self.balance(store, account, &coin.denom)?;
        let next = have
            .checked_sub(coin.amount)
            .ok_or_else(|| StakingError::InsufficientFunds {
                account: account.to_string(),
                denom: coin.denom.clone(),
                have,
                need: coin.amount,
            })?;
        put_amount(store, &balance_key(account, &coin.denom), next)
    }

    fn burn(&self, store: &mut dyn KvStore, from: &str, coin: &Coin) -> Result<()> {
        if coin.is_zero() {
            return Ok(());
        }
        let supply = self.supply(store, &coin.denom)?;
        let next_supply = supply
            .checked_sub(coin.amount)
            .ok_or_else(|| StakingError::InvariantViolation(format!("burn exceeds {} supply", coin.denom)))?;
        self.debit(store, from, coin)?;
        put_amount(store, &supply_key(&coin.denom), next_supply)
    }

    fn mint(&self, store: &mut dyn KvStore, to: &str, coin: &Coin) -> Result<()> {
        if coin.is_zero() {
            return Ok(());
        }
        let supply = self.supply(store, &coin.denom)?;
        let next_supply = supply
            .checked_add(coin.amount)
            .ok_or(StakingError::Overflow("bank mint"))?;
        self.credit(store, to, coin)?;
        put_amount(store, &supply_key(&coin.denom), next_supply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemStore;
    use crate::NATIVE_DENOM;

    fn native(n: u128) -> Coin {
        Coin::new(NATIVE_DENOM, n)
    }

    #[test]
    fn test_mint_transfer_burn() {
        let mut store = MemStore::new();
        let bank = StoreBank;
        bank.mint(&mut store, "alice", &native(100)).unwrap();
        bank.transfer(&mut store, "alice", "bob", &native(30)).unwrap();
        assert_eq!(bank.balance(&store, "alice", NATIVE_DENOM).unwrap(), 70);
        assert_eq!(bank.balance(&store, "bob", NATIVE_DENOM).unwrap(), 30);

        bank.burn(&mut store, "bob", &native(10)).unwrap();
        assert_eq!(bank.supply(&store, NATIVE_DENOM).unwrap(), 90);
        assert_eq!(bank.balance(&store, "bob", NATIVE_DENOM).unwrap(), 20);
    }

    #[test]
    fn test_debit_insufficient_leaves_state() {
        let mut store = MemStore::new();
        let bank = StoreBank;
        bank.mint(&mut store, "alice", &native(5)).unwrap();
        let err = bank
            .transfer(&mut store, "alice", "bob", &native(6))
            .unwrap_err();
        assert!(matches!(err, StakingError::InsufficientFunds { have: 5, need: 6, .. }));
        assert_eq!(bank.balance(&store, "alice", NATIVE_DENOM).unwrap(), 5);
        assert_eq!(bank.balance(&store, "bob", NATIVE_DENOM).unwrap(), 0);
    }

    #[test]
    fn test_zero_balances_are_pruned() {
        let mut store = MemStore::new();
        let bank = StoreBank;
        bank.mint(&mut store, "alice", &native(5)).unwrap();
        bank.transfer(&mut store, "alice", "bob", &native(5)).unwrap();
        assert!(!store.has(&balance_key("alice", NATIVE_DENOM)).unwrap());
    }
}
