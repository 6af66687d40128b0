use crate::error::{Result, StakingError};
use crate::formula::LINEAR_CRR;
use crate::store::{load, save, Key, KvStore};
use serde::{Deserialize, Serialize};

const PREFIX_COIN: u8 = 0x03;

/// Bonding-curve coin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInfo {
    pub denom: String,
    /// Constant reserve ratio, percent in 1..=100.
    pub crr: u8,
    /// Native coin backing the curve.
    pub reserve: u128,
    /// Circulating curve coins.
    pub supply: u128,
}

pub trait CoinRegistry {
    fn get_coin(&self, store: &dyn KvStore, denom: &str) -> Result<CoinInfo>;
    fn set_coin(&self, store: &mut dyn KvStore, info: &CoinInfo) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StoreCoinRegistry;

fn coin_key(denom: &str) -> Vec<u8> {
    Key::new(PREFIX_COIN).str(denom).build()
}

impl CoinRegistry for StoreCoinRegistry {
    fn get_coin(&self, store: &dyn KvStore, denom: &str) -> Result<CoinInfo> {
        load(store, &coin_key(denom))?.ok_or_else(|| StakingError::CoinNotFound(denom.to_string()))
    }

    fn set_coin(&self, store: &mut dyn KvStore, info: &CoinInfo) -> Result<()> {
        if info.crr == 0 || info.crr > LINEAR_CRR {
            return Err(StakingError::InvalidParams(format!(
                "crr {} of {} outside 1..=100",
                info.crr, info.denom
            )));
        }
        save(store, &coin_key(&info.denom), info)
    }
}
