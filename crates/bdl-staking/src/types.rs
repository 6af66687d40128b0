use bdl_core::{Coin, Dec, Result, StakingError, BONDED_POOL, NOT_BONDED_POOL};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};

/// Consensus addresses are the first 20 bytes of SHA3-256(pubkey).
pub const CONSENSUS_ADDRESS_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BondStatus {
    Unbonded,
    Unbonding,
    Bonded,
}

impl BondStatus {
    /// Module account holding the coin of delegations to a validator in this status.
    pub fn pool(self) -> &'static str {
        match self {
            BondStatus::Bonded => BONDED_POOL,
            BondStatus::Unbonding | BondStatus::Unbonded => NOT_BONDED_POOL,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    pub moniker: String,
    pub identity: String,
    pub website: String,
    pub details: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validator {
    pub operator: String,
    /// Hex-encoded consensus public key.
    pub consensus_pubkey: String,
    pub consensus_address: String,
    pub reward_address: String,
    pub description: Description,
    pub commission: Dec,
    /// Sum of cached stake-equivalent values of all its delegations.
    pub tokens: u128,
    pub status: BondStatus,
    pub jailed: bool,
    pub online: bool,
    pub unbonding_height: u64,
    pub unbonding_completion_time: u64,
    /// Height of the last power-index update; earlier wins ties.
    pub bond_height: u64,
    pub accum_rewards: u128,
}

impl Validator {
    pub fn is_bonded(&self) -> bool {
        self.status == BondStatus::Bonded
    }

    pub fn pool(&self) -> &'static str {
        self.status.pool()
    }

    /// Consensus voting power, `tokens / power_reduction`, saturating at u64.
    pub fn potential_power(&self, power_reduction: u128) -> u64 {
        if power_reduction == 0 {
            return 0;
        }
        u64::try_from(self.tokens / power_reduction).unwrap_or(u64::MAX)
    }

    /// Eligible for the ranked set regardless of current power.
    pub fn is_rankable(&self) -> bool {
        self.online && !self.jailed
    }
}

pub fn consensus_address(pubkey_hex: &str) -> Result<String> {
    let bytes = hex::decode(pubkey_hex)
        .map_err(|e| StakingError::InvalidConsensusKey(e.to_string()))?;
    if bytes.is_empty() {
        return Err(StakingError::InvalidConsensusKey("empty key".into()));
    }
    let digest = Sha3_256::digest(&bytes);
    Ok(hex::encode(&digest[..CONSENSUS_ADDRESS_LEN]))
}

// ─────────────────────────────────────────────────────────────────
// DELEGATIONS
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FungibleDelegation {
    pub delegator: String,
    pub validator: String,
    pub coin: Coin,
    /// Cached stake-equivalent value of `coin`.
    pub base: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftDelegation {
    pub delegator: String,
    pub validator: String,
    pub denom: String,
    pub token_id: String,
    /// Sorted, no duplicates.
    pub sub_token_ids: Vec<u64>,
    /// Aggregate reserve of the delegated sub-tokens.
    pub coin: Coin,
    pub base: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delegation {
    Fungible(FungibleDelegation),
    Nft(NftDelegation),
}

impl Delegation {
    pub fn delegator(&self) -> &str {
        match self {
            Delegation::Fungible(d) => &d.delegator,
            Delegation::Nft(d) => &d.delegator,
        }
    }

    pub fn validator(&self) -> &str {
        match self {
            Delegation::Fungible(d) => &d.validator,
            Delegation::Nft(d) => &d.validator,
        }
    }

    pub fn base(&self) -> u128 {
        match self {
            Delegation::Fungible(d) => d.base,
            Delegation::Nft(d) => d.base,
        }
    }

    /// Coin whose stake value is cached in `base`.
    pub fn coin(&self) -> &Coin {
        match self {
            Delegation::Fungible(d) => &d.coin,
            Delegation::Nft(d) => &d.coin,
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// UNBONDING
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnbondingEntry {
    Fungible {
        creation_height: u64,
        completion_time: u64,
        initial_balance: Coin,
        balance: Coin,
    },
    Nft {
        creation_height: u64,
        completion_time: u64,
        denom: String,
        token_id: String,
        sub_token_ids: Vec<u64>,
        initial_balance: Coin,
        balance: Coin,
    },
}

impl UnbondingEntry {
    pub fn creation_height(&self) -> u64 {
        match self {
            UnbondingEntry::Fungible { creation_height, .. }
            | UnbondingEntry::Nft { creation_height, .. } => *creation_height,
        }
    }

    pub fn completion_time(&self) -> u64 {
        match self {
            UnbondingEntry::Fungible { completion_time, .. }
            | UnbondingEntry::Nft { completion_time, .. } => *completion_time,
        }
    }

    pub fn balance(&self) -> &Coin {
        match self {
            UnbondingEntry::Fungible { balance, .. } | UnbondingEntry::Nft { balance, .. } => {
                balance
            }
        }
    }

    pub fn is_mature(&self, now: u64) -> bool {
        self.completion_time() <= now
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnbondingDelegation {
    pub delegator: String,
    pub validator: String,
    pub entries: Vec<UnbondingEntry>,
}

// ─────────────────────────────────────────────────────────────────
// VALIDATOR SET
// ─────────────────────────────────────────────────────────────────

/// Voting power change handed to the consensus engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerUpdate {
    pub operator: String,
    pub consensus_pubkey: String,
    pub power: u64,
}

/// Power a validator had in the last committed bonded set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPower {
    pub consensus_pubkey: String,
    pub power: u64,
}
