//! Store layout of the staking engine.
//!
//! Bank, curve-coin and NFT records use prefixes 0x01..=0x0f (see bdl-core);
//! staking owns 0x20 and above.

use bdl_core::store::Key;

pub const VALIDATOR: u8 = 0x21;
pub const VALIDATOR_BY_CONS: u8 = 0x22;
pub const POWER_INDEX: u8 = 0x23;
pub const VALIDATOR_QUEUE: u8 = 0x24;
pub const LAST_POWER: u8 = 0x25;

pub const DELEGATION: u8 = 0x31;
pub const NFT_DELEGATION: u8 = 0x32;
pub const DELEGATION_BY_VALIDATOR: u8 = 0x33;

pub const UNBONDING: u8 = 0x41;
pub const UNBONDING_QUEUE: u8 = 0x42;
pub const UNBONDING_BY_VALIDATOR: u8 = 0x43;

pub const SLASH_EVENT: u8 = 0x51;
pub const SIGNING_INFO: u8 = 0x52;

pub const PARAMS: u8 = 0x61;
pub const MIGRATION: u8 = 0x62;

const KIND_FUNGIBLE: u8 = 0;
const KIND_NFT: u8 = 1;

pub fn validator(operator: &str) -> Vec<u8> {
    Key::new(VALIDATOR).str(operator).build()
}

pub fn validator_by_cons(cons_addr: &str) -> Vec<u8> {
    Key::new(VALIDATOR_BY_CONS).str(cons_addr).build()
}

/// Ascending key order is (tokens, later bond height, operator), so walking
/// it backwards ranks by tokens with the earliest bond height first on ties.
pub fn power_index(tokens: u128, bond_height: u64, operator: &str) -> Vec<u8> {
    Key::new(POWER_INDEX)
        .u128(tokens)
        .u64(u64::MAX - bond_height)
        .str(operator)
        .build()
}

pub fn validator_queue(completion_time: u64) -> Vec<u8> {
    Key::new(VALIDATOR_QUEUE).u64(completion_time).build()
}

pub fn last_power(operator: &str) -> Vec<u8> {
    Key::new(LAST_POWER).str(operator).build()
}

pub fn delegation(delegator: &str, validator: &str, denom: &str) -> Vec<u8> {
    Key::new(DELEGATION).str(delegator).str(validator).str(denom).build()
}

pub fn nft_delegation(delegator: &str, validator: &str, token_id: &str, denom: &str) -> Vec<u8> {
    Key::new(NFT_DELEGATION)
        .str(delegator)
        .str(validator)
        .str(token_id)
        .str(denom)
        .build()
}

pub fn delegation_by_validator(validator: &str, delegator: &str, denom: &str) -> Vec<u8> {
    Key::new(DELEGATION_BY_VALIDATOR)
        .str(validator)
        .str(delegator)
        .u8(KIND_FUNGIBLE)
        .str(denom)
        .build()
}

pub fn nft_delegation_by_validator(
    validator: &str,
    delegator: &str,
    token_id: &str,
    denom: &str,
) -> Vec<u8> {
    Key::new(DELEGATION_BY_VALIDATOR)
        .str(validator)
        .str(delegator)
        .u8(KIND_NFT)
        .str(token_id)
        .str(denom)
        .build()
}

pub fn delegations_of_validator(validator: &str) -> Vec<u8> {
    Key::new(DELEGATION_BY_VALIDATOR).str(validator).build()
}

pub fn unbonding(delegator: &str, validator: &str) -> Vec<u8> {
    Key::new(UNBONDING).str(delegator).str(validator).build()
}

pub fn unbonding_queue(completion_time: u64) -> Vec<u8> {
    Key::new(UNBONDING_QUEUE).u64(completion_time).build()
}

pub fn unbonding_by_validator(validator: &str, delegator: &str) -> Vec<u8> {
    Key::new(UNBONDING_BY_VALIDATOR)
        .str(validator)
        .str(delegator)
        .build()
}

pub fn unbondings_of_validator(validator: &str) -> Vec<u8> {
    Key::new(UNBONDING_BY_VALIDATOR).str(validator).build()
}

pub fn slash_event(operator: &str, height: u64, seq: u64) -> Vec<u8> {
    Key::new(SLASH_EVENT).str(operator).u64(height).u64(seq).build()
}

pub fn slash_events_of(operator: &str) -> Vec<u8> {
    Key::new(SLASH_EVENT).str(operator).build()
}

pub fn signing_info(cons_addr: &str) -> Vec<u8> {
    Key::new(SIGNING_INFO).str(cons_addr).build()
}

pub fn params() -> Vec<u8> {
    vec![PARAMS]
}

pub fn migration(id: &str) -> Vec<u8> {
    Key::new(MIGRATION).str(id).build()
}
