// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - ERROR TAXONOMY
//
// Two classes:
// - rejected: a user operation failed validation, nothing was written
// - fatal: store corruption or a broken protocol invariant, block must halt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use displaydoc::Display;

pub type Result<T> = std::result::Result<T, StakingError>;

#[derive(Clone, Debug, Display, PartialEq, Eq)]
pub enum StakingError {
    /// empty address: {0}
    EmptyAddress(&'static str),
    /// empty {0}
    EmptyField(&'static str),
    /// {field} is {len} bytes, over the limit of {max}
    SegmentTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    /// amount must be positive
    NonPositiveAmount,
    /// commission rate {0} is outside [0, 1]
    InvalidCommission(String),
    /// invalid consensus public key: {0}
    InvalidConsensusKey(String),
    /// validator {0} not found
    ValidatorNotFound(String),
    /// validator {0} already exists
    ValidatorExists(String),
    /// consensus key already bound to validator {0}
    ConsensusKeyInUse(String),
    /// delegation of {denom} from {delegator} not found
    DelegationNotFound { delegator: String, denom: String },
    /// insufficient delegation: have {have}, requested {requested}
    InsufficientDelegation { have: u128, requested: u128 },
    /// unbonding entry limit of {0} reached for this pair
    TooManyUnbondingEntries(u32),
    /// unbonding entry not found
    UnbondingEntryNotFound,
    /// unbonding entry has already matured
    UnbondingEntryMatured,
    /// insufficient funds: {account} holds {have} {denom}, needs {need}
    InsufficientFunds {
        account: String,
        denom: String,
        have: u128,
        need: u128,
    },
    /// coin {0} not found
    CoinNotFound(String),
    /// sub-token list is empty or contains duplicates
    InvalidSubTokens,
    /// sub-token {denom}/{token_id}#{sub_token_id} is not owned by {owner}
    SubTokenNotOwned {
        denom: String,
        token_id: String,
        sub_token_id: u64,
        owner: String,
    },
    /// sub-token {denom}/{token_id}#{sub_token_id} does not exist
    SubTokenNotFound {
        denom: String,
        token_id: String,
        sub_token_id: u64,
    },
    /// sub-tokens of one delegation must share one reserve denom
    MixedReserveDenoms,
    /// validator {0} is jailed
    ValidatorJailed(String),
    /// validator {0} is not jailed
    ValidatorNotJailed(String),
    /// validator {0} is already online
    AlreadyOnline(String),
    /// validator {0} is already offline
    AlreadyOffline(String),
    /// cannot remove validator {0}: it is not unbonded or still holds tokens
    ValidatorNotRemovable(String),
    /// invalid params: {0}
    InvalidParams(String),
    /// arithmetic overflow in {0}
    Overflow(&'static str),

    /// store corrupted: {0}
    Corrupted(String),
    /// store failure: {0}
    Store(String),
    /// invariant violated: {0}
    InvariantViolation(String),
    /// negative slash factor {0}
    NegativeSlashFactor(String),
    /// infraction height {infraction} is ahead of current height {current}
    FutureInfraction { infraction: u64, current: u64 },
    /// cannot slash unbonded validator {0}
    SlashUnbonded(String),
    /// block processing halted: {0}
    Fatal(String),
}

impl StakingError {
    /// Fatal errors must abort the block instead of being returned to a user.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StakingError::Corrupted(_)
                | StakingError::Store(_)
                | StakingError::InvariantViolation(_)
                | StakingError::NegativeSlashFactor(_)
                | StakingError::FutureInfraction { .. }
                | StakingError::SlashUnbonded(_)
                | StakingError::Fatal(_)
        )
    }

    /// Promote any error raised inside the per-block pass to the fatal class.
    pub fn fatal(self) -> Self {
        if self.is_fatal() {
            self
        } else {
            StakingError::Fatal(self.to_string())
        }
    }
}

impl std::error::Error for StakingError {}

impl From<bincode::Error> for StakingError {
    fn from(e: bincode::Error) -> Self {
        StakingError::Corrupted(e.to_string())
    }
}

impl From<sled::Error> for StakingError {
    fn from(e: sled::Error) -> Self {
        StakingError::Store(e.to_string())
    }
}
