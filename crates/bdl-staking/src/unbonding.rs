// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - UNBONDING QUEUES
//
// Two timers, both keyed by completion time so a prefix walk stops at the
// first bucket still in the future:
// - delegator unbondings: buckets of (delegator, validator) pairs whose
//   container holds at least one entry maturing at that time
// - validator unbondings: buckets of operators leaving the Unbonding status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
use crate::keys;
use crate::types::{BondStatus, UnbondingDelegation, UnbondingEntry, Validator};
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::params::Params;
use bdl_core::store::{decode, load, read_u64, save};
use bdl_core::{Result, StakingError, NOT_BONDED_POOL};
use log::{debug, info};

type QueuedPair = (String, String);

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    pub fn get_unbonding(
        &self,
        ctx: &Context,
        delegator: &str,
        validator: &str,
    ) -> Result<Option<UnbondingDelegation>> {
        load(&*ctx.store, &keys::unbonding(delegator, validator))
    }

    /// Persist `ubd`; an empty container is deleted along with its index entry.
    pub(crate) fn set_unbonding(&self, ctx: &mut Context, ubd: &UnbondingDelegation) -> Result<()> {
        let primary = keys::unbonding(&ubd.delegator, &ubd.validator);
        let index = keys::unbonding_by_validator(&ubd.validator, &ubd.delegator);
        if ubd.entries.is_empty() {
            ctx.store.delete(&primary)?;
            return ctx.store.delete(&index);
        }
        save(ctx.store, &primary, ubd)?;
        ctx.store.set(&index, primary)
    }

    pub fn unbondings_of_validator(&self, ctx: &Context, validator: &str) -> Result<Vec<UnbondingDelegation>> {
        let mut out = Vec::new();
        for (_, primary) in ctx.store.scan_prefix(&keys::unbondings_of_validator(validator))? {
            let bytes = ctx.store.get(&primary)?.ok_or_else(|| {
                StakingError::Corrupted(format!("dangling unbonding index for {}", validator))
            })?;
            out.push(decode(&bytes)?);
        }
        Ok(out)
    }

    pub(crate) fn check_entry_capacity(
        &self,
        ctx: &Context,
        params: &Params,
        delegator: &str,
        validator: &str,
    ) -> Result<()> {
        let used = self
            .get_unbonding(ctx, delegator, validator)?
            .map_or(0, |u| u.entries.len());
        if used >= params.max_entries as usize {
            return Err(StakingError::TooManyUnbondingEntries(params.max_entries));
        }
        Ok(())
    }

    pub(crate) fn push_unbonding_entry(
        &self,
        ctx: &mut Context,
        delegator: &str,
        validator: &str,
        entry: UnbondingEntry,
    ) -> Result<()> {
        let completion_time = entry.completion_time();
        let mut ubd = self
            .get_unbonding(ctx, delegator, validator)?
            .unwrap_or_else(|| UnbondingDelegation {
                delegator: delegator.to_string(),
                validator: validator.to_string(),
                entries: Vec::new(),
            });
        ubd.entries.push(entry);
        self.set_unbonding(ctx, &ubd)?;

        let key = keys::unbonding_queue(completion_time);
        let mut bucket: Vec<QueuedPair> = load(&*ctx.store, &key)?.unwrap_or_default();
        let pair = (delegator.to_string(), validator.to_string());
        if !bucket.contains(&pair) {
            bucket.push(pair);
        }
        save(ctx.store, &key, &bucket)
    }

    /// Pop every queue bucket with completion time at or before `now`.
    fn dequeue_mature(&self, ctx: &mut Context, prefix: u8) -> Result<Vec<Vec<u8>>> {
        let mut values = Vec::new();
        for (key, value) in ctx.store.scan_prefix(&[prefix])? {
            match read_u64(&key, 1) {
                Some(t) if t <= ctx.time => {
                    ctx.store.delete(&key)?;
                    values.push(value);
                }
                Some(_) => break,
                None => {
                    return Err(StakingError::Corrupted("malformed queue key".into()));
                }
            }
        }
        Ok(values)
    }

    /// Release every matured entry of one (delegator, validator) container.
    /// Returns how many entries completed.
    pub fn complete_unbonding(&self, ctx: &mut Context, delegator: &str, validator: &str) -> Result<usize> {
        let Some(mut ubd) = self.get_unbonding(ctx, delegator, validator)? else {
            return Ok(0);
        };
        let now = ctx.time;
        let (mature, pending): (Vec<_>, Vec<_>) =
            ubd.entries.drain(..).partition(|e| e.is_mature(now));

        for entry in &mature {
            match entry {
                UnbondingEntry::Fungible { balance, .. } => {
                    self.bank
                        .transfer(ctx.store, NOT_BONDED_POOL, delegator, balance)?;
                }
                UnbondingEntry::Nft {
                    denom,
                    token_id,
                    sub_token_ids,
                    ..
                } => {
                    self.nft.transfer_sub_tokens(
                        ctx.store,
                        denom,
                        token_id,
                        NOT_BONDED_POOL,
                        delegator,
                        sub_token_ids,
                    )?;
                }
            }
            debug!(
                "unbonding of {} from {} completed: {}",
                delegator,
                validator,
                entry.balance()
            );
        }

        ubd.entries = pending;
        self.set_unbonding(ctx, &ubd)?;
        Ok(mature.len())
    }

    /// Complete every delegator unbonding that matured by the block time.
    pub fn dequeue_mature_unbondings(&self, ctx: &mut Context) -> Result<usize> {
        let mut pairs: Vec<QueuedPair> = Vec::new();
        for bytes in self.dequeue_mature(ctx, keys::UNBONDING_QUEUE)? {
            for pair in decode::<Vec<QueuedPair>>(&bytes)? {
                if !pairs.contains(&pair) {
                    pairs.push(pair);
                }
            }
        }
        let mut completed = 0;
        for (delegator, validator) in pairs {
            completed += self.complete_unbonding(ctx, &delegator, &validator)?;
        }
        Ok(completed)
    }

    // ─────────────────────────────────────────────────────────────────
    // VALIDATOR QUEUE
    // ─────────────────────────────────────────────────────────────────

    pub(crate) fn insert_validator_queue(&self, ctx: &mut Context, v: &Validator) -> Result<()> {
        let key = keys::validator_queue(v.unbonding_completion_time);
        let mut bucket: Vec<String> = load(&*ctx.store, &key)?.unwrap_or_default();
        if !bucket.contains(&v.operator) {
            bucket.push(v.operator.clone());
        }
        save(ctx.store, &key, &bucket)
    }

    pub(crate) fn delete_validator_queue(&self, ctx: &mut Context, v: &Validator) -> Result<()> {
        let key = keys::validator_queue(v.unbonding_completion_time);
        let Some(mut bucket) = load::<Vec<String>>(&*ctx.store, &key)? else {
            return Ok(());
        };
        bucket.retain(|op| op != &v.operator);
        if bucket.is_empty() {
            ctx.store.delete(&key)
        } else {
            save(ctx.store, &key, &bucket)
        }
    }

    /// Move every validator whose unbonding timer expired to Unbonded.
    /// Returns the operators that matured.
    pub fn dequeue_mature_validators(&self, ctx: &mut Context) -> Result<Vec<String>> {
        let mut matured = Vec::new();
        for bytes in self.dequeue_mature(ctx, keys::VALIDATOR_QUEUE)? {
            for operator in decode::<Vec<String>>(&bytes)? {
                let Some(mut v) = self.get_validator(ctx, &operator)? else {
                    continue;
                };
                if v.status != BondStatus::Unbonding || v.unbonding_completion_time > ctx.time {
                    continue;
                }
                v.status = BondStatus::Unbonded;
                self.set_validator(ctx, &v)?;
                info!("validator {} finished unbonding", operator);
                matured.push(operator);
            }
        }
        Ok(matured)
    }
}
