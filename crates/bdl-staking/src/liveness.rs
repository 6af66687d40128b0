//! Liveness tracking and evidence handling.
//!
//! Each bonded validator has a sliding bitmap of the last `signed_blocks_window`
//! blocks. Missing more than `max_missed_blocks` of them once the first window
//! has elapsed slashes by `slash_fraction_downtime` and jails.

use crate::keys;
use crate::slashing::SlashEvent;
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::{load, save};
use bdl_core::{Result, StakingError};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningInfo {
    pub cons_addr: String,
    pub start_height: u64,
    pub index_offset: u64,
    pub missed_counter: u64,
    pub missed: Vec<bool>,
}

impl SigningInfo {
    fn new(cons_addr: &str, start_height: u64, window: u64) -> Self {
        SigningInfo {
            cons_addr: cons_addr.to_string(),
            start_height,
            index_offset: 0,
            missed_counter: 0,
            missed: vec![false; window as usize],
        }
    }

    /// Record one block; returns the updated missed counter.
    fn record(&mut self, signed: bool, window: u64) -> u64 {
        if self.missed.len() != window as usize {
            self.missed = vec![false; window as usize];
            self.missed_counter = 0;
        }
        let idx = (self.index_offset % window) as usize;
        let was_missed = self.missed[idx];
        self.missed[idx] = !signed;
        match (was_missed, !signed) {
            (false, true) => self.missed_counter += 1,
            (true, false) => self.missed_counter -= 1,
            _ => {}
        }
        self.index_offset += 1;
        self.missed_counter
    }
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    pub fn signing_info(&self, ctx: &Context, cons_addr: &str) -> Result<Option<SigningInfo>> {
        load(&*ctx.store, &keys::signing_info(cons_addr))
    }

    /// Account for one block signature (or its absence) by a bonded validator.
    /// Returns the downtime slash if this block tripped it.
    pub fn handle_validator_signature(
        &self,
        ctx: &mut Context,
        cons_addr: &str,
        signed: bool,
    ) -> Result<Option<SlashEvent>> {
        ctx.atomically(|inner| self.apply_signature(inner, cons_addr, signed))
            .map_err(StakingError::fatal)
    }

    fn apply_signature(&self, ctx: &mut Context, cons_addr: &str, signed: bool) -> Result<Option<SlashEvent>> {
        let params = self.params(ctx)?;
        let Some(validator) = self.get_validator_by_consensus_addr(ctx, cons_addr)? else {
            return Ok(None);
        };
        if !validator.is_bonded() || validator.jailed {
            return Ok(None);
        }

        let window = params.signed_blocks_window;
        let mut info = self
            .signing_info(ctx, cons_addr)?
            .unwrap_or_else(|| SigningInfo::new(cons_addr, ctx.height, window));
        let missed = info.record(signed, window);

        let mut event = None;
        if ctx.height > info.start_height.saturating_add(window) && missed > params.max_missed_blocks() {
            warn!(
                "validator {} missed {} of {} blocks, slashing for downtime",
                validator.operator, missed, window
            );
            event = self.apply_slash(
                ctx,
                cons_addr,
                ctx.height.saturating_sub(1),
                params.slash_fraction_downtime,
            )?;
            let mut v = self.must_get_validator(ctx, &validator.operator)?;
            self.jail_validator(ctx, &mut v)?;
            info = SigningInfo::new(cons_addr, ctx.height, window);
        }
        save(ctx.store, &keys::signing_info(cons_addr), &info)?;
        Ok(event)
    }

    /// Evidence of equivocation at `infraction_height`: slash by the
    /// double-sign fraction and jail. Unknown and Unbonded validators are
    /// skipped since they hold nothing at risk.
    pub fn handle_double_sign(
        &self,
        ctx: &mut Context,
        cons_addr: &str,
        infraction_height: u64,
    ) -> Result<Option<SlashEvent>> {
        ctx.atomically(|inner| {
            let params = self.params(inner)?;
            let Some(v) = self.get_validator_by_consensus_addr(inner, cons_addr)? else {
                debug!("double-sign evidence for unknown {} ignored", cons_addr);
                return Ok(None);
            };
            if v.status == crate::types::BondStatus::Unbonded {
                debug!("double-sign evidence for unbonded {} ignored", v.operator);
                return Ok(None);
            }
            let event = self.apply_slash(
                inner,
                cons_addr,
                infraction_height,
                params.slash_fraction_double_sign,
            )?;
            let mut v = self.must_get_validator(inner, &v.operator)?;
            if !v.jailed {
                self.jail_validator(inner, &mut v)?;
            }
            Ok(event)
        })
        .map_err(StakingError::fatal)
    }
}
