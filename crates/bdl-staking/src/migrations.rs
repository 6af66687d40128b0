//! One-time state corrections scheduled at fixed heights.
//!
//! A migration runs in the end-of-block pass of the first block at or above
//! its height and is then marked applied, so it never runs twice even if the
//! block is retried or the height is passed again after a restart.

use crate::keys;
use crate::{Context, Keeper};
use bdl_core::bank::Bank;
use bdl_core::coins::CoinRegistry;
use bdl_core::nft::NftRegistry;
use bdl_core::store::{load, save};
use bdl_core::Result;
use log::info;

pub type MigrationFn = fn(&mut Context<'_>) -> Result<()>;

#[derive(Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub height: u64,
    pub apply: MigrationFn,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("id", &self.id)
            .field("height", &self.height)
            .finish()
    }
}

impl<B: Bank, C: CoinRegistry, N: NftRegistry> Keeper<B, C, N> {
    pub fn migration_applied(&self, ctx: &Context, id: &str) -> Result<Option<u64>> {
        load(&*ctx.store, &keys::migration(id))
    }

    /// Apply every due migration not yet marked. Returns the ids applied.
    pub(crate) fn run_migrations(&self, ctx: &mut Context) -> Result<Vec<&'static str>> {
        let mut applied = Vec::new();
        for m in &self.migrations {
            if m.height > ctx.height || self.migration_applied(ctx, m.id)?.is_some() {
                continue;
            }
            (m.apply)(ctx)?;
            save(ctx.store, &keys::migration(m.id), &ctx.height)?;
            info!("migration {} applied at height {}", m.id, ctx.height);
            applied.push(m.id);
        }
        Ok(applied)
    }
}
