//! Ranking index over validators. Ranking only, never identity: a validator
//! is resolved through the registry, the index just orders operators.
//!
//! The only two mutations are `insert` and `delete`. A token change is a
//! delete of the old entry followed by an insert of the new one.

use crate::keys;
use crate::types::Validator;
use bdl_core::store::{decode, save, KvStore};
use bdl_core::Result;

pub struct PowerIndex;

impl PowerIndex {
    pub fn insert(store: &mut dyn KvStore, v: &Validator) -> Result<()> {
        save(
            store,
            &keys::power_index(v.tokens, v.bond_height, &v.operator),
            &v.operator,
        )
    }

    pub fn delete(store: &mut dyn KvStore, v: &Validator) -> Result<()> {
        store.delete(&keys::power_index(v.tokens, v.bond_height, &v.operator))
    }

    /// Operators by descending tokens; equal tokens put the earliest bond
    /// height first.
    pub fn ranked(store: &dyn KvStore) -> Result<Vec<String>> {
        let mut out = Vec::new();
        for (_, value) in store.scan_prefix(&[keys::POWER_INDEX])?.into_iter().rev() {
            out.push(decode::<String>(&value)?);
        }
        Ok(out)
    }
}
