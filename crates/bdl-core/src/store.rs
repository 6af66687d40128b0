// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// BONDLINE - ORDERED KEY-VALUE STORE
//
// Every staking record lives behind `KvStore`. Iteration is always in
// ascending byte order so every node walks records identically.
//
// `CacheStore` buffers writes over a parent store; its ops are applied to the
// parent in one `write_batch`, which is the commit unit for a transaction,
// a slash or a whole end-of-block pass.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;

pub type KvPair = (Vec<u8>, Vec<u8>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

pub trait KvStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()>;
    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// All pairs whose key starts with `prefix`, ascending by key.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>>;

    /// Apply `ops` as one unit. Backends with native batches override this.
    fn write_batch(&mut self, ops: Vec<BatchOp>) -> Result<()> {
        for op in ops {
            match op {
                BatchOp::Put(k, v) => self.set(&k, v)?,
                BatchOp::Delete(k) => self.delete(&k)?,
            }
        }
        Ok(())
    }

    fn has(&self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }
}

// ─────────────────────────────────────────────────────────────────
// MEMORY STORE
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone)]
pub struct MemStore {
    data: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl KvStore for MemStore {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.data.insert(key.to_vec(), value);
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.data.remove(key);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        Ok(self
            .data
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

// ─────────────────────────────────────────────────────────────────
// CACHE OVERLAY
// ─────────────────────────────────────────────────────────────────

/// Write buffer over a read-only parent. `None` marks a pending delete.
pub struct CacheStore<'a> {
    parent: &'a dyn KvStore,
    writes: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a> CacheStore<'a> {
    pub fn new(parent: &'a dyn KvStore) -> Self {
        CacheStore {
            parent,
            writes: BTreeMap::new(),
        }
    }

    /// Buffered writes in key order, ready for the parent's `write_batch`.
    pub fn into_ops(self) -> Vec<BatchOp> {
        self.writes
            .into_iter()
            .map(|(k, v)| match v {
                Some(v) => BatchOp::Put(k, v),
                None => BatchOp::Delete(k),
            })
            .collect()
    }
}

impl KvStore for CacheStore<'_> {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(v) => Ok(v.clone()),
            None => self.parent.get(key),
        }
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.writes.insert(key.to_vec(), Some(value));
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        self.writes.insert(key.to_vec(), None);
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<KvPair>> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> =
            self.parent.scan_prefix(prefix)?.into_iter().collect();
        for (k, v) in self
            .writes
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
        {
            match v {
                Some(v) => {
                    merged.insert(k.clone(), v.clone());
                }
                None => {
                    merged.remove(k);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

/// Run `f` against a cache over `store` and commit its writes only if it
/// returns `Ok`.
pub fn atomically<T, F>(store: &mut dyn KvStore, f: F) -> Result<T>
where
    F: FnOnce(&mut dyn KvStore) -> Result<T>,
{
    let (out, ops) = {
        let mut cache = CacheStore::new(&*store);
        let out = f(&mut cache);
        (out, cache.into_ops())
    };
    let value = out?;
    store.write_batch(ops)?;
    Ok(value)
}

// ─────────────────────────────────────────────────────────────────
// KEYS & TYPED RECORDS
// ─────────────────────────────────────────────────────────────────

/// Longest string segment accepted into a key. Message handlers reject
/// addresses, denoms and token ids past this length before touching state.
pub const MAX_SEGMENT_LEN: usize = 256;

/// Key builder. String segments are length-prefixed and integers big-endian,
/// so byte order matches logical order and a segment never bleeds into
/// the next one during prefix scans.
///
/// The prefix is a `u16`, so callers must bound segments (see
/// [`MAX_SEGMENT_LEN`]); distinct strings only map to distinct keys
/// within that bound.
#[derive(Debug, Clone, Default)]
pub struct Key(Vec<u8>);

impl Key {
    pub fn new(prefix: u8) -> Self {
        Key(vec![prefix])
    }

    pub fn str(mut self, s: &str) -> Self {
        let bytes = s.as_bytes();
        let len = u16::try_from(bytes.len()).unwrap_or(u16::MAX);
        self.0.extend_from_slice(&len.to_be_bytes());
        self.0.extend_from_slice(&bytes[..len as usize]);
        self
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.0.push(v);
        self
    }

    pub fn u64(mut self, v: u64) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn u128(mut self, v: u128) -> Self {
        self.0.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.0
    }
}

/// Read the big-endian u64 at `offset`, used when decoding queue keys.
pub fn read_u64(key: &[u8], offset: usize) -> Option<u64> {
    let bytes = key.get(offset..offset + 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_be_bytes(buf))
}

/// Read the length-prefixed string segment at `offset`.
pub fn read_str(key: &[u8], offset: usize) -> Option<String> {
    let len = key.get(offset..offset + 2)?;
    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
    let bytes = key.get(offset + 2..offset + 2 + len)?;
    String::from_utf8(bytes.to_vec()).ok()
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(bytes)?)
}

pub fn load<T: DeserializeOwned>(store: &dyn KvStore, key: &[u8]) -> Result<Option<T>> {
    match store.get(key)? {
        Some(bytes) => Ok(Some(decode(&bytes)?)),
        None => Ok(None),
    }
}

pub fn save<T: Serialize>(store: &mut dyn KvStore, key: &[u8], value: &T) -> Result<()> {
    let bytes = bincode::serialize(value)?;
    store.set(key, bytes)
}

pub fn load_all<T: DeserializeOwned>(store: &dyn KvStore, prefix: &[u8]) -> Result<Vec<T>> {
    store
        .scan_prefix(prefix)?
        .into_iter()
        .map(|(_, v)| decode(&v))
        .collect()
}
