//! Fuzz target: stored record and key decoding
//!
//! Verifies:
//! 1. decode() of every persisted record type never panics on corrupt bytes
//! 2. Key segment readers never read past the end of a key
//!
//! Run: cargo +nightly fuzz run fuzz_record_decode

#![no_main]
use bdl_core::params::Params;
use bdl_core::store::{decode, read_str, read_u64};
use bdl_staking::{Delegation, UnbondingDelegation, Validator};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = decode::<Validator>(data);
    let _ = decode::<Delegation>(data);
    let _ = decode::<UnbondingDelegation>(data);
    let _ = decode::<Params>(data);
    let _ = decode::<Vec<(String, String)>>(data);

    for offset in [0usize, 1, 2, 9, data.len()] {
        if let Some(s) = read_str(data, offset) {
            assert!(s.len() + 2 <= data.len() - offset);
        }
        let _ = read_u64(data, offset);
    }
});
