//! Fuzz test for the storage codecs
//!
//! Decoding arbitrary stored bytes must fail cleanly, never panic, since a
//! cache treats undecodable entries as misses.
//!
//! Run with: cargo +nightly fuzz run codec_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use stash_core::{Codec, JsonCodec, Passthrough};

fuzz_target!(|data: &[u8]| {
    let text = Passthrough::<String>::new();
    if let Ok(decoded) = text.decode(data) {
        assert_eq!(text.encode(&decoded).ok().as_deref(), Some(data));
    }

    let json = JsonCodec::<Vec<i64>>::new();
    if let Ok(decoded) = json.decode(data) {
        let encoded = json.encode(&decoded).expect("decoded values re-encode");
        assert_eq!(json.decode(&encoded).ok(), Some(decoded));
    }
});
