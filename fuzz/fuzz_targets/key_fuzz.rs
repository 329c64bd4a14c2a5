//! Fuzz test for cache key formatting
//!
//! Feeds arbitrary namespaces and identities to `format_key` and checks:
//! - No panics on any UTF-8 input
//! - Short namespaces are always rejected
//! - Accepted keys keep the padded `namespace#identity` shape
//!
//! Run with: cargo +nightly fuzz run key_fuzz -- -max_total_time=60

#![no_main]

use libfuzzer_sys::fuzz_target;
use stash_core::{format_key, KEY_COLUMN_WIDTH, MIN_NAMESPACE_LEN};

fuzz_target!(|data: &[u8]| {
    if data.len() < 8 {
        return;
    }
    let (id_bytes, rest) = data.split_at(8);
    let mut raw = [0u8; 8];
    raw.copy_from_slice(id_bytes);
    let identity = u64::from_le_bytes(raw);

    let Ok(namespace) = std::str::from_utf8(rest) else {
        return;
    };

    match format_key(namespace, identity) {
        Ok(key) => {
            assert!(namespace.chars().count() > MIN_NAMESPACE_LEN);
            let (prefix, digits) = key
                .as_str()
                .rsplit_once('#')
                .expect("key always carries a separator");
            assert!(prefix.chars().count() >= KEY_COLUMN_WIDTH);
            assert!(digits.len() >= KEY_COLUMN_WIDTH);
            assert_eq!(digits.parse::<u64>().ok(), Some(identity));
        }
        Err(_) => assert!(namespace.chars().count() <= MIN_NAMESPACE_LEN),
    }
});
