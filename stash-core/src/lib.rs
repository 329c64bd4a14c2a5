//! Stash Core - Keys, Codecs, Config and Errors
//!
//! Shared building blocks for the stash cache-aside client. This crate has no
//! knowledge of any store; `stash-storage` builds the caches on top of it.

pub mod codec;
pub mod config;
pub mod error;
pub mod key;

pub use codec::{Codec, FnCodec, JsonCodec, Passthrough};
pub use config::{CacheSettings, StoreConfig};
pub use error::{
    CodecError, ConfigError, KeyError, StashError, StashResult, StoreError, StoreResult,
};
pub use key::{format_key, CacheKey, Identity, Namespace, KEY_COLUMN_WIDTH, MIN_NAMESPACE_LEN};
