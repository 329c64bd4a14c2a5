//! Cache key formatting.
//!
//! Every process that talks to the same store must derive the same key for a
//! `(namespace, identity)` pair, so the format is fixed:
//!
//! ```text
//! 000000USER#0000000042
//! ^^^^^^^^^^ ^^^^^^^^^^
//! namespace   identity
//! ```
//!
//! - The namespace is left-padded with `0` to 10 characters, then upper-cased.
//!   A leading `+` or `-` stays in front of the padding (`-abc` becomes
//!   `-000000ABC`).
//! - The identity is written in decimal, left-padded with `0` to 10 digits.
//! - The two columns are joined by `#`.
//!
//! Namespaces that only differ by case or by leading zeros normalize to the
//! same column and therefore share keys.

use std::fmt;
use std::str::FromStr;

use crate::error::KeyError;

/// Numeric identity of a cached entity.
pub type Identity = u64;

/// Namespaces must be strictly longer than this many characters.
pub const MIN_NAMESPACE_LEN: usize = 2;

/// Width of both key columns.
pub const KEY_COLUMN_WIDTH: usize = 10;

const SEPARATOR: char = '#';

/// A validated, normalized key namespace.
///
/// Holding a `Namespace` means the length check already passed, so deriving a
/// [`CacheKey`] from it cannot fail.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace {
    /// Padded, upper-cased namespace column.
    column: String,
}

impl Namespace {
    /// Validate and normalize a namespace.
    ///
    /// Fails with [`KeyError::InvalidNamespace`] when `raw` has
    /// [`MIN_NAMESPACE_LEN`] characters or fewer.
    pub fn new(raw: &str) -> Result<Self, KeyError> {
        let len = raw.chars().count();
        if len <= MIN_NAMESPACE_LEN {
            return Err(KeyError::InvalidNamespace {
                namespace: raw.to_string(),
                min_len: MIN_NAMESPACE_LEN,
            });
        }

        let (sign, body) = match raw.strip_prefix(['+', '-']) {
            Some(rest) => (&raw[..1], rest),
            None => ("", raw),
        };

        let mut column = String::with_capacity(KEY_COLUMN_WIDTH.max(raw.len()));
        column.push_str(sign);
        for _ in len..KEY_COLUMN_WIDTH {
            column.push('0');
        }
        column.push_str(body);

        Ok(Self {
            column: column.to_uppercase(),
        })
    }

    /// The normalized namespace column, e.g. `000000USER`.
    pub fn as_str(&self) -> &str {
        &self.column
    }

    /// Format the key for `identity` within this namespace.
    pub fn key(&self, identity: Identity) -> CacheKey {
        CacheKey(format!(
            "{}{}{:0width$}",
            self.column,
            SEPARATOR,
            identity,
            width = KEY_COLUMN_WIDTH
        ))
    }
}

impl FromStr for Namespace {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.column)
    }
}

/// A fully formatted store key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format the store key for a `(namespace, identity)` pair.
///
/// ```
/// use stash_core::format_key;
///
/// let key = format_key("user", 42).unwrap();
/// assert_eq!(key.as_str(), "000000USER#0000000042");
/// assert!(format_key("ab", 1).is_err());
/// ```
pub fn format_key(namespace: &str, identity: Identity) -> Result<CacheKey, KeyError> {
    Ok(Namespace::new(namespace)?.key(identity))
}
