//! Logging macros and serde helpers shared across the crate.

// Key material is only logged with the crypto-debug feature, message
// content only with content-debug. Without them the macros expand to
// nothing and their arguments are not evaluated.

#[cfg(feature = "crypto-debug")]
macro_rules! log_crypto {
    ($level:ident, $($arg:tt)*) => {
        log::$level!($($arg)*)
    };
}

#[cfg(not(feature = "crypto-debug"))]
macro_rules! log_crypto {
    ($level:ident, $($arg:tt)*) => {{}};
}

#[cfg(feature = "content-debug")]
macro_rules! log_content {
    ($level:ident, $($arg:tt)*) => {
        log::$level!($($arg)*)
    };
}

#[cfg(not(feature = "content-debug"))]
macro_rules! log_content {
    ($level:ident, $($arg:tt)*) => {{}};
}

/// Serialize maps with non-string keys as a list of `(key, value)` pairs.
///
/// JSON objects only allow string keys.
pub(crate) mod vector_converter {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub(crate) fn serialize<'a, T, K, V, S>(target: T, ser: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: IntoIterator<Item = (&'a K, &'a V)>,
        K: Serialize + 'a,
        V: Serialize + 'a,
    {
        let container: Vec<_> = target.into_iter().collect();
        serde::Serialize::serialize(&container, ser)
    }

    pub(crate) fn deserialize<'de, K, V, D>(des: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        D: Deserializer<'de>,
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
    {
        let container: Vec<(K, V)> = serde::Deserialize::deserialize(des)?;
        Ok(container.into_iter().collect())
    }
}

/// Number of bytes the variable-length prefix of a vector of `len` bytes takes.
pub(crate) fn vl_prefix_len(len: usize) -> usize {
    if len <= 0x3f {
        1
    } else if len <= 0x3fff {
        2
    } else {
        4
    }
}
