use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tls_codec::{TlsDeserialize, TlsSerialize, TlsSize};

/// This value is used as the default lifetime if no default lifetime is configured.
/// The value is in seconds and amounts to 3 * 28 Days, i.e. about 3 months.
const DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS: u64 = 60 * 60 * 24 * 28 * 3;

/// This value is used as the default amount of time (in seconds) the lifetime
/// of a `KeyPackage` is extended into the past to allow for skewed clocks. The
/// value is in seconds and amounts to 1h.
const DEFAULT_KEY_PACKAGE_LIFETIME_MARGIN_SECONDS: u64 = 60 * 60;

/// The lifetime represents the times between which clients will
/// consider a KeyPackage valid. This time is represented as an absolute time,
/// measured in seconds since the Unix epoch (1970-01-01T00:00:00Z).
/// A client MUST NOT use the data in a KeyPackage for any processing before
/// the not_before date, or after the not_after date.
///
/// ```text
/// struct {
///     uint64 not_before;
///     uint64 not_after;
/// } Lifetime;
/// ```
#[derive(
    PartialEq, Eq, Copy, Clone, Debug, Serialize, Deserialize, TlsSerialize, TlsDeserialize, TlsSize,
)]
pub struct Lifetime {
    not_before: u64,
    not_after: u64,
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs())
        .unwrap_or_default()
}

impl Lifetime {
    /// Create a new lifetime with lifetime `t` (in seconds).
    /// Note that the lifetime is extended 1h into the past to adapt to skewed
    /// clocks, i.e. `not_before` is set to now - 1h.
    pub fn new(t: u64) -> Self {
        let now = now();
        Self {
            not_before: now.saturating_sub(DEFAULT_KEY_PACKAGE_LIFETIME_MARGIN_SECONDS),
            not_after: now.saturating_add(t),
        }
    }

    /// Returns true if this lifetime is valid.
    pub fn is_valid(&self) -> bool {
        let now = now();
        self.not_before < now && now < self.not_after
    }

    /// Seconds since the Unix epoch before which the key package is not valid.
    pub fn not_before(&self) -> u64 {
        self.not_before
    }

    /// Seconds since the Unix epoch after which the key package is not valid.
    pub fn not_after(&self) -> u64 {
        self.not_after
    }

    #[cfg(test)]
    pub(crate) fn expired() -> Self {
        Self {
            not_before: 0,
            not_after: 1,
        }
    }
}

impl Default for Lifetime {
    fn default() -> Self {
        Lifetime::new(DEFAULT_KEY_PACKAGE_LIFETIME_SECONDS)
    }
}
