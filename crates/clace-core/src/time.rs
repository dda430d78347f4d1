// crates/clace-core/src/time.rs
// ============================================================================
// Module: Clace Time Model
// Description: Canonical timestamp representation for rows and audit entries.
// Purpose: Give every stored row a single, serializable notion of "now".
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Clace records `create_time` / `updated_at` on every row and audit entry.
//! [`Timestamp`] wraps Unix milliseconds so it round-trips through SQLite
//! (`INTEGER`) and JSON (`number`) without precision loss.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

/// Milliseconds since the Unix epoch.
///
/// # Invariants
/// - Always non-negative for values produced by [`Timestamp::now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Captures the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        #[allow(
            clippy::cast_possible_wrap,
            clippy::cast_possible_truncation,
            reason = "millisecond counts fit in i64 until year 292278994"
        )]
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self(millis)
    }

    /// Builds a timestamp from a raw millisecond count (used when
    /// deserializing stored rows).
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the raw millisecond count.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::Timestamp;

    #[test]
    fn now_is_positive_and_roundtrips() {
        let t = Timestamp::now();
        assert!(t.as_millis() > 0);
        assert_eq!(Timestamp::from_millis(t.as_millis()), t);
    }
}
