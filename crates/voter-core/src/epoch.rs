//! Epoch arithmetic.
//!
//! Converts wall-clock time into commit-reveal epoch boundaries. An epoch
//! is identified by a monotonically increasing integer; its submit window
//! spans one `submit_period` and is followed by a `reveal_period` during
//! which the committed values must be disclosed.
//!
//! All arithmetic is integer milliseconds.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Monotonically increasing epoch identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct EpochId(pub u64);

impl EpochId {
    #[inline]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for EpochId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute boundaries of one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochWindow {
    pub epoch_id: EpochId,
    /// End of the submit (commit) window, Unix milliseconds.
    pub submit_period_end: i64,
    /// End of the reveal window, Unix milliseconds.
    pub reveal_period_end: i64,
}

/// Epoch configuration: a pure function of wall-clock time.
///
/// Obtained from the oracle manager contract at startup
/// (`getPriceEpochConfiguration`, converted from seconds to milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochSettings {
    first_epoch_start_ms: i64,
    submit_period_ms: i64,
    reveal_period_ms: i64,
}

impl EpochSettings {
    /// Create epoch settings, failing fast on inconsistent configuration.
    ///
    /// # Errors
    /// Returns `CoreError::InvalidEpochConfig` when either period is `<= 0`.
    pub fn new(
        first_epoch_start_ms: i64,
        submit_period_ms: i64,
        reveal_period_ms: i64,
    ) -> Result<Self, CoreError> {
        if submit_period_ms <= 0 {
            return Err(CoreError::InvalidEpochConfig(format!(
                "submit period must be positive, got {submit_period_ms}ms"
            )));
        }
        if reveal_period_ms <= 0 {
            return Err(CoreError::InvalidEpochConfig(format!(
                "reveal period must be positive, got {reveal_period_ms}ms"
            )));
        }
        Ok(Self {
            first_epoch_start_ms,
            submit_period_ms,
            reveal_period_ms,
        })
    }

    /// Epoch id for the given time: `floor((now - first) / submit_period)`.
    #[must_use]
    pub fn epoch_id_at(&self, now_ms: i64) -> EpochId {
        let diff = now_ms - self.first_epoch_start_ms;
        debug_assert!(diff >= 0, "time before first epoch start");
        EpochId((diff / self.submit_period_ms) as u64)
    }

    /// Absolute end of the submit window for `epoch`.
    #[must_use]
    pub fn submit_deadline(&self, epoch: EpochId) -> i64 {
        self.first_epoch_start_ms + (epoch.0 as i64 + 1) * self.submit_period_ms
    }

    /// Absolute end of the reveal window for `epoch`.
    #[must_use]
    pub fn reveal_deadline(&self, epoch: EpochId) -> i64 {
        self.submit_deadline(epoch) + self.reveal_period_ms
    }

    /// The full window containing `now_ms`.
    #[must_use]
    pub fn window_at(&self, now_ms: i64) -> EpochWindow {
        let epoch_id = self.epoch_id_at(now_ms);
        EpochWindow {
            epoch_id,
            submit_period_end: self.submit_deadline(epoch_id),
            reveal_period_end: self.reveal_deadline(epoch_id),
        }
    }

    #[must_use]
    pub fn submit_period_ms(&self) -> i64 {
        self.submit_period_ms
    }

    #[must_use]
    pub fn reveal_period_ms(&self) -> i64 {
        self.reveal_period_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: i64 = 1_600_000_000_000;
    const SUBMIT: i64 = 180_000; // 3 minutes
    const REVEAL: i64 = 90_000;

    fn settings() -> EpochSettings {
        EpochSettings::new(FIRST, SUBMIT, REVEAL).unwrap()
    }

    #[test]
    fn test_construction_rejects_nonpositive_periods() {
        assert!(EpochSettings::new(FIRST, 0, REVEAL).is_err());
        assert!(EpochSettings::new(FIRST, SUBMIT, -1).is_err());
    }

    #[test]
    fn test_same_window_same_epoch() {
        let s = settings();
        let t1 = FIRST + 5 * SUBMIT + 1;
        let t2 = FIRST + 6 * SUBMIT - 1;
        assert_eq!(s.epoch_id_at(t1), s.epoch_id_at(t2));
        assert_eq!(s.epoch_id_at(t1), EpochId(5));
    }

    #[test]
    fn test_boundary_increments_by_one() {
        let s = settings();
        let before = FIRST + 7 * SUBMIT - 1;
        let after = FIRST + 7 * SUBMIT;
        assert_eq!(s.epoch_id_at(before).0 + 1, s.epoch_id_at(after).0);
    }

    #[test]
    fn test_reveal_deadline_offset() {
        let s = settings();
        for e in [0u64, 1, 17, 100_000] {
            let e = EpochId(e);
            assert_eq!(s.reveal_deadline(e) - s.submit_deadline(e), REVEAL);
        }
    }

    #[test]
    fn test_submit_deadline_formula() {
        let s = settings();
        assert_eq!(s.submit_deadline(EpochId(0)), FIRST + SUBMIT);
        assert_eq!(s.submit_deadline(EpochId(3)), FIRST + 4 * SUBMIT);
    }

    #[test]
    fn test_window_at() {
        let s = settings();
        let now = FIRST + 2 * SUBMIT + 500;
        let w = s.window_at(now);
        assert_eq!(w.epoch_id, EpochId(2));
        assert_eq!(w.submit_period_end, FIRST + 3 * SUBMIT);
        assert_eq!(w.reveal_period_end, FIRST + 3 * SUBMIT + REVEAL);
    }

    #[test]
    fn test_large_values_no_overflow() {
        let s = EpochSettings::new(0, 1, 1).unwrap();
        let far = i64::MAX / 2;
        assert_eq!(s.epoch_id_at(far).0, far as u64);
    }
}
