//! Pool statistics.
//!
//! [`PoolStats`] is a point-in-time snapshot; counters are cumulative since
//! the pool was built.
//!
//! ```rust
//! use markup2pdf::PoolStats;
//!
//! let stats = PoolStats { available: 2, active: 1, acquired: 10, released: 9 };
//! assert_eq!(stats.live(), 3);
//! assert_eq!(stats.outstanding(), 1);
//! ```

/// Snapshot of an [`EnginePool`](crate::EnginePool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolStats {
    /// Idle engines ready to be lent.
    pub available: usize,

    /// Engines currently lent to a borrower.
    pub active: usize,

    /// Successful acquisitions.
    pub acquired: u64,

    /// Returns, explicit or via lease `Drop`.
    pub released: u64,
}

impl PoolStats {
    /// Engines alive in the pool, idle or lent.
    #[inline]
    pub fn live(&self) -> usize {
        self.available + self.active
    }

    /// Acquisitions not yet matched by a release.
    #[inline]
    pub fn outstanding(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }

    #[inline]
    pub fn has_available(&self) -> bool {
        self.available > 0
    }
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PoolStats {{ available: {}, active: {}, acquired: {}, released: {} }}",
            self.available, self.active, self.acquired, self.released
        )
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats_are_empty() {
        let stats = PoolStats::default();
        assert_eq!(stats.live(), 0);
        assert_eq!(stats.outstanding(), 0);
        assert!(!stats.has_available());
    }

    /// More releases than acquisitions never underflows.
    #[test]
    fn test_outstanding_saturates() {
        let stats = PoolStats {
            available: 0,
            active: 0,
            acquired: 1,
            released: 3,
        };
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_display() {
        let stats = PoolStats {
            available: 1,
            active: 2,
            acquired: 5,
            released: 3,
        };
        assert_eq!(
            stats.to_string(),
            "PoolStats { available: 1, active: 2, acquired: 5, released: 3 }"
        );
    }
}
