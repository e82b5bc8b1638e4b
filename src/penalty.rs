/// Default time cost of one wrong answer. Overridable via `Config`.
pub const DEFAULT_PENALTY_PER_MISS_MS: u64 = 5_000;

/// Per-session miss counter priced in milliseconds.
///
/// Starts at zero, never decrements; a session never forgives a prior miss.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PenaltyLedger {
    misses: u32,
    per_miss_ms: u64,
}

impl PenaltyLedger {
    pub fn new(per_miss_ms: u64) -> Self {
        Self {
            misses: 0,
            per_miss_ms,
        }
    }

    /// Adds exactly one miss. No upper bound.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn misses(&self) -> u32 {
        self.misses
    }

    pub fn penalty_ms(&self) -> u64 {
        u64::from(self.misses) * self.per_miss_ms
    }
}

impl Default for PenaltyLedger {
    fn default() -> Self {
        Self::new(DEFAULT_PENALTY_PER_MISS_MS)
    }
}
